
pub mod inbound;
pub mod outbound;
pub mod pli_scheduler;

pub use inbound::SsrcInboundContext;
pub use outbound::{
    CacheState, LastSent, Offsets, RewriteState, SsrcOutboundContext, SENT_WINDOW_SIZE,
};
pub use pli_scheduler::PliScheduler;
