#![warn(rust_2018_idioms)]

//! Packet forwarding core of a selective forwarding unit: per packet jobs
//! which gate, rewrite and hand RTP packets over to the transports of the
//! receiving endpoints.

pub use rtcp;
pub use rtp;

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod header_extension_rewriter;
pub mod job;
pub mod packet_cache;
pub mod rtp_header;
pub mod rtp_map;
pub mod sequence_rewriter;
pub mod stream;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use transport::Transport;
