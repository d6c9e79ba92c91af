use std::sync::Arc;

use parking_lot::Mutex;

use crate::job::{CountedJob, Job, JobCounter};
use crate::packet_cache::PacketCacheHandle;
use crate::stream::SsrcOutboundContext;

/// SetPacketCacheJob installs an allocated packet cache on an outbound
/// stream. It runs on the same serial queue as the forwarding jobs of the
/// stream, so the cache state has a single writer.
pub struct SetPacketCacheJob {
    outbound_context: Arc<Mutex<SsrcOutboundContext>>,
    packet_cache: PacketCacheHandle,
    _counted: CountedJob,
}

impl SetPacketCacheJob {
    pub fn new(
        outbound_context: Arc<Mutex<SsrcOutboundContext>>,
        packet_cache: PacketCacheHandle,
        job_counter: &JobCounter,
    ) -> Self {
        SetPacketCacheJob {
            outbound_context,
            packet_cache,
            _counted: job_counter.acquire(),
        }
    }
}

impl Job for SetPacketCacheJob {
    fn run(self: Box<Self>) {
        let mut outbound = self.outbound_context.lock();
        if outbound.set_packet_cache(Arc::clone(&self.packet_cache)) {
            log::debug!("packet cache ready for outbound ssrc {}", outbound.ssrc);
        } else {
            log::debug!(
                "outbound ssrc {} already has a packet cache, dropping the new one",
                outbound.ssrc
            );
        }
    }
}
