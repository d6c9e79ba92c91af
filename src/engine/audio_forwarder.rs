use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::error::Result;
use crate::header_extension_rewriter;
use crate::job::{CountedJob, Job};
use crate::rtp_header::RtpHeader;
use crate::rtp_map::Format;
use crate::sequence_rewriter;
use crate::stream::{SsrcInboundContext, SsrcOutboundContext};
use crate::transport::Transport;

/// AudioForwarderRewriteAndSendJob forwards one inbound audio packet to one
/// outbound stream. Audio is not cached and needs no key frame to switch
/// sources.
pub struct AudioForwarderRewriteAndSendJob {
    outbound_context: Arc<Mutex<SsrcOutboundContext>>,
    sender_inbound_context: Arc<SsrcInboundContext>,
    packet: BytesMut,
    transport: Arc<dyn Transport>,
    extended_sequence_number: u32,
    _counted: CountedJob,
}

impl AudioForwarderRewriteAndSendJob {
    pub fn new(
        outbound_context: Arc<Mutex<SsrcOutboundContext>>,
        sender_inbound_context: Arc<SsrcInboundContext>,
        packet: BytesMut,
        transport: Arc<dyn Transport>,
        extended_sequence_number: u32,
    ) -> Self {
        let counted = transport.job_counter().acquire();
        AudioForwarderRewriteAndSendJob {
            outbound_context,
            sender_inbound_context,
            packet,
            transport,
            extended_sequence_number,
            _counted: counted,
        }
    }

    fn forward(mut self) -> Result<()> {
        let name = self.transport.loggable_id();
        let mut outbound = self.outbound_context.lock();

        let ssrc = RtpHeader::parse(&mut self.packet)?.ssrc();

        if outbound.rtp_map.format == Format::Rtx {
            log::warn!(
                "{} rtx packet should not reach rewrite and send. ssrc {}, seq {}",
                name,
                ssrc,
                self.extended_sequence_number
            );
            return Ok(());
        }

        if !outbound.should_send(ssrc, self.extended_sequence_number) {
            log::debug!(
                "{} dropping packet. Rewrite not suitable ssrc {}, seq {}",
                name,
                ssrc,
                self.extended_sequence_number
            );
            return Ok(());
        }

        if !self.transport.is_connected() {
            return Ok(());
        }

        if sequence_rewriter::rewrite_audio(
            &mut outbound,
            &mut self.packet,
            self.extended_sequence_number,
            name,
        )
        .is_none()
        {
            return Ok(());
        }

        let mut header = RtpHeader::parse(&mut self.packet)?;
        header.set_payload_type(outbound.rtp_map.payload_type);
        header_extension_rewriter::rewrite_audio(
            &mut header,
            &self.sender_inbound_context,
            &outbound,
        );
        drop(outbound);

        self.transport.protect_and_send(self.packet);
        Ok(())
    }
}

impl Job for AudioForwarderRewriteAndSendJob {
    fn run(self: Box<Self>) {
        if let Err(err) = (*self).forward() {
            log::error!("audio forwarding failed: {}", err);
            debug_assert!(!err.is_invariant_violation(), "{}", err);
        }
    }
}
