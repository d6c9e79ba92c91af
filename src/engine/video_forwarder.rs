use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

use super::message::{post, EngineMessage, EngineMessageSender};
use crate::codec::{h264, vp8};
use crate::error::Result;
use crate::header_extension_rewriter;
use crate::job::{CountedJob, Job};
use crate::rtp_header::RtpHeader;
use crate::rtp_map::Format;
use crate::sequence_rewriter;
use crate::stream::{SsrcInboundContext, SsrcOutboundContext};
use crate::transport::Transport;

/// VideoForwarderRewriteAndSendJob forwards one inbound video packet to one
/// outbound stream. It must run on the serial job queue of the receiving
/// endpoint.
pub struct VideoForwarderRewriteAndSendJob {
    outbound_context: Arc<Mutex<SsrcOutboundContext>>,
    sender_inbound_context: Arc<SsrcInboundContext>,
    packet: BytesMut,
    transport: Arc<dyn Transport>,
    extended_sequence_number: u32,
    messages: EngineMessageSender,
    endpoint_id: Arc<str>,
    _counted: CountedJob,
}

impl VideoForwarderRewriteAndSendJob {
    pub fn new(
        outbound_context: Arc<Mutex<SsrcOutboundContext>>,
        sender_inbound_context: Arc<SsrcInboundContext>,
        packet: BytesMut,
        transport: Arc<dyn Transport>,
        extended_sequence_number: u32,
        messages: EngineMessageSender,
        endpoint_id: Arc<str>,
    ) -> Self {
        let counted = transport.job_counter().acquire();
        VideoForwarderRewriteAndSendJob {
            outbound_context,
            sender_inbound_context,
            packet,
            transport,
            extended_sequence_number,
            messages,
            endpoint_id,
            _counted: counted,
        }
    }

    fn forward(self) -> Result<()> {
        let VideoForwarderRewriteAndSendJob {
            outbound_context,
            sender_inbound_context,
            mut packet,
            transport,
            extended_sequence_number,
            messages,
            endpoint_id,
            _counted,
        } = self;
        let name = transport.loggable_id();
        let mut outbound = outbound_context.lock();

        let header = RtpHeader::parse(&mut packet)?;
        let ssrc = header.ssrc();

        if outbound.rtp_map.format == Format::Rtx {
            log::warn!(
                "{} rtx packet should not reach rewrite and send. ssrc {}, seq {}",
                name,
                ssrc,
                extended_sequence_number
            );
            return Ok(());
        }

        if outbound.request_packet_cache() {
            log::debug!(
                "new ssrc {} seen on {}, requesting video packet cache",
                outbound.ssrc,
                name
            );
            post(
                &messages,
                EngineMessage::AllocateVideoPacketCache {
                    ssrc: outbound.ssrc,
                    endpoint_id,
                },
            );
        }

        let payload = header.payload();
        let is_key_frame = if outbound.rtp_map.format == Format::Vp8 {
            vp8::is_key_frame(payload, vp8::payload_descriptor_size(payload))
        } else {
            h264::is_key_frame(payload, h264::payload_descriptor_size())
        };

        // a delta frame cannot start the stream or splice in a new source
        let splicing = ssrc != outbound.original_ssrc || !outbound.rewrite.is_initialized();
        if splicing && !is_key_frame {
            outbound.needs_keyframe = true;
            sender_inbound_context.pli_scheduler.trigger_pli();
        }

        if outbound.needs_keyframe {
            if !is_key_frame {
                log::trace!(
                    "{} waiting for key frame on ssrc {}, dropping seq {}",
                    name,
                    outbound.ssrc,
                    extended_sequence_number
                );
                return Ok(());
            }
            outbound.needs_keyframe = false;
            log::debug!(
                "{} requested key frame from {} on ssrc {}",
                name,
                sender_inbound_context.ssrc,
                outbound.ssrc
            );
        }

        if !outbound.should_send(ssrc, extended_sequence_number) {
            log::debug!(
                "{} dropping packet. Rewrite not suitable ssrc {}, seq {}",
                name,
                ssrc,
                extended_sequence_number
            );
            return Ok(());
        }

        if !transport.is_connected() {
            log::trace!("{} not connected, dropping ssrc {}", name, ssrc);
            return Ok(());
        }

        let rewritten = match outbound.rtp_map.format {
            Format::Vp8 => sequence_rewriter::rewrite_vp8(
                &mut outbound,
                &mut packet,
                extended_sequence_number,
                name,
                is_key_frame,
            ),
            Format::H264 => sequence_rewriter::rewrite_h264(
                &mut outbound,
                &mut packet,
                extended_sequence_number,
                name,
                is_key_frame,
            ),
            _ => None,
        };
        if rewritten.is_none() {
            return Ok(());
        }

        let mut header = RtpHeader::parse(&mut packet)?;
        header.set_payload_type(outbound.rtp_map.payload_type);
        header_extension_rewriter::rewrite_video(&mut header, &sender_inbound_context, &outbound);
        let sequence_number = header.sequence_number();

        if let Some(cache) = outbound.packet_cache.handle() {
            if !cache.lock().add(&packet, sequence_number) {
                log::warn!(
                    "{} failed to add packet to cache. ssrc {}, seq {}",
                    name,
                    outbound.ssrc,
                    sequence_number
                );
            }
        }
        drop(outbound);

        transport.protect_and_send(packet);
        Ok(())
    }
}

impl Job for VideoForwarderRewriteAndSendJob {
    fn run(self: Box<Self>) {
        if let Err(err) = (*self).forward() {
            log::error!("video forwarding failed: {}", err);
            debug_assert!(!err.is_invariant_violation(), "{}", err);
        }
    }
}
