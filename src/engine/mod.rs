#[cfg(test)]
mod engine_test;

pub mod audio_forwarder;
pub mod message;
pub mod set_packet_cache;
pub mod video_forwarder;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub use audio_forwarder::AudioForwarderRewriteAndSendJob;
pub use message::{EngineMessage, EngineMessageReceiver, EngineMessageSender};
pub use set_packet_cache::SetPacketCacheJob;
pub use video_forwarder::VideoForwarderRewriteAndSendJob;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::job::{Job, SerialJobQueue};
use crate::packet_cache::PacketCache;
use crate::rtp_header::RtpHeader;
use crate::rtp_map::RtpMap;
use crate::stream::{SsrcInboundContext, SsrcOutboundContext};
use crate::transport::Transport;

struct Outbound {
    /// inbound ssrc routed to this outbound stream
    source_ssrc: u32,
    context: Arc<Mutex<SsrcOutboundContext>>,
}

struct Endpoint {
    id: Arc<str>,
    transport: Arc<dyn Transport>,
    job_queue: SerialJobQueue,
    outbound: HashMap<u32, Outbound>,
}

impl Endpoint {
    fn targets(&self, source_ssrc: u32) -> impl Iterator<Item = &Outbound> {
        self.outbound
            .values()
            .filter(move |o| o.source_ssrc == source_ssrc)
    }

    fn has_source(&self, source_ssrc: u32) -> bool {
        self.targets(source_ssrc).next().is_some()
    }
}

/// Engine owns the stream contexts and the per endpoint transports and job
/// queues, and fans inbound packets out as forwarding jobs. Endpoints must
/// be added from within a tokio runtime.
pub struct Engine {
    config: EngineConfig,
    rtcp_sender_ssrc: u32,
    inbound: HashMap<u32, Arc<SsrcInboundContext>>,
    endpoints: HashMap<Arc<str>, Endpoint>,
    messages_tx: EngineMessageSender,
    messages_rx: EngineMessageReceiver,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        Ok(Engine {
            config,
            rtcp_sender_ssrc: 0,
            inbound: HashMap::new(),
            endpoints: HashMap::new(),
            messages_tx,
            messages_rx,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// set_rtcp_sender_ssrc sets the sender ssrc of the RTCP feedback
    /// returned by collect_plis.
    pub fn set_rtcp_sender_ssrc(&mut self, ssrc: u32) {
        self.rtcp_sender_ssrc = ssrc;
    }

    pub fn add_inbound(&mut self, ssrc: u32, rtp_map: RtpMap) -> Arc<SsrcInboundContext> {
        let pli_min_interval = self.config.pli_min_interval();
        let inbound = self.inbound.entry(ssrc).or_insert_with(|| {
            Arc::new(SsrcInboundContext::new(ssrc, rtp_map, pli_min_interval))
        });
        Arc::clone(inbound)
    }

    pub fn remove_inbound(&mut self, ssrc: u32) -> Result<()> {
        self.inbound
            .remove(&ssrc)
            .map(|_| ())
            .ok_or(Error::ErrInboundNotFound(ssrc))
    }

    /// add_endpoint registers a receiving endpoint and starts its serial job
    /// queue. An endpoint registered under the same id is replaced.
    pub fn add_endpoint(&mut self, endpoint_id: &str, transport: Arc<dyn Transport>) {
        let id: Arc<str> = Arc::from(endpoint_id);
        let endpoint = Endpoint {
            id: Arc::clone(&id),
            job_queue: SerialJobQueue::new(transport.loggable_id()),
            transport,
            outbound: HashMap::new(),
        };
        if let Some(old) = self.endpoints.insert(id, endpoint) {
            log::warn!("endpoint {} replaced", old.id);
            old.job_queue.close();
        }
    }

    /// remove_endpoint stops the endpoint's job queue. Jobs still queued for
    /// it are dropped without running.
    pub fn remove_endpoint(&mut self, endpoint_id: &str) -> Result<()> {
        let endpoint = self
            .endpoints
            .remove(endpoint_id)
            .ok_or_else(|| Error::ErrEndpointNotFound(endpoint_id.to_owned()))?;
        endpoint.job_queue.close();
        log::debug!(
            "endpoint {} removed with {} outbound streams",
            endpoint.id,
            endpoint.outbound.len()
        );
        Ok(())
    }

    /// add_outbound subscribes an endpoint to an inbound stream. An endpoint
    /// holds at most one outbound stream per inbound stream.
    pub fn add_outbound(
        &mut self,
        endpoint_id: &str,
        source_ssrc: u32,
        ssrc: u32,
        rtp_map: RtpMap,
    ) -> Result<Arc<Mutex<SsrcOutboundContext>>> {
        let splice_timestamp_gap = self.config.splice_timestamp_gap;
        let endpoint = self.endpoint_mut(endpoint_id)?;
        if endpoint.outbound.contains_key(&ssrc) || endpoint.has_source(source_ssrc) {
            return Err(Error::ErrOutboundExists(
                endpoint_id.to_owned(),
                source_ssrc,
            ));
        }

        let context = Arc::new(Mutex::new(
            SsrcOutboundContext::new(ssrc, source_ssrc, rtp_map)
                .with_splice_timestamp_gap(splice_timestamp_gap),
        ));
        endpoint.outbound.insert(
            ssrc,
            Outbound {
                source_ssrc,
                context: Arc::clone(&context),
            },
        );
        Ok(context)
    }

    /// set_outbound_source routes another inbound stream to an existing
    /// outbound stream. The outbound stream switches over on the first key
    /// frame of the new source.
    pub fn set_outbound_source(
        &mut self,
        endpoint_id: &str,
        ssrc: u32,
        source_ssrc: u32,
    ) -> Result<()> {
        let endpoint = self.endpoint_mut(endpoint_id)?;
        let current = endpoint
            .outbound
            .get(&ssrc)
            .map(|o| o.source_ssrc)
            .ok_or_else(|| Error::ErrOutboundNotFound(endpoint_id.to_owned(), ssrc))?;
        if current == source_ssrc {
            return Ok(());
        }
        if endpoint.has_source(source_ssrc) {
            return Err(Error::ErrOutboundExists(
                endpoint_id.to_owned(),
                source_ssrc,
            ));
        }

        if let Some(outbound) = endpoint.outbound.get_mut(&ssrc) {
            outbound.source_ssrc = source_ssrc;
        }
        log::debug!(
            "endpoint {} outbound ssrc {} routed from {} to {}",
            endpoint_id,
            ssrc,
            current,
            source_ssrc
        );
        Ok(())
    }

    /// remove_outbound drops the engine's reference to the outbound stream
    /// and its packet cache. Jobs already queued keep theirs until they
    /// finish.
    pub fn remove_outbound(&mut self, endpoint_id: &str, ssrc: u32) -> Result<()> {
        let endpoint = self.endpoint_mut(endpoint_id)?;
        endpoint
            .outbound
            .remove(&ssrc)
            .map(|_| ())
            .ok_or_else(|| Error::ErrOutboundNotFound(endpoint_id.to_owned(), ssrc))
    }

    /// on_video_packet fans a video packet out to every outbound stream the
    /// inbound stream is routed to. Returns the number of jobs queued.
    pub fn on_video_packet(&self, ssrc: u32, packet: BytesMut) -> Result<usize> {
        self.fan_out(ssrc, packet, |endpoint, outbound, inbound, packet, ext| {
            Box::new(VideoForwarderRewriteAndSendJob::new(
                Arc::clone(&outbound.context),
                inbound,
                packet,
                Arc::clone(&endpoint.transport),
                ext,
                self.messages_tx.clone(),
                Arc::clone(&endpoint.id),
            ))
        })
    }

    /// on_audio_packet is the audio flavour of on_video_packet.
    pub fn on_audio_packet(&self, ssrc: u32, packet: BytesMut) -> Result<usize> {
        self.fan_out(ssrc, packet, |endpoint, outbound, inbound, packet, ext| {
            Box::new(AudioForwarderRewriteAndSendJob::new(
                Arc::clone(&outbound.context),
                inbound,
                packet,
                Arc::clone(&endpoint.transport),
                ext,
            ))
        })
    }

    fn fan_out<F>(&self, ssrc: u32, mut packet: BytesMut, make_job: F) -> Result<usize>
    where
        F: Fn(&Endpoint, &Outbound, Arc<SsrcInboundContext>, BytesMut, u32) -> Box<dyn Job>,
    {
        let inbound = self
            .inbound
            .get(&ssrc)
            .ok_or(Error::ErrInboundNotFound(ssrc))?;
        let sequence_number = RtpHeader::parse(&mut packet)?.sequence_number();
        let extended_sequence_number = inbound.extend_sequence_number(sequence_number);

        let mut queued = 0;
        for endpoint in self.endpoints.values() {
            for outbound in endpoint.targets(ssrc) {
                let outstanding = endpoint.transport.job_counter().outstanding();
                if outstanding >= self.config.max_outstanding_jobs {
                    log::debug!(
                        "{} has {} outstanding jobs, dropping ssrc {} seq {}",
                        endpoint.transport.loggable_id(),
                        outstanding,
                        ssrc,
                        extended_sequence_number
                    );
                    continue;
                }

                let job = make_job(
                    endpoint,
                    outbound,
                    Arc::clone(inbound),
                    BytesMut::from(&packet[..]),
                    extended_sequence_number,
                );
                if endpoint.job_queue.add(job) {
                    queued += 1;
                }
            }
        }
        Ok(queued)
    }

    /// process_messages handles the messages posted by jobs since the last
    /// call. Returns the number of messages handled.
    pub fn process_messages(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.messages_rx.try_recv() {
            handled += 1;
            match message {
                EngineMessage::AllocateVideoPacketCache { ssrc, endpoint_id } => {
                    self.allocate_video_packet_cache(ssrc, &endpoint_id)
                }
            }
        }
        handled
    }

    fn allocate_video_packet_cache(&self, ssrc: u32, endpoint_id: &str) {
        let endpoint = match self.endpoints.get(endpoint_id) {
            Some(endpoint) => endpoint,
            None => {
                log::debug!("endpoint {} gone, no packet cache for ssrc {}", endpoint_id, ssrc);
                return;
            }
        };
        let outbound = match endpoint.outbound.get(&ssrc) {
            Some(outbound) => outbound,
            None => {
                log::debug!("outbound ssrc {} gone on endpoint {}", ssrc, endpoint_id);
                return;
            }
        };

        let packet_cache = match PacketCache::new_handle(self.config.packet_cache_log2_size) {
            Ok(packet_cache) => packet_cache,
            Err(err) => {
                log::error!("failed to allocate packet cache for ssrc {}: {}", ssrc, err);
                return;
            }
        };
        log::debug!(
            "allocated packet cache for ssrc {} on endpoint {}",
            ssrc,
            endpoint_id
        );

        let job = SetPacketCacheJob::new(
            Arc::clone(&outbound.context),
            packet_cache,
            endpoint.transport.job_counter(),
        );
        endpoint.job_queue.add(Box::new(job));
    }

    /// collect_plis returns the picture loss indications due to be sent to
    /// the senders at `now`.
    pub fn collect_plis(&self, now: Instant) -> Vec<PictureLossIndication> {
        self.inbound
            .values()
            .filter_map(|inbound| {
                inbound
                    .pli_scheduler
                    .process(now, self.rtcp_sender_ssrc, inbound.ssrc)
            })
            .collect()
    }

    fn endpoint_mut(&mut self, endpoint_id: &str) -> Result<&mut Endpoint> {
        self.endpoints
            .get_mut(endpoint_id)
            .ok_or_else(|| Error::ErrEndpointNotFound(endpoint_id.to_owned()))
    }
}
