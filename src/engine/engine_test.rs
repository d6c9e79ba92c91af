use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use super::*;
use crate::job::Job;
use crate::rtp_map::Format;
use crate::stream::CacheState;
use crate::testing::{build_packet, h264_payload, vp8_packet, RecordingTransport};

const ENDPOINT: &str = "endpoint-1";

fn vp8_map(payload_type: u8) -> RtpMap {
    RtpMap {
        format: Format::Vp8,
        payload_type,
        ..Default::default()
    }
}

fn opus_map(payload_type: u8, audio_level: u8) -> RtpMap {
    RtpMap {
        format: Format::Opus,
        payload_type,
        abs_send_time_ext_id: None,
        audio_level_ext_id: Some(audio_level),
    }
}

fn header_of(packet: &BytesMut) -> (u32, u16, u8) {
    let mut raw = packet.clone();
    let header = RtpHeader::parse(&mut raw).expect("valid header");
    (header.ssrc(), header.sequence_number(), header.payload_type())
}

async fn settle(transport: &RecordingTransport) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.job_counter().outstanding() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("jobs should finish");
}

fn engine_with_endpoint(transport: &Arc<RecordingTransport>) -> Engine {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut engine = Engine::new(EngineConfig::default()).expect("engine");
    engine.add_endpoint(ENDPOINT, Arc::clone(transport) as Arc<dyn Transport>);
    engine
}

struct DirectJob {
    outbound: Arc<Mutex<SsrcOutboundContext>>,
    inbound: Arc<SsrcInboundContext>,
    transport: Arc<RecordingTransport>,
    messages_tx: EngineMessageSender,
    messages_rx: EngineMessageReceiver,
}

impl DirectJob {
    fn new(outbound_map: RtpMap) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        DirectJob {
            outbound: Arc::new(Mutex::new(SsrcOutboundContext::new(1000, 100, outbound_map))),
            inbound: Arc::new(SsrcInboundContext::new(
                100,
                vp8_map(100),
                Duration::from_millis(500),
            )),
            transport: RecordingTransport::new("direct"),
            messages_tx,
            messages_rx,
        }
    }

    fn run(&self, packet: BytesMut, extended_sequence_number: u32) {
        let job = VideoForwarderRewriteAndSendJob::new(
            Arc::clone(&self.outbound),
            Arc::clone(&self.inbound),
            packet,
            Arc::clone(&self.transport) as Arc<dyn Transport>,
            extended_sequence_number,
            self.messages_tx.clone(),
            Arc::from(ENDPOINT),
        );
        assert_eq!(self.transport.job_counter().outstanding(), 1);
        Box::new(job).run();
        assert_eq!(self.transport.job_counter().outstanding(), 0);
    }
}

#[test]
fn test_video_job_never_forwards_rtx() {
    let mut direct = DirectJob::new(RtpMap {
        format: Format::Rtx,
        payload_type: 97,
        ..Default::default()
    });

    direct.run(vp8_packet(100, 1, 1, 1, true), 1);
    direct.run(vp8_packet(100, 2, 1, 1, false), 2);

    assert!(direct.transport.sent().is_empty());
    assert!(direct.messages_rx.try_recv().is_err());
    assert!(!direct.outbound.lock().packet_cache.is_requested());
}

#[test]
fn test_video_job_forwards_and_caches() {
    let mut direct = DirectJob::new(vp8_map(96));
    let cache = PacketCache::new_handle(4).expect("cache");

    direct.run(vp8_packet(100, 1049, 20, 3, true), 1049);
    assert_eq!(
        direct.messages_rx.try_recv().expect("allocation request"),
        EngineMessage::AllocateVideoPacketCache {
            ssrc: 1000,
            endpoint_id: Arc::from(ENDPOINT),
        }
    );
    assert!(direct.outbound.lock().set_packet_cache(Arc::clone(&cache)));

    direct.run(vp8_packet(100, 1050, 20, 3, false), 1050);
    assert!(
        direct.messages_rx.try_recv().is_err(),
        "cache must be requested once"
    );

    let sent = direct.transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(header_of(&sent[0]), (1000, 1049, 96));
    assert_eq!(header_of(&sent[1]), (1000, 1050, 96));
    assert_eq!(
        cache.lock().get(1050).as_deref(),
        Some(&sent[1][..]),
        "cached copy is the rewritten packet"
    );
    assert!(cache.lock().get(1049).is_none());
}

#[test]
fn test_video_job_gates_on_key_frame() {
    let direct = DirectJob::new(vp8_map(96));

    direct.run(vp8_packet(100, 10, 1, 1, true), 10);
    direct.outbound.lock().needs_keyframe = true;

    direct.run(vp8_packet(100, 11, 1, 1, false), 11);
    direct.run(vp8_packet(100, 12, 1, 1, false), 12);
    assert_eq!(direct.transport.sent().len(), 1);
    assert!(direct.outbound.lock().needs_keyframe);

    direct.run(vp8_packet(100, 13, 2, 2, true), 13);
    assert!(!direct.outbound.lock().needs_keyframe);
    let sent = direct.transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(header_of(&sent[1]).1, 13);
}

#[test]
fn test_video_job_foreign_delta_frame_requests_pli() {
    let direct = DirectJob::new(vp8_map(96));

    direct.run(vp8_packet(200, 500, 1, 1, false), 500);

    assert!(direct.transport.sent().is_empty());
    assert!(direct.outbound.lock().needs_keyframe);
    assert!(direct.inbound.pli_scheduler.is_pending());
}

#[test]
fn test_video_job_fresh_outbound_waits_for_key_frame() {
    let direct = DirectJob::new(vp8_map(96));

    direct.run(vp8_packet(100, 40, 1, 1, false), 40);
    assert!(direct.transport.sent().is_empty());
    assert!(!direct.outbound.lock().rewrite.is_initialized());
    assert!(direct.outbound.lock().needs_keyframe);
    assert!(direct.inbound.pli_scheduler.is_pending());

    direct.run(vp8_packet(100, 41, 1, 1, false), 41);
    assert!(direct.transport.sent().is_empty());

    direct.run(vp8_packet(100, 42, 2, 2, true), 42);
    assert!(!direct.outbound.lock().needs_keyframe);
    let sent = direct.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(header_of(&sent[0]), (1000, 42, 96));
}

#[test]
fn test_video_job_drops_network_duplicates() {
    let direct = DirectJob::new(vp8_map(96));
    let cache = PacketCache::new_handle(4).expect("cache");

    direct.run(vp8_packet(100, 10, 1, 1, true), 10);
    assert!(direct.outbound.lock().set_packet_cache(Arc::clone(&cache)));
    direct.run(vp8_packet(100, 11, 1, 1, false), 11);
    direct.run(vp8_packet(100, 12, 1, 1, false), 12);
    direct.run(vp8_packet(100, 11, 1, 1, false), 11);

    let sequence_numbers: Vec<u16> = direct
        .transport
        .sent()
        .iter()
        .map(|p| header_of(p).1)
        .collect();
    assert_eq!(sequence_numbers, vec![10, 11, 12]);
}

#[test]
fn test_video_job_drops_on_disconnected_transport() {
    let direct = DirectJob::new(vp8_map(96));
    direct.transport.set_connected(false);

    direct.run(vp8_packet(100, 1, 1, 1, true), 1);

    assert!(direct.transport.sent().is_empty());
    assert!(!direct.outbound.lock().rewrite.is_initialized());
}

#[test]
fn test_video_job_h264() {
    let direct = DirectJob::new(RtpMap {
        format: Format::H264,
        payload_type: 102,
        ..Default::default()
    });
    direct.outbound.lock().needs_keyframe = true;

    direct.run(build_packet(100, 7, 90, 125, &[], &h264_payload(1)), 7);
    assert!(direct.transport.sent().is_empty());

    direct.run(build_packet(100, 8, 90, 125, &[], &h264_payload(7)), 8);
    let sent = direct.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(header_of(&sent[0]), (1000, 8, 102));
}

#[cfg(debug_assertions)]
#[test]
#[should_panic]
fn test_video_job_malformed_header_is_invariant_violation() {
    let direct = DirectJob::new(vp8_map(96));
    direct.run(BytesMut::from(&[0x80u8, 0x60, 0x00][..]), 1);
}

#[tokio::test]
async fn test_engine_outbound_bookkeeping() {
    let transport = RecordingTransport::new("t1");
    let mut engine = engine_with_endpoint(&transport);

    assert_eq!(
        engine.add_outbound("unknown", 100, 1000, vp8_map(96)).err(),
        Some(Error::ErrEndpointNotFound("unknown".to_owned()))
    );

    engine
        .add_outbound(ENDPOINT, 100, 1000, vp8_map(96))
        .expect("first subscription");
    assert_eq!(
        engine.add_outbound(ENDPOINT, 100, 1001, vp8_map(96)).err(),
        Some(Error::ErrOutboundExists(ENDPOINT.to_owned(), 100))
    );
    engine
        .add_outbound(ENDPOINT, 200, 1001, vp8_map(96))
        .expect("other source");
    assert_eq!(
        engine.set_outbound_source(ENDPOINT, 1000, 200),
        Err(Error::ErrOutboundExists(ENDPOINT.to_owned(), 200))
    );

    engine.remove_outbound(ENDPOINT, 1001).expect("remove");
    assert_eq!(
        engine.remove_outbound(ENDPOINT, 1001),
        Err(Error::ErrOutboundNotFound(ENDPOINT.to_owned(), 1001))
    );
    engine
        .set_outbound_source(ENDPOINT, 1000, 200)
        .expect("reroute");

    assert_eq!(
        engine.on_video_packet(300, vp8_packet(300, 1, 1, 1, true)),
        Err(Error::ErrInboundNotFound(300))
    );
    engine.add_inbound(300, vp8_map(100));
    assert_eq!(
        engine.on_video_packet(300, BytesMut::from(&[0x80u8][..])),
        Err(Error::ErrHeaderSizeInsufficient)
    );
    assert_eq!(engine.on_video_packet(300, vp8_packet(300, 1, 1, 1, true)), Ok(0));
}

#[tokio::test]
async fn test_engine_vp8_forwarding_with_cache_allocation() {
    let transport = RecordingTransport::new("t1");
    let mut engine = engine_with_endpoint(&transport);
    engine.add_inbound(100, vp8_map(100));
    let outbound = engine
        .add_outbound(ENDPOINT, 100, 1000, vp8_map(96))
        .expect("outbound");

    assert_eq!(engine.on_video_packet(100, vp8_packet(100, 1049, 5, 1, true)), Ok(1));
    settle(&transport).await;
    assert!(matches!(outbound.lock().packet_cache, CacheState::Pending));

    assert_eq!(engine.process_messages(), 1);
    settle(&transport).await;
    assert!(matches!(outbound.lock().packet_cache, CacheState::Ready(_)));

    for seq in 1050..1055u16 {
        assert_eq!(engine.on_video_packet(100, vp8_packet(100, seq, 5, 1, false)), Ok(1));
    }
    settle(&transport).await;
    assert_eq!(engine.process_messages(), 0, "allocation requested once");

    let sent = transport.sent();
    let sequence_numbers: Vec<u16> = sent.iter().map(|p| header_of(p).1).collect();
    assert_eq!(sequence_numbers, vec![1049, 1050, 1051, 1052, 1053, 1054]);
    assert!(sent.iter().all(|p| header_of(p).2 == 96));

    let cache = outbound
        .lock()
        .packet_cache
        .handle()
        .cloned()
        .expect("cache ready");
    assert_eq!(cache.lock().capacity(), 1024);
    assert_eq!(cache.lock().get(1054).as_deref(), Some(&sent[5][..]));
}

#[tokio::test]
async fn test_engine_source_switch_waits_for_key_frame() {
    let transport = RecordingTransport::new("t1");
    let mut engine = engine_with_endpoint(&transport);
    engine.set_rtcp_sender_ssrc(1);
    engine.add_inbound(100, vp8_map(100));
    engine.add_inbound(200, vp8_map(100));
    engine
        .add_outbound(ENDPOINT, 100, 1000, vp8_map(96))
        .expect("outbound");

    engine
        .on_video_packet(100, vp8_packet(100, 10, 1, 1, true))
        .expect("queued");
    engine
        .on_video_packet(100, vp8_packet(100, 11, 1, 1, false))
        .expect("queued");
    settle(&transport).await;

    engine
        .set_outbound_source(ENDPOINT, 1000, 200)
        .expect("reroute");
    assert_eq!(engine.on_video_packet(100, vp8_packet(100, 12, 1, 1, false)), Ok(0));

    engine
        .on_video_packet(200, vp8_packet(200, 5000, 70, 9, false))
        .expect("queued");
    engine
        .on_video_packet(200, vp8_packet(200, 5001, 70, 9, false))
        .expect("queued");
    settle(&transport).await;
    assert_eq!(transport.sent().len(), 2);

    let now = Instant::now();
    let plis = engine.collect_plis(now);
    assert_eq!(plis.len(), 1);
    assert_eq!(plis[0].sender_ssrc, 1);
    assert_eq!(plis[0].media_ssrc, 200);
    assert!(engine.collect_plis(now).is_empty());

    engine
        .on_video_packet(200, vp8_packet(200, 5002, 71, 9, true))
        .expect("queued");
    engine
        .on_video_packet(200, vp8_packet(200, 5003, 71, 9, false))
        .expect("queued");
    settle(&transport).await;

    let sent = transport.sent();
    let headers: Vec<(u32, u16, u8)> = sent.iter().map(header_of).collect();
    assert_eq!(
        headers,
        vec![
            (1000, 10, 96),
            (1000, 11, 96),
            (1000, 12, 96),
            (1000, 13, 96)
        ]
    );
}

#[tokio::test]
async fn test_engine_audio_forwarding() {
    let transport = RecordingTransport::new("t1");
    let mut engine = engine_with_endpoint(&transport);
    engine.add_inbound(100, opus_map(111, 1));
    engine.add_inbound(200, opus_map(111, 1));
    engine
        .add_outbound(ENDPOINT, 100, 2000, opus_map(109, 4))
        .expect("outbound");

    let audio = |ssrc: u32, seq: u16| {
        build_packet(ssrc, seq, seq as u32 * 960, 111, &[(1, &[0x80])], &[0xFC])
    };

    engine.on_audio_packet(100, audio(100, 300)).expect("queued");
    engine.on_audio_packet(100, audio(100, 301)).expect("queued");
    settle(&transport).await;
    engine
        .set_outbound_source(ENDPOINT, 2000, 200)
        .expect("reroute");
    engine.on_audio_packet(200, audio(200, 9)).expect("queued");
    settle(&transport).await;

    let sent = transport.sent();
    let headers: Vec<(u32, u16, u8)> = sent.iter().map(header_of).collect();
    assert_eq!(headers, vec![(2000, 300, 109), (2000, 301, 109), (2000, 302, 109)]);
    for packet in sent {
        let mut raw = packet.clone();
        let header = RtpHeader::parse(&mut raw).expect("valid header");
        let ids: Vec<u8> = header.extensions().map(|e| e.id).collect();
        assert_eq!(ids, vec![4]);
    }
    assert_eq!(engine.process_messages(), 0, "audio has no packet cache");
}

#[tokio::test]
async fn test_engine_backpressure_and_endpoint_removal() {
    let _ = env_logger::builder().is_test(true).try_init();
    let transport = RecordingTransport::new("t1");
    let mut config = EngineConfig::default();
    config.set_max_outstanding_jobs(2);
    let mut engine = Engine::new(config).expect("engine");
    engine.add_endpoint(ENDPOINT, Arc::clone(&transport) as Arc<dyn Transport>);
    engine.add_inbound(100, vp8_map(100));
    engine
        .add_outbound(ENDPOINT, 100, 1000, vp8_map(96))
        .expect("outbound");

    // the queue worker does not run until the test yields
    assert_eq!(engine.on_video_packet(100, vp8_packet(100, 1, 1, 1, true)), Ok(1));
    assert_eq!(engine.on_video_packet(100, vp8_packet(100, 2, 1, 1, false)), Ok(1));
    assert_eq!(engine.on_video_packet(100, vp8_packet(100, 3, 1, 1, false)), Ok(0));
    assert_eq!(transport.job_counter().outstanding(), 2);

    engine.remove_endpoint(ENDPOINT).expect("remove");
    settle(&transport).await;
    assert!(transport.sent().is_empty(), "queued jobs are discarded");
    assert_eq!(
        engine.remove_endpoint(ENDPOINT),
        Err(Error::ErrEndpointNotFound(ENDPOINT.to_owned()))
    );
}
