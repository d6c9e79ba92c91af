//! Packet builders and a transport double shared by the unit tests.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, Ordering};
use rtp::header::{Extension, Header, EXTENSION_PROFILE_ONE_BYTE};
use util::marshal::Marshal;

use crate::job::JobCounter;
use crate::transport::Transport;

/// VP8 payload descriptor with X, I (15-bit picture id) and L set, followed by
/// a three byte VP8 payload header. The P bit of the payload header is the
/// inverse of `key_frame`.
pub(crate) fn vp8_payload(picture_id: u16, tl0_pic_idx: u8, key_frame: bool) -> Vec<u8> {
    vec![
        0x90,
        0xC0,
        0x80 | ((picture_id >> 8) as u8 & 0x7F),
        picture_id as u8,
        tl0_pic_idx,
        if key_frame { 0x00 } else { 0x01 },
        0x9D,
        0x01,
    ]
}

pub(crate) fn h264_payload(nalu_type: u8) -> Vec<u8> {
    vec![0x60 | (nalu_type & 0x1F), 0xAA, 0xBB, 0xCC]
}

pub(crate) fn build_packet(
    ssrc: u32,
    sequence_number: u16,
    timestamp: u32,
    payload_type: u8,
    extensions: &[(u8, &[u8])],
    payload: &[u8],
) -> BytesMut {
    let header = Header {
        version: 2,
        extension: !extensions.is_empty(),
        extension_profile: if extensions.is_empty() {
            0
        } else {
            EXTENSION_PROFILE_ONE_BYTE
        },
        extensions: extensions
            .iter()
            .map(|(id, data)| Extension {
                id: *id,
                payload: Bytes::copy_from_slice(data),
            })
            .collect(),
        payload_type,
        sequence_number,
        timestamp,
        ssrc,
        ..Default::default()
    };

    let raw = header.marshal().expect("marshal test header");
    let mut packet = BytesMut::with_capacity(raw.len() + payload.len());
    packet.extend_from_slice(&raw);
    packet.extend_from_slice(payload);
    packet
}

pub(crate) fn vp8_packet(
    ssrc: u32,
    sequence_number: u16,
    picture_id: u16,
    tl0_pic_idx: u8,
    key_frame: bool,
) -> BytesMut {
    build_packet(
        ssrc,
        sequence_number,
        sequence_number as u32 * 3000,
        100,
        &[],
        &vp8_payload(picture_id, tl0_pic_idx, key_frame),
    )
}

/// In-memory transport recording every packet handed over for sending.
pub(crate) struct RecordingTransport {
    id: String,
    connected: AtomicBool,
    job_counter: JobCounter,
    sent: Mutex<Vec<BytesMut>>,
}

impl RecordingTransport {
    pub(crate) fn new(id: &str) -> Arc<Self> {
        Arc::new(RecordingTransport {
            id: id.to_owned(),
            connected: AtomicBool::new(true),
            job_counter: JobCounter::new(),
            sent: Mutex::new(vec![]),
        })
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub(crate) fn sent(&self) -> Vec<BytesMut> {
        self.sent.lock().clone()
    }
}

impl Transport for RecordingTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn protect_and_send(&self, packet: BytesMut) {
        self.sent.lock().push(packet);
    }

    fn loggable_id(&self) -> &str {
        &self.id
    }

    fn job_counter(&self) -> &JobCounter {
        &self.job_counter
    }
}
