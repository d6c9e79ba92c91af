use crate::config::DEFAULT_SPLICE_TIMESTAMP_GAP;
use crate::packet_cache::PacketCacheHandle;
use crate::rtp_map::RtpMap;

/// CacheState tracks the lazily allocated packet cache of an outbound
/// stream. It only moves forward: NotRequested, Pending, Ready.
#[derive(Debug, Default, Clone)]
pub enum CacheState {
    #[default]
    NotRequested,
    Pending,
    Ready(PacketCacheHandle),
}

impl CacheState {
    pub fn is_requested(&self) -> bool {
        !matches!(self, CacheState::NotRequested)
    }

    pub fn handle(&self) -> Option<&PacketCacheHandle> {
        match self {
            CacheState::Ready(handle) => Some(handle),
            _ => None,
        }
    }
}

/// LastSent holds the continuity fields of the newest packet forwarded on
/// an outbound stream, in outbound numbering.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct LastSent {
    pub sequence_number: u32,
    pub timestamp: u32,
    pub picture_id: u16,
    pub tl0_pic_idx: u8,
}

/// Offsets map the active source's numbering onto the outbound numbering.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Offsets {
    pub sequence_number: u32,
    pub timestamp: u32,
    pub picture_id: u16,
    pub tl0_pic_idx: u8,
}

/// Number of outbound sequence numbers behind the newest one whose
/// forwarding is remembered for duplicate detection.
pub const SENT_WINDOW_SIZE: u32 = 128;

#[derive(Debug, Default, Clone)]
pub struct RewriteState {
    pub last_sent: Option<LastSent>,
    pub offset: Offsets,
    /// extended sequence number, in the active source's numbering, of the
    /// first packet forwarded since the stream was spliced onto that source
    pub source_base: Option<u32>,
    /// bit i is set when last_sent.sequence_number - i was forwarded
    sent_window: u128,
}

impl RewriteState {
    pub fn is_initialized(&self) -> bool {
        self.source_base.is_some()
    }

    /// record marks an outbound sequence number as forwarded. It returns
    /// false for a number already forwarded, or one too far behind the
    /// newest to tell.
    pub fn record(&mut self, out: LastSent) -> bool {
        let last = match self.last_sent {
            Some(last) => last,
            None => {
                self.last_sent = Some(out);
                self.sent_window = 1;
                return true;
            }
        };

        let diff = out.sequence_number.wrapping_sub(last.sequence_number) as i32;
        if diff > 0 {
            self.sent_window = self.sent_window.checked_shl(diff as u32).unwrap_or(0) | 1;
            self.last_sent = Some(out);
            return true;
        }

        let behind = diff.unsigned_abs();
        if behind >= SENT_WINDOW_SIZE {
            return false;
        }
        let bit = 1u128 << behind;
        if self.sent_window & bit != 0 {
            return false;
        }
        self.sent_window |= bit;
        true
    }
}

/// SsrcOutboundContext is the forwarding state of one (receiver, source
/// track) subscription. It is mutated only by jobs running on the
/// receiver's serial job queue.
#[derive(Debug)]
pub struct SsrcOutboundContext {
    /// ssrc written on every packet of this outbound stream
    pub ssrc: u32,
    /// the source currently contributing to this outbound stream
    pub original_ssrc: u32,
    pub rtp_map: RtpMap,
    pub packet_cache: CacheState,
    pub needs_keyframe: bool,
    pub rewrite: RewriteState,
    pub splice_timestamp_gap: u32,
}

impl SsrcOutboundContext {
    pub fn new(ssrc: u32, original_ssrc: u32, rtp_map: RtpMap) -> Self {
        SsrcOutboundContext {
            ssrc,
            original_ssrc,
            rtp_map,
            packet_cache: CacheState::NotRequested,
            needs_keyframe: false,
            rewrite: RewriteState::default(),
            splice_timestamp_gap: DEFAULT_SPLICE_TIMESTAMP_GAP,
        }
    }

    pub fn with_splice_timestamp_gap(mut self, gap: u32) -> Self {
        self.splice_timestamp_gap = gap;
        self
    }

    /// should_send rejects packets of the active source which predate the
    /// point where the outbound stream was spliced onto it. Packets of other
    /// sources are left to the rewriter, which splices on them.
    pub fn should_send(&self, ssrc: u32, extended_sequence_number: u32) -> bool {
        if ssrc != self.original_ssrc {
            return true;
        }
        match self.rewrite.source_base {
            Some(base) => (extended_sequence_number.wrapping_sub(base) as i32) >= 0,
            None => true,
        }
    }

    /// request_packet_cache moves the cache from NotRequested to Pending and
    /// returns true only for that transition.
    pub fn request_packet_cache(&mut self) -> bool {
        if self.packet_cache.is_requested() {
            return false;
        }
        self.packet_cache = CacheState::Pending;
        true
    }

    /// set_packet_cache installs an allocated cache. Only a Pending cache
    /// moves to Ready; a Ready cache is never replaced.
    pub fn set_packet_cache(&mut self, handle: PacketCacheHandle) -> bool {
        match self.packet_cache {
            CacheState::Pending => {
                self.packet_cache = CacheState::Ready(handle);
                true
            }
            _ => false,
        }
    }
}
