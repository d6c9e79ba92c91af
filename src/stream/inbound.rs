use parking_lot::Mutex;
use tokio::time::Duration;

use super::pli_scheduler::PliScheduler;
use crate::rtp_map::RtpMap;

/// SsrcInboundContext describes one sender stream. Jobs only read it; the
/// PLI scheduler and the sequence number extension are internally
/// synchronized.
#[derive(Debug)]
pub struct SsrcInboundContext {
    pub ssrc: u32,
    pub rtp_map: RtpMap,
    pub pli_scheduler: PliScheduler,
    highest_sequence_number: Mutex<Option<u32>>,
}

impl SsrcInboundContext {
    pub fn new(ssrc: u32, rtp_map: RtpMap, pli_min_interval: Duration) -> Self {
        SsrcInboundContext {
            ssrc,
            rtp_map,
            pli_scheduler: PliScheduler::new(pli_min_interval),
            highest_sequence_number: Mutex::new(None),
        }
    }

    /// extend_sequence_number turns a 16-bit sequence number into a 32-bit
    /// one carrying the rollover count, relative to the highest sequence
    /// number seen so far on this stream.
    pub fn extend_sequence_number(&self, sequence_number: u16) -> u32 {
        let mut highest = self.highest_sequence_number.lock();
        let extended = match *highest {
            None => sequence_number as u32,
            Some(h) => {
                let delta = sequence_number.wrapping_sub(h as u16) as i16;
                h.wrapping_add(delta as i32 as u32)
            }
        };

        match *highest {
            Some(h) if (extended.wrapping_sub(h) as i32) <= 0 => {}
            _ => *highest = Some(extended),
        }
        extended
    }
}
