use parking_lot::Mutex;
use portable_atomic::{AtomicBool, Ordering};
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use tokio::time::{Duration, Instant};

/// PliScheduler records that a sender must be asked for a key frame and
/// decides when the request actually goes out. Jobs on any worker only mark
/// intent; the engine drains the scheduler at its own cadence.
#[derive(Debug)]
pub struct PliScheduler {
    pending: AtomicBool,
    last_sent: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl PliScheduler {
    pub fn new(min_interval: Duration) -> Self {
        PliScheduler {
            pending: AtomicBool::new(false),
            last_sent: Mutex::new(None),
            min_interval,
        }
    }

    /// trigger_pli marks a PLI as pending. Calling it again before the PLI
    /// is sent has no further effect.
    pub fn trigger_pli(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            log::trace!("pli requested");
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// process returns the PLI to send upstream when one is pending and the
    /// minimum interval since the previous one has elapsed.
    pub fn process(
        &self,
        now: Instant,
        sender_ssrc: u32,
        media_ssrc: u32,
    ) -> Option<PictureLossIndication> {
        if !self.is_pending() {
            return None;
        }

        let mut last_sent = self.last_sent.lock();
        if let Some(last) = *last_sent {
            if now.saturating_duration_since(last) < self.min_interval {
                return None;
            }
        }

        self.pending.store(false, Ordering::Release);
        *last_sent = Some(now);
        Some(PictureLossIndication {
            sender_ssrc,
            media_ssrc,
        })
    }
}
