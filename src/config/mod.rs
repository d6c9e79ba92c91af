
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::error::{Error, Result};

pub(crate) const DEFAULT_PACKET_CACHE_LOG2_SIZE: u8 = 10;
pub(crate) const DEFAULT_PLI_MIN_INTERVAL_MS: u64 = 500;
pub(crate) const DEFAULT_MAX_OUTSTANDING_JOBS: usize = 2048;
pub(crate) const DEFAULT_SPLICE_TIMESTAMP_GAP: u32 = 3000;

/// EngineConfig tunes the forwarding engine. Every field has a default, so a
/// partial JSON document is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// packet caches hold 1 << packet_cache_log2_size packets
    pub packet_cache_log2_size: u8,
    pub pli_min_interval_ms: u64,
    /// outstanding jobs per transport above which new packets are dropped
    pub max_outstanding_jobs: usize,
    /// RTP clock ticks inserted between the last packet of the previous
    /// source and the first packet of the new one on a source switch
    pub splice_timestamp_gap: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            packet_cache_log2_size: DEFAULT_PACKET_CACHE_LOG2_SIZE,
            pli_min_interval_ms: DEFAULT_PLI_MIN_INTERVAL_MS,
            max_outstanding_jobs: DEFAULT_MAX_OUTSTANDING_JOBS,
            splice_timestamp_gap: DEFAULT_SPLICE_TIMESTAMP_GAP,
        }
    }
}

impl EngineConfig {
    /// from_json parses and validates a configuration document.
    pub fn from_json(s: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.packet_cache_log2_size > 15 {
            return Err(Error::ErrInvalidCacheSize(self.packet_cache_log2_size));
        }
        if self.max_outstanding_jobs == 0 {
            return Err(Error::ErrConfig(
                "max_outstanding_jobs must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn pli_min_interval(&self) -> Duration {
        Duration::from_millis(self.pli_min_interval_ms)
    }

    /// set_packet_cache_log2_size sets the size of packet caches allocated for
    /// outbound video streams.
    /// Size must be one of: 1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768
    pub fn set_packet_cache_log2_size(&mut self, log2_size: u8) -> Result<()> {
        if log2_size > 15 {
            return Err(Error::ErrInvalidCacheSize(log2_size));
        }
        self.packet_cache_log2_size = log2_size;
        Ok(())
    }

    pub fn set_pli_min_interval(&mut self, interval: Duration) {
        self.pli_min_interval_ms = interval.as_millis() as u64;
    }

    pub fn set_max_outstanding_jobs(&mut self, max: usize) {
        self.max_outstanding_jobs = max;
    }

    pub fn set_splice_timestamp_gap(&mut self, gap: u32) {
        self.splice_timestamp_gap = gap;
    }
}
