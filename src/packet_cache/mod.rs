
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Error, Result};

const UINT16SIZE_HALF: u16 = 1 << 15;

/// PacketCacheHandle is shared between the forwarding path, which fills the
/// cache, and the retransmission path, which reads it.
pub type PacketCacheHandle = Arc<Mutex<PacketCache>>;

/// PacketCache keeps the most recently sent packets of one outbound stream,
/// keyed by their rewritten sequence number. Inserting a newer sequence
/// number evicts everything that falls out of the window.
#[derive(Debug)]
pub struct PacketCache {
    packets: Vec<Option<(u16, Bytes)>>,
    size: u16,
    last_added: u16,
    started: bool,
}

impl PacketCache {
    /// new creates a cache holding 1 << log2_size packets.
    /// Size must be one of: 1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768
    pub fn new(log2_size: u8) -> Result<Self> {
        if log2_size > 15 {
            return Err(Error::ErrInvalidCacheSize(log2_size));
        }
        Ok(PacketCache {
            packets: vec![None; 1 << log2_size],
            size: 1 << log2_size,
            last_added: 0,
            started: false,
        })
    }

    pub fn new_handle(log2_size: u8) -> Result<PacketCacheHandle> {
        Ok(Arc::new(Mutex::new(PacketCache::new(log2_size)?)))
    }

    pub fn capacity(&self) -> usize {
        self.size as usize
    }

    fn index(&self, seq: u16) -> usize {
        (seq % self.size) as usize
    }

    /// add stores a copy of packet under sequence_number. Returns false when
    /// the sequence number is already stored or is older than the window.
    pub fn add(&mut self, packet: &[u8], sequence_number: u16) -> bool {
        let seq = sequence_number;
        if !self.started {
            let i = self.index(seq);
            self.packets[i] = Some((seq, Bytes::copy_from_slice(packet)));
            self.last_added = seq;
            self.started = true;
            return true;
        }

        let diff = seq.wrapping_sub(self.last_added);
        if diff == 0 {
            return false;
        }

        if diff < UINT16SIZE_HALF {
            let mut i = self.last_added.wrapping_add(1);
            while i != seq {
                let index = self.index(i);
                self.packets[index] = None;
                i = i.wrapping_add(1);
            }
            let index = self.index(seq);
            self.packets[index] = Some((seq, Bytes::copy_from_slice(packet)));
            self.last_added = seq;
            return true;
        }

        // older than the newest entry, only fill a hole inside the window
        let age = self.last_added.wrapping_sub(seq);
        if age >= self.size {
            return false;
        }
        let index = self.index(seq);
        match &self.packets[index] {
            Some((stored, _)) if *stored == seq => false,
            _ => {
                self.packets[index] = Some((seq, Bytes::copy_from_slice(packet)));
                true
            }
        }
    }

    pub fn get(&self, sequence_number: u16) -> Option<Bytes> {
        if !self.started {
            return None;
        }

        let diff = self.last_added.wrapping_sub(sequence_number);
        if diff >= UINT16SIZE_HALF || diff >= self.size {
            return None;
        }

        match &self.packets[self.index(sequence_number)] {
            Some((seq, packet)) if *seq == sequence_number => Some(packet.clone()),
            _ => None,
        }
    }
}
