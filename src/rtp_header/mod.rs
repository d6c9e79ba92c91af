
use rtp::header::{
    CC_MASK, CSRC_LENGTH, CSRC_OFFSET, EXTENSION_ID_RESERVED, EXTENSION_MASK,
    EXTENSION_PROFILE_ONE_BYTE, EXTENSION_SHIFT, MARKER_MASK, MARKER_SHIFT, PADDING_MASK,
    PADDING_SHIFT, PT_MASK, SEQ_NUM_OFFSET, SSRC_OFFSET, TIMESTAMP_OFFSET, VERSION_MASK,
    VERSION_SHIFT,
};

use crate::error::{Error, Result};

pub const RTP_VERSION: u8 = 2;

const EXTENSION_HEADER_LENGTH: usize = 4;

/// Extension locates one RFC 8285 one-byte header extension element inside
/// the packet buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Extension {
    /// offset of the element's id/length byte in the packet
    pub offset: usize,
    pub id: u8,
    /// length of the element data in bytes (1..=16)
    pub len: usize,
}

#[derive(Debug, Copy, Clone)]
struct ExtensionBlock {
    profile: u16,
    start: usize,
    end: usize,
}

/// RtpHeader is a mutable view over the header of an RTP packet which is
/// owned elsewhere. Every setter writes the field in place and never changes
/// the packet length.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            contributing source (CSRC) identifiers             |
/// |                             ....                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug)]
pub struct RtpHeader<'a> {
    buf: &'a mut [u8],
    header_len: usize,
    extension: Option<ExtensionBlock>,
}

impl<'a> RtpHeader<'a> {
    /// parse validates the fixed header, the CSRC list and the bounds of the
    /// extension block.
    pub fn parse(buf: &'a mut [u8]) -> Result<Self> {
        if buf.len() < CSRC_OFFSET {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        let b0 = buf[0];
        let version = b0 >> VERSION_SHIFT & VERSION_MASK;
        if version != RTP_VERSION {
            return Err(Error::ErrUnsupportedVersion(version));
        }

        let cc = (b0 & CC_MASK) as usize;
        let mut curr_offset = CSRC_OFFSET + cc * CSRC_LENGTH;
        if buf.len() < curr_offset {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        let extension = if (b0 >> EXTENSION_SHIFT & EXTENSION_MASK) > 0 {
            if buf.len() < curr_offset + EXTENSION_HEADER_LENGTH {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
            let profile = u16::from_be_bytes([buf[curr_offset], buf[curr_offset + 1]]);
            let length =
                u16::from_be_bytes([buf[curr_offset + 2], buf[curr_offset + 3]]) as usize * 4;
            curr_offset += EXTENSION_HEADER_LENGTH;

            if buf.len() < curr_offset + length {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
            let block = ExtensionBlock {
                profile,
                start: curr_offset,
                end: curr_offset + length,
            };
            curr_offset += length;
            Some(block)
        } else {
            None
        };

        Ok(RtpHeader {
            buf,
            header_len: curr_offset,
            extension,
        })
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn padding(&self) -> bool {
        (self.buf[0] >> PADDING_SHIFT & PADDING_MASK) > 0
    }

    pub fn marker(&self) -> bool {
        (self.buf[1] >> MARKER_SHIFT & MARKER_MASK) > 0
    }

    pub fn payload_type(&self) -> u8 {
        self.buf[1] & PT_MASK
    }

    /// set_payload_type replaces the payload type and keeps the marker bit.
    pub fn set_payload_type(&mut self, payload_type: u8) {
        self.buf[1] = (self.buf[1] & !PT_MASK) | (payload_type & PT_MASK);
    }

    pub fn sequence_number(&self) -> u16 {
        u16::from_be_bytes([self.buf[SEQ_NUM_OFFSET], self.buf[SEQ_NUM_OFFSET + 1]])
    }

    pub fn set_sequence_number(&mut self, sequence_number: u16) {
        self.buf[SEQ_NUM_OFFSET..SEQ_NUM_OFFSET + 2].copy_from_slice(&sequence_number.to_be_bytes());
    }

    pub fn timestamp(&self) -> u32 {
        read_u32(self.buf, TIMESTAMP_OFFSET)
    }

    pub fn set_timestamp(&mut self, timestamp: u32) {
        self.buf[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4].copy_from_slice(&timestamp.to_be_bytes());
    }

    pub fn ssrc(&self) -> u32 {
        read_u32(self.buf, SSRC_OFFSET)
    }

    pub fn set_ssrc(&mut self, ssrc: u32) {
        self.buf[SSRC_OFFSET..SSRC_OFFSET + 4].copy_from_slice(&ssrc.to_be_bytes());
    }

    /// payload returns the bytes after the header, excluding padding when the
    /// padding count is consistent with the packet length.
    pub fn payload(&self) -> &[u8] {
        let end = self.payload_end();
        &self.buf[self.header_len..end]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let end = self.payload_end();
        &mut self.buf[self.header_len..end]
    }

    fn payload_end(&self) -> usize {
        let len = self.buf.len();
        if self.padding() && len > self.header_len {
            let padding_len = self.buf[len - 1] as usize;
            if padding_len > 0 && padding_len <= len - self.header_len {
                return len - padding_len;
            }
        }
        len
    }

    pub fn has_extension(&self) -> bool {
        self.extension.is_some()
    }

    pub fn extension_profile(&self) -> Option<u16> {
        self.extension.map(|e| e.profile)
    }

    /// extensions iterates over the one-byte header extension elements. Blocks
    /// using the two-byte or a non RFC 8285 profile yield nothing.
    pub fn extensions(&self) -> OneByteExtensions<'_> {
        match self.extension {
            Some(block) if block.profile == EXTENSION_PROFILE_ONE_BYTE => OneByteExtensions {
                buf: &*self.buf,
                pos: block.start,
                end: block.end,
            },
            _ => OneByteExtensions {
                buf: &*self.buf,
                pos: 0,
                end: 0,
            },
        }
    }

    /// extension_after returns the element following `previous`, or the
    /// first element when `previous` is None, so a caller can rewrite
    /// elements while walking the block.
    pub fn extension_after(&self, previous: Option<&Extension>) -> Option<Extension> {
        let mut extensions = self.extensions();
        if let Some(previous) = previous {
            extensions.pos = previous.offset + 1 + previous.len;
        }
        extensions.next()
    }

    /// set_extension_id renumbers one extension element, keeping its length.
    pub fn set_extension_id(&mut self, extension: &Extension, id: u8) -> Result<()> {
        if id == 0 || id >= EXTENSION_ID_RESERVED {
            return Err(Error::ErrInvalidExtensionId(id));
        }
        let b = &mut self.buf[extension.offset];
        *b = (id << 4) | (*b & 0x0F);
        Ok(())
    }
}

/// OneByteExtensions walks an RFC 8285 one-byte extension block.
pub struct OneByteExtensions<'b> {
    buf: &'b [u8],
    pos: usize,
    end: usize,
}

impl Iterator for OneByteExtensions<'_> {
    type Item = Extension;

    fn next(&mut self) -> Option<Extension> {
        while self.pos < self.end {
            let b = self.buf[self.pos];
            if b == 0x00 {
                // padding
                self.pos += 1;
                continue;
            }

            let id = b >> 4;
            if id == EXTENSION_ID_RESERVED {
                self.pos = self.end;
                return None;
            }

            let len = ((b & 0x0F) + 1) as usize;
            if self.pos + 1 + len > self.end {
                self.pos = self.end;
                return None;
            }

            let extension = Extension {
                offset: self.pos,
                id,
                len,
            };
            self.pos += 1 + len;
            return Some(extension);
        }
        None
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}
