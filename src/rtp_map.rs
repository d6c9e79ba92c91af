use std::fmt;

use crate::error::{Error, Result};

/// Format is the negotiated media format of one side of a stream.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Format {
    #[default]
    Empty,
    Vp8,
    H264,
    Opus,
    Rtx,
}

impl Format {
    pub fn is_video(&self) -> bool {
        matches!(self, Format::Vp8 | Format::H264)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Format::Empty => "empty",
            Format::Vp8 => "VP8",
            Format::H264 => "H264",
            Format::Opus => "opus",
            Format::Rtx => "rtx",
        };
        write!(f, "{s}")
    }
}

/// RtpMap holds what one endpoint negotiated for a stream: the format, its
/// payload type and the one-byte header extension ids in that endpoint's
/// numbering space.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RtpMap {
    pub format: Format,
    pub payload_type: u8,
    pub abs_send_time_ext_id: Option<u8>,
    pub audio_level_ext_id: Option<u8>,
}

impl RtpMap {
    pub fn new(format: Format, payload_type: u8) -> Result<Self> {
        if payload_type > 127 {
            return Err(Error::ErrInvalidPayloadType(payload_type));
        }
        Ok(RtpMap {
            format,
            payload_type,
            ..Default::default()
        })
    }

    pub fn with_abs_send_time_ext_id(mut self, id: u8) -> Result<Self> {
        self.abs_send_time_ext_id = Some(validate_ext_id(id)?);
        Ok(self)
    }

    pub fn with_audio_level_ext_id(mut self, id: u8) -> Result<Self> {
        self.audio_level_ext_id = Some(validate_ext_id(id)?);
        Ok(self)
    }
}

fn validate_ext_id(id: u8) -> Result<u8> {
    if (1..=14).contains(&id) {
        Ok(id)
    } else {
        Err(Error::ErrInvalidExtensionId(id))
    }
}
