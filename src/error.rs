use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// ErrHeaderSizeInsufficient indicates the buffer is shorter than the
    /// fixed RTP header plus its CSRC list.
    #[error("RTP header size insufficient")]
    ErrHeaderSizeInsufficient,

    /// ErrHeaderSizeInsufficientForExtension indicates the extension block
    /// announced by the header runs past the end of the buffer.
    #[error("RTP header size insufficient for extension")]
    ErrHeaderSizeInsufficientForExtension,

    /// ErrUnsupportedVersion indicates a version field other than 2.
    #[error("unsupported RTP version {0}")]
    ErrUnsupportedVersion(u8),

    /// ErrInvalidCacheSize indicates a packet cache size which is not a
    /// power of two in the range 1..=32768.
    #[error("packet cache log2 size must be between 0 and 15, got {0}")]
    ErrInvalidCacheSize(u8),

    /// ErrInvalidExtensionId indicates a one-byte header extension id
    /// outside 1..=14.
    #[error("header extension id must be between 1 and 14 for one byte extensions, got {0}")]
    ErrInvalidExtensionId(u8),

    /// ErrInvalidPayloadType indicates a payload type above 127.
    #[error("payload type must be between 0 and 127, got {0}")]
    ErrInvalidPayloadType(u8),

    /// ErrOutboundExists indicates a second outbound context for the same
    /// (endpoint, source) subscription.
    #[error("outbound context for endpoint {0} and source ssrc {1} already exists")]
    ErrOutboundExists(String, u32),

    #[error("endpoint {0} not found")]
    ErrEndpointNotFound(String),

    #[error("inbound ssrc {0} not found")]
    ErrInboundNotFound(u32),

    #[error("outbound ssrc {1} on endpoint {0} not found")]
    ErrOutboundNotFound(String, u32),

    #[error("invalid configuration: {0}")]
    ErrConfig(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// is_invariant_violation reports whether the error means a packet which
    /// should have been validated upstream reached the forwarding stage.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::ErrHeaderSizeInsufficient
                | Error::ErrHeaderSizeInsufficientForExtension
                | Error::ErrUnsupportedVersion(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ErrConfig(e.to_string())
    }
}
