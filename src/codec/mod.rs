//! Minimal payload inspection needed to gate forwarding on key frames and
//! to keep VP8 continuity fields monotonic. Nothing here decodes media.

pub mod h264;
pub mod vp8;
