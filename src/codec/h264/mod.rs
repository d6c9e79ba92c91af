
use rtp::codecs::h264::{NALU_TYPE_BITMASK, SPS_NALU_TYPE};

/// The H264 payload is treated as having a one byte descriptor, the NAL unit
/// header of the first NAL unit in the packet.
pub const fn payload_descriptor_size() -> usize {
    1
}

/// is_key_frame classifies a packet as key frame bearing when its first NAL
/// unit header announces an SPS. Packets carrying the SPS inside a STAP-A or
/// a later NAL unit of the access unit are not detected.
pub fn is_key_frame(payload: &[u8], payload_descriptor_size: usize) -> bool {
    payload_descriptor_size != 0
        && !payload.is_empty()
        && payload[0] & NALU_TYPE_BITMASK == SPS_NALU_TYPE
}
