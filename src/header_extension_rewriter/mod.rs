
use crate::rtp_header::{Extension, RtpHeader};
use crate::stream::{SsrcInboundContext, SsrcOutboundContext};

const RESERVED_EXTENSION_ID: u8 = 0;

/// rewrite_video renumbers the absolute send time extension from the
/// sender's id to the receiver's id. Nothing is touched unless both sides
/// negotiated the extension under different ids.
pub fn rewrite_video(
    header: &mut RtpHeader<'_>,
    sender: &SsrcInboundContext,
    receiver: &SsrcOutboundContext,
) {
    let (sender_id, receiver_id) = match (
        sender.rtp_map.abs_send_time_ext_id,
        receiver.rtp_map.abs_send_time_ext_id,
    ) {
        (Some(s), Some(r)) if s != r => (s, r),
        _ => return,
    };

    let found = header
        .extensions()
        .find(|e| e.id != RESERVED_EXTENSION_ID && e.id == sender_id);
    if let Some(extension) = found {
        set_id(header, &extension, receiver_id);
    }
}

/// rewrite_audio renumbers every audio level and absolute send time
/// extension element from the sender's ids to the receiver's ids. Elements
/// of any other extension keep their id.
pub fn rewrite_audio(
    header: &mut RtpHeader<'_>,
    sender: &SsrcInboundContext,
    receiver: &SsrcOutboundContext,
) {
    if !header.has_extension() {
        return;
    }

    let sender_map = &sender.rtp_map;
    let receiver_map = &receiver.rtp_map;
    let mut cursor = header.extension_after(None);
    while let Some(extension) = cursor {
        let target = if extension.id == RESERVED_EXTENSION_ID {
            None
        } else if sender_map.audio_level_ext_id == Some(extension.id) {
            receiver_map.audio_level_ext_id
        } else if sender_map.abs_send_time_ext_id == Some(extension.id) {
            receiver_map.abs_send_time_ext_id
        } else {
            None
        };

        if let Some(id) = target {
            if id != extension.id {
                set_id(header, &extension, id);
            }
        }
        cursor = header.extension_after(Some(&extension));
    }
}

fn set_id(header: &mut RtpHeader<'_>, extension: &Extension, id: u8) {
    if let Err(err) = header.set_extension_id(extension, id) {
        log::warn!("failed to rewrite header extension {}: {}", extension.id, err);
    }
}
