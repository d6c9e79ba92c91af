
use crate::codec::vp8;
use crate::rtp_header::RtpHeader;
use crate::stream::{LastSent, Offsets, SsrcOutboundContext};

/// Continuity fields of one inbound packet, in the sender's numbering.
#[derive(Debug, Default, Copy, Clone)]
struct Fields {
    ssrc: u32,
    extended_sequence_number: u32,
    timestamp: u32,
    picture_id: u16,
    tl0_pic_idx: u8,
}

/// rewrite_vp8 rewrites SSRC, sequence number, timestamp, picture id and
/// TL0PICIDX of a VP8 packet so the outbound stream stays continuous. It
/// returns the rewritten extended sequence number, or None when the packet
/// must not be sent; in that case the packet is left untouched.
pub fn rewrite_vp8(
    ctx: &mut SsrcOutboundContext,
    packet: &mut [u8],
    extended_sequence_number: u32,
    transport_name: &str,
    is_key_frame: bool,
) -> Option<u32> {
    let mut header = parse(packet, transport_name)?;
    let payload = header.payload();
    let fields = Fields {
        ssrc: header.ssrc(),
        extended_sequence_number,
        timestamp: header.timestamp(),
        picture_id: vp8::picture_id(payload).unwrap_or(0),
        tl0_pic_idx: vp8::tl0_pic_idx(payload).unwrap_or(0),
    };

    let out = advance(ctx, &fields, transport_name, is_key_frame)?;
    write_header(&mut header, ctx.ssrc, &out);
    let payload = header.payload_mut();
    vp8::set_picture_id(payload, out.picture_id);
    vp8::set_tl0_pic_idx(payload, out.tl0_pic_idx);

    Some(out.sequence_number)
}

/// rewrite_h264 is the H264 flavour of rewrite_vp8. H264 carries no picture
/// id, so only the RTP header fields are rewritten.
pub fn rewrite_h264(
    ctx: &mut SsrcOutboundContext,
    packet: &mut [u8],
    extended_sequence_number: u32,
    transport_name: &str,
    is_key_frame: bool,
) -> Option<u32> {
    let mut header = parse(packet, transport_name)?;
    let fields = Fields {
        ssrc: header.ssrc(),
        extended_sequence_number,
        timestamp: header.timestamp(),
        ..Default::default()
    };

    let out = advance(ctx, &fields, transport_name, is_key_frame)?;
    write_header(&mut header, ctx.ssrc, &out);

    Some(out.sequence_number)
}

/// rewrite_audio rewrites the RTP header of an audio packet. Audio has no
/// key frames, so a source switch may happen on any packet.
pub fn rewrite_audio(
    ctx: &mut SsrcOutboundContext,
    packet: &mut [u8],
    extended_sequence_number: u32,
    transport_name: &str,
) -> Option<u32> {
    let mut header = parse(packet, transport_name)?;
    let fields = Fields {
        ssrc: header.ssrc(),
        extended_sequence_number,
        timestamp: header.timestamp(),
        ..Default::default()
    };

    let out = advance(ctx, &fields, transport_name, true)?;
    write_header(&mut header, ctx.ssrc, &out);

    Some(out.sequence_number)
}

fn parse<'a>(packet: &'a mut [u8], transport_name: &str) -> Option<RtpHeader<'a>> {
    match RtpHeader::parse(packet) {
        Ok(header) => Some(header),
        Err(err) => {
            log::error!("{} cannot rewrite malformed packet: {}", transport_name, err);
            None
        }
    }
}

fn write_header(header: &mut RtpHeader<'_>, ssrc: u32, out: &LastSent) {
    header.set_ssrc(ssrc);
    header.set_sequence_number(out.sequence_number as u16);
    header.set_timestamp(out.timestamp);
}

/// advance maps one packet onto the outbound numbering and updates the
/// continuity state. A change of contributing source re-bases the offsets
/// so the first packet of the new source follows the last packet sent.
fn advance(
    ctx: &mut SsrcOutboundContext,
    fields: &Fields,
    transport_name: &str,
    is_key_frame: bool,
) -> Option<LastSent> {
    let initialized = ctx.rewrite.is_initialized();
    let switching = !initialized || fields.ssrc != ctx.original_ssrc;

    if switching {
        if !is_key_frame {
            log::debug!(
                "{} cannot splice ssrc {} onto outbound ssrc {} without a key frame, seq {}",
                transport_name,
                fields.ssrc,
                ctx.ssrc,
                fields.extended_sequence_number
            );
            return None;
        }

        ctx.rewrite.offset = match ctx.rewrite.last_sent {
            Some(last) => Offsets {
                sequence_number: last
                    .sequence_number
                    .wrapping_add(1)
                    .wrapping_sub(fields.extended_sequence_number),
                timestamp: last
                    .timestamp
                    .wrapping_add(ctx.splice_timestamp_gap)
                    .wrapping_sub(fields.timestamp),
                picture_id: last
                    .picture_id
                    .wrapping_add(1)
                    .wrapping_sub(fields.picture_id)
                    & vp8::PICTURE_ID_MASK,
                tl0_pic_idx: last
                    .tl0_pic_idx
                    .wrapping_add(1)
                    .wrapping_sub(fields.tl0_pic_idx),
            },
            None => Offsets::default(),
        };

        if initialized {
            log::debug!(
                "{} outbound ssrc {} switched source {} -> {}, seq offset {}",
                transport_name,
                ctx.ssrc,
                ctx.original_ssrc,
                fields.ssrc,
                ctx.rewrite.offset.sequence_number as i32
            );
        }
        ctx.original_ssrc = fields.ssrc;
        ctx.rewrite.source_base = Some(fields.extended_sequence_number);
    } else if let Some(base) = ctx.rewrite.source_base {
        if (fields.extended_sequence_number.wrapping_sub(base) as i32) < 0 {
            log::debug!(
                "{} dropping ssrc {} seq {}, predates splice at {}",
                transport_name,
                fields.ssrc,
                fields.extended_sequence_number,
                base
            );
            return None;
        }
    }

    let offset = ctx.rewrite.offset;
    let out = LastSent {
        sequence_number: fields
            .extended_sequence_number
            .wrapping_add(offset.sequence_number),
        timestamp: fields.timestamp.wrapping_add(offset.timestamp),
        picture_id: fields.picture_id.wrapping_add(offset.picture_id) & vp8::PICTURE_ID_MASK,
        tl0_pic_idx: fields.tl0_pic_idx.wrapping_add(offset.tl0_pic_idx),
    };

    if !ctx.rewrite.record(out) {
        log::trace!(
            "{} dropping duplicate ssrc {} seq {}",
            transport_name,
            fields.ssrc,
            fields.extended_sequence_number
        );
        return None;
    }

    Some(out)
}
