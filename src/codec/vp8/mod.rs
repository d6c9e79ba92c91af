
/// Largest value of a 15-bit picture id.
pub const PICTURE_ID_MASK: u16 = 0x7FFF;
const SHORT_PICTURE_ID_MASK: u16 = 0x7F;

const X_BIT: u8 = 0x80;
const S_BIT: u8 = 0x10;
const PID_MASK: u8 = 0x07;
const I_BIT: u8 = 0x80;
const L_BIT: u8 = 0x40;
const T_BIT: u8 = 0x20;
const K_BIT: u8 = 0x10;
const M_BIT: u8 = 0x80;

// https://tools.ietf.org/html/rfc7741#section-4.2
//
//       0 1 2 3 4 5 6 7
//      +-+-+-+-+-+-+-+-+
//      |X|R|N|S|R| PID | (REQUIRED)
//      +-+-+-+-+-+-+-+-+
// X:   |I|L|T|K| RSV   | (OPTIONAL)
//      +-+-+-+-+-+-+-+-+
// I:   |M| PictureID   | (OPTIONAL)
//      +-+-+-+-+-+-+-+-+
// L:   |   tl0picidx   | (OPTIONAL)
//      +-+-+-+-+-+-+-+-+
// T/K: |tid|Y| KEYIDX  | (OPTIONAL)
//      +-+-+-+-+-+-+-+-+
#[derive(Debug, Default, Copy, Clone)]
struct Layout {
    /// offset of the picture id and whether it uses the 15-bit form
    picture_id: Option<(usize, bool)>,
    tl0_pic_idx: Option<usize>,
    size: usize,
}

fn layout(payload: &[u8]) -> Option<Layout> {
    if payload.is_empty() {
        return None;
    }
    if payload[0] & X_BIT == 0 {
        return Some(Layout {
            size: 1,
            ..Default::default()
        });
    }
    if payload.len() < 2 {
        return None;
    }

    let x = payload[1];
    let mut l = Layout {
        size: 2,
        ..Default::default()
    };

    if x & I_BIT != 0 {
        if payload.len() <= l.size {
            return None;
        }
        let long = payload[l.size] & M_BIT != 0;
        l.picture_id = Some((l.size, long));
        l.size += if long { 2 } else { 1 };
    }
    if x & L_BIT != 0 {
        l.tl0_pic_idx = Some(l.size);
        l.size += 1;
    }
    if x & (T_BIT | K_BIT) != 0 {
        l.size += 1;
    }

    if l.size > payload.len() {
        None
    } else {
        Some(l)
    }
}

/// payload_descriptor_size returns the length of the VP8 payload descriptor,
/// or 0 when the descriptor is truncated.
pub fn payload_descriptor_size(payload: &[u8]) -> usize {
    layout(payload).map(|l| l.size).unwrap_or(0)
}

/// is_key_frame reports whether the packet starts a VP8 key frame: start of
/// partition 0, and the inverse key frame flag of the VP8 payload header
/// cleared.
pub fn is_key_frame(payload: &[u8], payload_descriptor_size: usize) -> bool {
    if payload_descriptor_size == 0 || payload.len() <= payload_descriptor_size {
        return false;
    }
    payload[0] & S_BIT != 0
        && payload[0] & PID_MASK == 0
        && payload[payload_descriptor_size] & 0x01 == 0
}

pub fn picture_id(payload: &[u8]) -> Option<u16> {
    let (offset, long) = layout(payload)?.picture_id?;
    if long {
        Some((((payload[offset] & 0x7F) as u16) << 8) | payload[offset + 1] as u16)
    } else {
        Some(payload[offset] as u16)
    }
}

/// set_picture_id writes the picture id using the width already present in
/// the descriptor, truncating to 7 bits for the short form. Returns false
/// when the descriptor carries no picture id.
pub fn set_picture_id(payload: &mut [u8], picture_id: u16) -> bool {
    let (offset, long) = match layout(payload).and_then(|l| l.picture_id) {
        Some(p) => p,
        None => return false,
    };
    if long {
        let picture_id = picture_id & PICTURE_ID_MASK;
        payload[offset] = M_BIT | (picture_id >> 8) as u8;
        payload[offset + 1] = picture_id as u8;
    } else {
        payload[offset] = (picture_id & SHORT_PICTURE_ID_MASK) as u8;
    }
    true
}

pub fn tl0_pic_idx(payload: &[u8]) -> Option<u8> {
    let offset = layout(payload)?.tl0_pic_idx?;
    Some(payload[offset])
}

pub fn set_tl0_pic_idx(payload: &mut [u8], tl0_pic_idx: u8) -> bool {
    match layout(payload).and_then(|l| l.tl0_pic_idx) {
        Some(offset) => {
            payload[offset] = tl0_pic_idx;
            true
        }
        None => false,
    }
}
