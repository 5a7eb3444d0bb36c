//! H.264 RTP payload format (RFC 6184).
//!
//! NAL units that fit in one packet are sent as-is (Single NAL Unit mode,
//! §5.6). Larger units use FU-A fragmentation (§5.8); each fragment carries
//! a 2-byte FU header before the NAL payload:
//!
//! ```text
//! FU indicator:  [F|NRI|Type=28]     (1 byte)
//! FU header:     [S|E|R|NAL_Type]    (1 byte)
//! Fragment data: [...]
//! ```
//!
//! The original 1-byte NAL header is not repeated; the receiver rebuilds it
//! from the FU indicator's NRI and the FU header's type.

use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::ParameterSets;

pub const NAL_TYPE_SPS: u8 = 7;
pub const NAL_TYPE_PPS: u8 = 8;
pub const NAL_TYPE_FU_A: u8 = 28;

/// NAL unit type from the 1-byte header.
pub fn nal_type(header: u8) -> u8 {
    header & 0x1f
}

pub fn is_parameter_set(nal: &[u8]) -> bool {
    nal.first()
        .map(|&h| matches!(nal_type(h), NAL_TYPE_SPS | NAL_TYPE_PPS))
        .unwrap_or(false)
}

/// FU indicator + FU header for one fragment of a NAL whose header byte is
/// `nal_header`.
pub fn fu_header(nal_header: u8, start: bool, end: bool) -> [u8; 2] {
    let indicator = (nal_header & 0x60) | NAL_TYPE_FU_A;
    let mut header = nal_type(nal_header);
    if start {
        header |= 0x80;
    }
    if end {
        header |= 0x40;
    }
    [indicator, header]
}

/// `a=fmtp` line (RFC 6184 §8.1).
///
/// `profile-level-id` comes from SPS bytes 1-3 (profile_idc,
/// constraint flags, level_idc).
pub fn fmtp(payload_type: u8, sets: &ParameterSets) -> String {
    let mut line = format!("a=fmtp:{} packetization-mode=1", payload_type);
    if let Some(sps) = sets.sps.as_deref().filter(|sps| sps.len() >= 4) {
        line.push_str(&format!(
            ";profile-level-id={:02x}{:02x}{:02x}",
            sps[1], sps[2], sps[3]
        ));
    }
    if let (Some(sps), Some(pps)) = (&sets.sps, &sets.pps) {
        line.push_str(&format!(
            ";sprop-parameter-sets={},{}",
            BASE64_STANDARD.encode(sps),
            BASE64_STANDARD.encode(pps)
        ));
    }
    line
}
