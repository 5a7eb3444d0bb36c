//! H.265 (HEVC) RTP payload format (RFC 7798).
//!
//! Differences from H.264:
//!
//! - **2-byte NAL unit header**; the type sits in bits 6..1 of the first byte.
//! - **3-byte FU header**: a 2-byte payload header with type 49, then one
//!   byte of `[S|E|FuType]`.
//!
//! The payload header is written as the fixed pair `0x62 0x01` (type 49,
//! layer 0, TID 1).

use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::ParameterSets;

pub const NAL_TYPE_VPS: u8 = 32;
pub const NAL_TYPE_SPS: u8 = 33;
pub const NAL_TYPE_PPS: u8 = 34;
pub const NAL_TYPE_FU: u8 = 49;

const FU_PAYLOAD_HEADER: [u8; 2] = [NAL_TYPE_FU << 1, 0x01];

/// NAL unit type from the first header byte.
pub fn nal_type(first: u8) -> u8 {
    (first >> 1) & 0x3f
}

pub fn is_parameter_set(nal: &[u8]) -> bool {
    nal.first()
        .map(|&h| matches!(nal_type(h), NAL_TYPE_VPS | NAL_TYPE_SPS | NAL_TYPE_PPS))
        .unwrap_or(false)
}

pub fn fu_header(nal_first: u8, start: bool, end: bool) -> [u8; 3] {
    let mut fu = nal_type(nal_first);
    if start {
        fu |= 0x80;
    }
    if end {
        fu |= 0x40;
    }
    [FU_PAYLOAD_HEADER[0], FU_PAYLOAD_HEADER[1], fu]
}

/// `a=fmtp` line (RFC 7798 §7.1), only once all three sets are known.
pub fn fmtp(payload_type: u8, sets: &ParameterSets) -> Option<String> {
    let (vps, sps, pps) = (sets.vps.as_ref()?, sets.sps.as_ref()?, sets.pps.as_ref()?);
    Some(format!(
        "a=fmtp:{} sprop-vps={};sprop-sps={};sprop-pps={}",
        payload_type,
        BASE64_STANDARD.encode(vps),
        BASE64_STANDARD.encode(sps),
        BASE64_STANDARD.encode(pps)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fu_header_layout() {
        // IDR_W_RADL (type 19): first byte 0x26
        assert_eq!(fu_header(0x26, true, false), [0x62, 0x01, 0x93]);
        assert_eq!(fu_header(0x26, false, false), [0x62, 0x01, 0x13]);
        assert_eq!(fu_header(0x26, false, true), [0x62, 0x01, 0x53]);
    }

    #[test]
    fn nal_type_from_header() {
        assert_eq!(nal_type(0x40), NAL_TYPE_VPS);
        assert_eq!(nal_type(0x42), NAL_TYPE_SPS);
        assert_eq!(nal_type(0x44), NAL_TYPE_PPS);
    }

    #[test]
    fn fmtp_requires_all_sets() {
        let mut sets = ParameterSets {
            vps: Some(vec![0x40, 0x01]),
            sps: Some(vec![0x42, 0x01]),
            pps: None,
        };
        assert!(fmtp(96, &sets).is_none());
        sets.pps = Some(vec![0x44, 0x01]);
        assert_eq!(
            fmtp(96, &sets).unwrap(),
            "a=fmtp:96 sprop-vps=QAE=;sprop-sps=QgE=;sprop-pps=RAE="
        );
    }
}
