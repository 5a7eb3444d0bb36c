//! Media codecs, Annex-B NAL extraction and RTP packetization.
//!
//! ## Data flow
//!
//! ```text
//! raw Annex-B bytes ─▶ NalExtractor ─▶ Packetizer ─▶ framed RTP packet
//! ```
//!
//! [`nal::NalExtractor`] owns the stream cache and yields complete NAL units.
//! [`Packetizer`] turns each unit into one or more RTP packets framed for
//! RTSP interleaving (`$` header + RTP header + payload). UDP delivery strips
//! the 4-byte interleaved header before sending.
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC | FU header |
//! |-------|--------|-----|-----------|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) | 2 bytes (FU-A) |
//! | H.265 | [`h265`] | [RFC 7798](https://tools.ietf.org/html/rfc7798) | 3 bytes |

pub mod h264;
pub mod h265;
pub mod nal;
pub mod packetizer;
pub mod rtp;

use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;

use crate::error::RtspError;

pub use nal::{Nal, NalExtractor, StartCode};
pub use packetizer::{Packetizer, PacketizerConfig};

/// Video codec carried by the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    H264,
    H265,
}

impl Codec {
    /// Encoding name for the SDP `a=rtpmap` attribute.
    pub fn name(self) -> &'static str {
        match self {
            Codec::H264 => "H264",
            Codec::H265 => "H265",
        }
    }

    /// Bytes of NAL unit header, consumed once when fragmenting.
    pub fn nal_header_len(self) -> usize {
        match self {
            Codec::H264 => 1,
            Codec::H265 => 2,
        }
    }

    /// Bytes of FU header prepended to every fragment.
    pub fn fu_header_len(self) -> usize {
        match self {
            Codec::H264 => 2,
            Codec::H265 => 3,
        }
    }

    /// NAL unit type decoded from the first header byte.
    pub fn nal_type(self, nal: &[u8]) -> Option<u8> {
        let first = *nal.first()?;
        Some(match self {
            Codec::H264 => h264::nal_type(first),
            Codec::H265 => h265::nal_type(first),
        })
    }

    /// Whether the unit is a parameter set (no presentation time of its own).
    pub fn is_parameter_set(self, nal: &[u8]) -> bool {
        match self {
            Codec::H264 => h264::is_parameter_set(nal),
            Codec::H265 => h265::is_parameter_set(nal),
        }
    }

    /// Write the FU header for one fragment of `nal` into `out`.
    pub fn write_fu_header(self, nal: &[u8], start: bool, end: bool, out: &mut Vec<u8>) {
        match self {
            Codec::H264 => out.extend_from_slice(&h264::fu_header(nal[0], start, end)),
            Codec::H265 => out.extend_from_slice(&h265::fu_header(nal[0], start, end)),
        }
    }

    /// Infer the codec from a file extension (`h264`, `264`, `h265`, `265`, `hevc`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "h264" | "264" | "avc" => Some(Codec::H264),
            "h265" | "265" | "hevc" => Some(Codec::H265),
            _ => None,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = RtspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| RtspError::UnknownCodec(s.to_string()))
    }
}

/// Parameter sets seen in the stream, used for SDP `a=fmtp`.
#[derive(Debug, Default, Clone)]
pub struct ParameterSets {
    pub vps: Option<Vec<u8>>,
    pub sps: Option<Vec<u8>>,
    pub pps: Option<Vec<u8>>,
}

/// What DESCRIBE needs to know about the stream.
///
/// Shared between the packetizer, which captures parameter sets as they
/// pass, and the protocol handler. Lives outside the pipeline lock: the
/// event loop reads it while holding the registry lock.
#[derive(Debug)]
pub struct StreamDescription {
    codec: Codec,
    payload_type: u8,
    clock_rate: u32,
    parameter_sets: RwLock<ParameterSets>,
}

impl StreamDescription {
    pub fn new(codec: Codec, payload_type: u8, clock_rate: u32) -> Self {
        Self {
            codec,
            payload_type,
            clock_rate,
            parameter_sets: RwLock::new(ParameterSets::default()),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    pub fn parameter_sets(&self) -> ParameterSets {
        self.parameter_sets.read().clone()
    }

    /// Remember `nal` if it is a parameter set not captured yet.
    ///
    /// Only the first occurrence of each set is kept.
    pub fn capture(&self, nal: &[u8]) {
        if !self.codec.is_parameter_set(nal) {
            return;
        }
        let Some(nal_type) = self.codec.nal_type(nal) else {
            return;
        };

        let mut sets = self.parameter_sets.write();
        let slot = match (self.codec, nal_type) {
            (Codec::H264, h264::NAL_TYPE_SPS) | (Codec::H265, h265::NAL_TYPE_SPS) => &mut sets.sps,
            (Codec::H264, h264::NAL_TYPE_PPS) | (Codec::H265, h265::NAL_TYPE_PPS) => &mut sets.pps,
            (Codec::H265, h265::NAL_TYPE_VPS) => &mut sets.vps,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(nal.to_vec());
            tracing::debug!(codec = %self.codec, nal_type, bytes = nal.len(), "parameter set captured");
        }
    }

    /// SDP media-level attributes for the single video track.
    ///
    /// `a=rtpmap` precedes `a=fmtp`, which references its payload type.
    pub fn sdp_attributes(&self) -> Vec<String> {
        let mut attrs = vec![format!(
            "a=rtpmap:{} {}/{}",
            self.payload_type,
            self.codec.name(),
            self.clock_rate
        )];
        let sets = self.parameter_sets.read();
        let fmtp = match self.codec {
            Codec::H264 => Some(h264::fmtp(self.payload_type, &sets)),
            Codec::H265 => h265::fmtp(self.payload_type, &sets),
        };
        attrs.extend(fmtp);
        attrs.push("a=control:track0".to_string());
        attrs
    }
}
