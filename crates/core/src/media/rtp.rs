/// RTP fixed header length in bytes (RFC 3550 §5.1, no CSRCs).
pub const RTP_HEADER_LEN: usize = 12;

/// RTSP interleaved frame header length in bytes (RFC 2326 §10.12).
pub const INTERLEAVED_HEADER_LEN: usize = 4;

/// RTP protocol version written into every header.
pub const RTP_VERSION: u8 = 2;

/// Leading byte of an interleaved frame (`$`).
pub const INTERLEAVED_MAGIC: u8 = 0x24;

/// RTP fixed header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Byte 0 holds version (bits 7-6), padding (bit 5), extension (bit 4) and
/// CSRC count (bits 3-0); we always write version 2 and zeros elsewhere.
/// Byte 1 holds the marker (bit 7) and payload type (bits 6-0). All
/// multi-byte fields are big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    pub fn encode(&self) -> [u8; RTP_HEADER_LEN] {
        let mut header = [0u8; RTP_HEADER_LEN];
        header[0] = RTP_VERSION << 6;
        header[1] = ((self.marker as u8) << 7) | (self.payload_type & 0x7f);
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        header
    }

    /// Decode the first 12 bytes of `buf`.
    ///
    /// Returns `None` if the buffer is too short or the version is not 2.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let b = buf.get(..RTP_HEADER_LEN)?;
        if b[0] >> 6 != RTP_VERSION {
            return None;
        }
        Some(Self {
            marker: b[1] & 0x80 != 0,
            payload_type: b[1] & 0x7f,
            sequence: u16::from_be_bytes([b[2], b[3]]),
            timestamp: u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
            ssrc: u32::from_be_bytes([b[8], b[9], b[10], b[11]]),
        })
    }
}

/// RTSP interleaved frame header: `$`, channel id, big-endian length of the
/// RTP packet that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterleavedHeader {
    pub channel: u8,
    pub length: u16,
}

impl InterleavedHeader {
    pub fn encode(&self) -> [u8; INTERLEAVED_HEADER_LEN] {
        let len = self.length.to_be_bytes();
        [INTERLEAVED_MAGIC, self.channel, len[0], len[1]]
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        let b = buf.get(..INTERLEAVED_HEADER_LEN)?;
        if b[0] != INTERLEAVED_MAGIC {
            return None;
        }
        Some(Self {
            channel: b[1],
            length: u16::from_be_bytes([b[2], b[3]]),
        })
    }
}

/// Per-stream RTP sequencing state.
///
/// - **Sequence number**: 16-bit, wrapping, incremented once per packet.
/// - **Timestamp**: 32-bit, wrapping, advanced by the caller per frame.
/// - **SSRC**: fixed for the lifetime of the stream.
#[derive(Debug)]
pub struct RtpSequencer {
    payload_type: u8,
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

impl RtpSequencer {
    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        tracing::debug!(
            payload_type,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP sequencer created"
        );
        Self {
            payload_type,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Sequence number the next packet will carry.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp the next packet will carry.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Build the header for the next packet and advance the sequence number.
    pub fn next_header(&mut self, marker: bool) -> RtpHeader {
        let header = RtpHeader {
            marker,
            payload_type: self.payload_type,
            sequence: self.sequence,
            timestamp: self.timestamp,
            ssrc: self.ssrc,
        };
        self.sequence = self.sequence.wrapping_add(1);
        header
    }

    pub fn advance_timestamp(&mut self, increment: u32) {
        self.timestamp = self.timestamp.wrapping_add(increment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sequencer() -> RtpSequencer {
        RtpSequencer::new(96, 0xAABBCCDD)
    }

    #[test]
    fn version_is_2() {
        let buf = make_sequencer().next_header(false).encode();
        assert_eq!(buf[0], 0x80);
    }

    #[test]
    fn marker_bit() {
        let mut s = make_sequencer();
        assert_eq!(s.next_header(false).encode()[1] & 0x80, 0);
        assert_eq!(s.next_header(true).encode()[1] & 0x80, 0x80);
    }

    #[test]
    fn payload_type() {
        let buf = make_sequencer().next_header(true).encode();
        assert_eq!(buf[1] & 0x7f, 96);
    }

    #[test]
    fn fields_are_big_endian() {
        let header = RtpHeader {
            marker: false,
            payload_type: 96,
            sequence: 0x0102,
            timestamp: 0x03040506,
            ssrc: 0x88923423,
        };
        assert_eq!(
            header.encode(),
            [0x80, 96, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x88, 0x92, 0x34, 0x23]
        );
    }

    #[test]
    fn decode_inverts_encode() {
        let header = RtpHeader {
            marker: true,
            payload_type: 96,
            sequence: 65535,
            timestamp: 3600,
            ssrc: 0x88923423,
        };
        assert_eq!(RtpHeader::decode(&header.encode()), Some(header));
    }

    #[test]
    fn decode_rejects_short_or_wrong_version() {
        assert!(RtpHeader::decode(&[0x80, 96, 0, 0]).is_none());
        let mut buf = make_sequencer().next_header(false).encode();
        buf[0] = 0x40;
        assert!(RtpHeader::decode(&buf).is_none());
    }

    #[test]
    fn sequence_wraps() {
        let mut s = make_sequencer();
        s.sequence = u16::MAX;
        assert_eq!(s.next_header(false).sequence, u16::MAX);
        assert_eq!(s.sequence(), 0);
    }

    #[test]
    fn timestamp_advance_wraps() {
        let mut s = make_sequencer();
        s.advance_timestamp(3600);
        assert_eq!(s.timestamp(), 3600);
        s.advance_timestamp(u32::MAX);
        assert_eq!(s.timestamp(), 3599);
    }

    #[test]
    fn interleaved_header() {
        let h = InterleavedHeader {
            channel: 0,
            length: 0x0510,
        };
        assert_eq!(h.encode(), [0x24, 0x00, 0x05, 0x10]);
        assert_eq!(InterleavedHeader::decode(&h.encode()), Some(h));
        assert!(InterleavedHeader::decode(&[0x25, 0, 0, 1]).is_none());
    }
}
