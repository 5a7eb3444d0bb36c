use std::sync::Arc;

use super::rtp::{INTERLEAVED_HEADER_LEN, InterleavedHeader, RTP_HEADER_LEN, RtpSequencer};
use super::{Codec, StreamDescription};

/// Largest NAL payload carried by one RTP packet.
///
/// Keeps IP packets under a common path MTU once RTP, UDP and IP headers
/// are added.
pub const RTP_MAX_SIZE: usize = 1360;

pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;
pub const DEFAULT_SSRC: u32 = 0x8892_3423;
pub const DEFAULT_CLOCK_RATE: u32 = 90000;
pub const DEFAULT_FRAME_RATE: u32 = 25;

/// Channel id written into every interleaved frame (video RTP).
pub const VIDEO_RTP_CHANNEL: u8 = 0;

// Interleaved length is 16 bits and covers the RTP header, FU header and payload.
const MAX_PAYLOAD_LIMIT: usize = u16::MAX as usize - RTP_HEADER_LEN - 3;

#[derive(Debug, Clone)]
pub struct PacketizerConfig {
    /// RTP payload type (dynamic range, 96 by convention).
    pub payload_type: u8,
    /// Synchronization source written into every packet.
    pub ssrc: u32,
    /// Largest payload per packet before fragmenting.
    pub max_payload: usize,
    /// Media clock in Hz.
    pub clock_rate: u32,
    /// Frames per second of the source; one frame advances the timestamp by
    /// `clock_rate / frame_rate`.
    pub frame_rate: u32,
}

impl PacketizerConfig {
    /// Replace the fixed SSRC with a random one (RFC 3550 §8.1).
    pub fn with_random_ssrc(mut self) -> Self {
        self.ssrc = rand::random::<u32>();
        self
    }

    pub fn frame_delta(&self) -> u32 {
        self.clock_rate / self.frame_rate.max(1)
    }
}

impl Default for PacketizerConfig {
    fn default() -> Self {
        Self {
            payload_type: DEFAULT_PAYLOAD_TYPE,
            ssrc: DEFAULT_SSRC,
            max_payload: RTP_MAX_SIZE,
            clock_rate: DEFAULT_CLOCK_RATE,
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }
}

/// Turns NAL units into RTP packets framed for RTSP interleaving.
///
/// Every emitted packet is laid out as:
///
/// ```text
/// [$][chan=0][len:u16] [12-byte RTP header] [payload]
/// ```
///
/// where the payload is either the whole NAL (single-packet mode) or an FU
/// header followed by a slice of the NAL (fragmented mode). The packet is
/// built in a send buffer owned by the packetizer and reused for the next
/// packet, so sinks must copy anything they want to keep.
///
/// Sequence numbers advance by one per packet. All packets of one NAL share
/// a timestamp, which then advances by one frame unless the NAL is a
/// parameter set.
#[derive(Debug)]
pub struct Packetizer {
    codec: Codec,
    max_payload: usize,
    frame_delta: u32,
    sequencer: RtpSequencer,
    buffer: Vec<u8>,
    description: Arc<StreamDescription>,
}

impl Packetizer {
    pub fn new(codec: Codec, config: PacketizerConfig) -> Self {
        let max_payload = config.max_payload.clamp(1, MAX_PAYLOAD_LIMIT);
        Self {
            codec,
            max_payload,
            frame_delta: config.frame_delta(),
            sequencer: RtpSequencer::new(config.payload_type, config.ssrc),
            buffer: Vec::with_capacity(
                INTERLEAVED_HEADER_LEN + RTP_HEADER_LEN + codec.fu_header_len() + max_payload + 2,
            ),
            description: Arc::new(StreamDescription::new(
                codec,
                config.payload_type,
                config.clock_rate,
            )),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Shared stream description (codec, payload type, captured parameter sets).
    pub fn description(&self) -> Arc<StreamDescription> {
        self.description.clone()
    }

    /// Sequence number of the next packet.
    pub fn next_sequence(&self) -> u16 {
        self.sequencer.sequence()
    }

    /// Timestamp of the next packet.
    pub fn next_rtp_timestamp(&self) -> u32 {
        self.sequencer.timestamp()
    }

    pub fn frame_delta(&self) -> u32 {
        self.frame_delta
    }

    /// Packetize one NAL unit, handing each framed packet to `sink`.
    ///
    /// Returns the number of packets emitted. Empty units produce nothing.
    pub fn packetize<F>(&mut self, nal: &[u8], mut sink: F) -> usize
    where
        F: FnMut(&[u8]),
    {
        if nal.is_empty() {
            return 0;
        }
        self.description.capture(nal);

        // A unit of `max_payload` bytes or more is always fragmented, even
        // when its body fits one FU.
        let fragmented =
            nal.len() >= self.max_payload && nal.len() > self.codec.nal_header_len();

        let packets = if fragmented {
            self.packetize_fragmented(nal, &mut sink)
        } else {
            self.packetize_single(nal, &mut sink)
        };

        let timestamp = self.sequencer.timestamp();
        if !self.codec.is_parameter_set(nal) {
            self.sequencer.advance_timestamp(self.frame_delta);
        }

        tracing::trace!(
            codec = %self.codec,
            nal_type = ?self.codec.nal_type(nal),
            nal_size = nal.len(),
            packets,
            ts = timestamp,
            next_seq = self.sequencer.sequence(),
            "NAL packetized"
        );

        packets
    }

    /// Single NAL Unit packet: the NAL is the payload.
    fn packetize_single(&mut self, nal: &[u8], sink: &mut dyn FnMut(&[u8])) -> usize {
        self.begin_packet(RTP_HEADER_LEN + nal.len());
        self.buffer.extend_from_slice(nal);
        sink(&self.buffer);
        1
    }

    /// FU fragmentation: the NAL header is consumed once and each fragment
    /// carries an FU header with Start on the first and End on the last.
    fn packetize_fragmented(&mut self, nal: &[u8], sink: &mut dyn FnMut(&[u8])) -> usize {
        let payload = &nal[self.codec.nal_header_len()..];
        let fu_len = self.codec.fu_header_len();
        let total = payload.len().div_ceil(self.max_payload);

        for (i, chunk) in payload.chunks(self.max_payload).enumerate() {
            self.begin_packet(RTP_HEADER_LEN + fu_len + chunk.len());
            self.codec
                .write_fu_header(nal, i == 0, i + 1 == total, &mut self.buffer);
            self.buffer.extend_from_slice(chunk);
            sink(&self.buffer);
        }
        total
    }

    /// Reset the send buffer and write the interleaved and RTP headers.
    fn begin_packet(&mut self, rtp_len: usize) {
        self.buffer.clear();
        let frame = InterleavedHeader {
            channel: VIDEO_RTP_CHANNEL,
            length: rtp_len as u16,
        };
        self.buffer.extend_from_slice(&frame.encode());
        let header = self.sequencer.next_header(false);
        self.buffer.extend_from_slice(&header.encode());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::RtpHeader;

    fn collect(p: &mut Packetizer, nal: &[u8]) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        p.packetize(nal, |pkt| packets.push(pkt.to_vec()));
        packets
    }

    fn rtp(packet: &[u8]) -> RtpHeader {
        RtpHeader::decode(&packet[INTERLEAVED_HEADER_LEN..]).unwrap()
    }

    fn payload(packet: &[u8]) -> &[u8] {
        &packet[INTERLEAVED_HEADER_LEN + RTP_HEADER_LEN..]
    }

    fn large_nal(first: &[u8], len: usize) -> Vec<u8> {
        let mut nal = first.to_vec();
        nal.extend((0..len - first.len()).map(|i| (i % 253) as u8));
        nal
    }

    #[test]
    fn small_nal_single_packet() {
        let mut p = Packetizer::new(Codec::H264, PacketizerConfig::default());
        let nal = [0x65, 0xaa, 0xbb, 0xcc];
        let packets = collect(&mut p, &nal);
        assert_eq!(packets.len(), 1);

        let pkt = &packets[0];
        assert_eq!(&pkt[..4], &[0x24, 0x00, 0x00, 16]);
        let header = rtp(pkt);
        assert!(!header.marker);
        assert_eq!(header.payload_type, 96);
        assert_eq!(header.sequence, 0);
        assert_eq!(header.timestamp, 0);
        assert_eq!(header.ssrc, DEFAULT_SSRC);
        assert_eq!(payload(pkt), &nal);
    }

    #[test]
    fn empty_nal_no_packets() {
        let mut p = Packetizer::new(Codec::H264, PacketizerConfig::default());
        assert!(collect(&mut p, &[]).is_empty());
        assert_eq!(p.next_sequence(), 0);
        assert_eq!(p.next_rtp_timestamp(), 0);
    }

    #[test]
    fn h264_fragments_reassemble() {
        let mut p = Packetizer::new(Codec::H264, PacketizerConfig::default());
        let nal = large_nal(&[0x65], 5000);
        let packets = collect(&mut p, &nal);
        assert_eq!(packets.len(), (5000 - 1usize).div_ceil(RTP_MAX_SIZE));

        let mut rebuilt = Vec::new();
        for (i, pkt) in packets.iter().enumerate() {
            let length = u16::from_be_bytes([pkt[2], pkt[3]]) as usize;
            assert_eq!(length, pkt.len() - INTERLEAVED_HEADER_LEN);

            let body = payload(pkt);
            let (indicator, fu) = (body[0], body[1]);
            assert_eq!(indicator & 0x1f, 28);
            assert_eq!(fu & 0x80 != 0, i == 0, "start bit on packet {i}");
            assert_eq!(fu & 0x40 != 0, i + 1 == packets.len(), "end bit on packet {i}");
            if i == 0 {
                rebuilt.push((indicator & 0xe0) | (fu & 0x1f));
            }
            rebuilt.extend_from_slice(&body[2..]);
        }
        assert_eq!(rebuilt, nal);
    }

    #[test]
    fn h265_fragments_reassemble() {
        let mut p = Packetizer::new(Codec::H265, PacketizerConfig::default());
        let nal = large_nal(&[0x26, 0x01], 4100);
        let packets = collect(&mut p, &nal);
        assert_eq!(packets.len(), (4100 - 2usize).div_ceil(RTP_MAX_SIZE));

        let mut rebuilt = Vec::new();
        for (i, pkt) in packets.iter().enumerate() {
            let body = payload(pkt);
            assert_eq!(&body[..2], &[0x62, 0x01]);
            let fu = body[2];
            assert_eq!(fu & 0x80 != 0, i == 0);
            assert_eq!(fu & 0x40 != 0, i + 1 == packets.len());
            if i == 0 {
                rebuilt.extend_from_slice(&[(fu & 0x3f) << 1, body[1]]);
            }
            rebuilt.extend_from_slice(&body[3..]);
        }
        assert_eq!(rebuilt, nal);
    }

    #[test]
    fn fragments_share_timestamp_and_count_sequence() {
        let mut p = Packetizer::new(Codec::H264, PacketizerConfig::default());
        let packets = collect(&mut p, &large_nal(&[0x65], 3000));
        assert_eq!(packets.len(), 3);
        for (i, pkt) in packets.iter().enumerate() {
            let header = rtp(pkt);
            assert_eq!(header.sequence, i as u16);
            assert_eq!(header.timestamp, 0);
            assert!(!header.marker);
        }
        assert_eq!(p.next_sequence(), 3);
        assert_eq!(p.next_rtp_timestamp(), 3600);
    }

    #[test]
    fn h264_single_packet_below_max_size() {
        let mut p = Packetizer::new(Codec::H264, PacketizerConfig::default());
        let nal = large_nal(&[0x41], RTP_MAX_SIZE - 1);
        let packets = collect(&mut p, &nal);
        assert_eq!(packets.len(), 1);
        assert_eq!(payload(&packets[0]), &nal[..]);
    }

    #[test]
    fn h264_fragments_from_max_size() {
        let mut p = Packetizer::new(Codec::H264, PacketizerConfig::default());

        // Body of 1359 bytes fits one FU, which then carries both S and E.
        let nal = large_nal(&[0x41], RTP_MAX_SIZE);
        let packets = collect(&mut p, &nal);
        assert_eq!(packets.len(), 1);
        let body = payload(&packets[0]);
        assert_eq!(body[0] & 0x1f, 28);
        assert_eq!(body[1] & 0xc0, 0xc0);
        assert_eq!(body[1] & 0x1f, 0x01);
        assert_eq!(&body[2..], &nal[1..]);

        let packets = collect(&mut p, &large_nal(&[0x41], RTP_MAX_SIZE + 2));
        assert_eq!(packets.len(), 2);
        assert_eq!(payload(&packets[1]).len(), 2 + 1);
        for pkt in &packets {
            assert!(payload(pkt).len() <= RTP_MAX_SIZE + 2);
        }
    }

    #[test]
    fn h265_single_packet_below_max_size() {
        let mut p = Packetizer::new(Codec::H265, PacketizerConfig::default());
        let nal = large_nal(&[0x02, 0x01], RTP_MAX_SIZE - 1);
        let packets = collect(&mut p, &nal);
        assert_eq!(packets.len(), 1);
        assert_eq!(payload(&packets[0]), &nal[..]);
    }

    #[test]
    fn h265_fragments_from_max_size() {
        let mut p = Packetizer::new(Codec::H265, PacketizerConfig::default());
        let nal = large_nal(&[0x02, 0x01], RTP_MAX_SIZE);
        let packets = collect(&mut p, &nal);
        assert_eq!(packets.len(), 1);
        let body = payload(&packets[0]);
        assert_eq!(&body[..2], &[0x62, 0x01]);
        assert_eq!(body[2], 0xc0 | 0x01);
        assert_eq!(&body[3..], &nal[2..]);
    }

    #[test]
    fn parameter_sets_do_not_advance_timestamp() {
        let mut p = Packetizer::new(Codec::H264, PacketizerConfig::default());
        collect(&mut p, &[0x67, 0x42, 0x00, 0x1e]);
        collect(&mut p, &[0x68, 0xce, 0x38, 0x80]);
        assert_eq!(p.next_rtp_timestamp(), 0);

        let idr = collect(&mut p, &[0x65, 0x88, 0x84]);
        assert_eq!(rtp(&idr[0]).timestamp, 0);
        let slice = collect(&mut p, &[0x41, 0x9a]);
        assert_eq!(rtp(&slice[0]).timestamp, 3600);
        assert_eq!(p.next_rtp_timestamp(), 7200);
    }

    #[test]
    fn h265_parameter_sets_do_not_advance_timestamp() {
        let mut p = Packetizer::new(Codec::H265, PacketizerConfig::default());
        collect(&mut p, &[0x40, 0x01, 0x0c]);
        collect(&mut p, &[0x42, 0x01, 0x01]);
        collect(&mut p, &[0x44, 0x01, 0xc1]);
        assert_eq!(p.next_rtp_timestamp(), 0);
        collect(&mut p, &[0x26, 0x01, 0xaf]);
        assert_eq!(p.next_rtp_timestamp(), 3600);
    }

    #[test]
    fn frame_rate_is_configurable() {
        let config = PacketizerConfig {
            frame_rate: 30,
            ..PacketizerConfig::default()
        };
        let mut p = Packetizer::new(Codec::H264, config);
        collect(&mut p, &[0x41, 0x9a]);
        assert_eq!(p.next_rtp_timestamp(), 3000);
    }

    #[test]
    fn sequence_has_no_gaps_across_wrap() {
        let mut p = Packetizer::new(Codec::H264, PacketizerConfig::default());
        let mut last: Option<u16> = None;
        let big = large_nal(&[0x65], 4000);
        for i in 0..66_000u32 {
            let nal: &[u8] = if i % 1000 == 0 { &big } else { &[0x41, 0x9a] };
            p.packetize(nal, |pkt| {
                let seq = u16::from_be_bytes([pkt[6], pkt[7]]);
                if let Some(prev) = last {
                    assert_eq!(seq, prev.wrapping_add(1));
                }
                last = Some(seq);
            });
        }
        assert!(last.is_some());
    }

    #[test]
    fn parameter_sets_reach_description() {
        let mut p = Packetizer::new(Codec::H264, PacketizerConfig::default());
        let desc = p.description();
        collect(&mut p, &[0x67, 0x42, 0x00, 0x1e]);
        collect(&mut p, &[0x68, 0xce, 0x38, 0x80]);
        let attrs = desc.sdp_attributes();
        assert!(attrs.iter().any(|a| a.contains("sprop-parameter-sets=")));
    }
}
