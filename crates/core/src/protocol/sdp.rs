//! SDP (Session Description Protocol) generation (RFC 4566).
//!
//! Produces the DESCRIBE body for the single video track:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=- 9<unix-time> 1 IN IP4 <addr>             ← origin
//! s=<session-name>                             ← session name
//! t=0 0                                        ← timing (live stream)
//! a=control:*                                  ← aggregate control
//! m=video 0 RTP/AVP 96                         ← media description
//! a=rtpmap:96 H264/90000                       ← codec/clock rate
//! a=fmtp:96 packetization-mode=1               ← codec parameters
//! a=control:track0                             ← track control URL
//! ```

use crate::media::StreamDescription;

/// Origin and session fields of the SDP body.
#[derive(Debug, Clone)]
pub struct SdpOrigin<'a> {
    pub username: &'a str,
    pub session_name: &'a str,
    pub host: &'a str,
    /// Seconds since the Unix epoch, used as the origin session id suffix.
    pub unix_time: u64,
}

pub fn generate_sdp(stream: &StreamDescription, origin: &SdpOrigin<'_>) -> String {
    let mut sdp: Vec<String> = vec![
        "v=0".to_string(),
        format!(
            "o={} 9{} 1 IN IP4 {}",
            origin.username, origin.unix_time, origin.host
        ),
        format!("s={}", origin.session_name),
        "t=0 0".to_string(),
        "a=control:*".to_string(),
        format!("m=video 0 RTP/AVP {}", stream.payload_type()),
    ];
    sdp.extend(stream.sdp_attributes());

    tracing::trace!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}
