use std::fmt;

use crate::error::{Result, RtspError};

/// How a client receives RTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMethod {
    /// SETUP not completed yet.
    #[default]
    None,
    /// RTP interleaved on the RTSP TCP connection.
    Tcp,
    /// RTP over UDP to the client's `client_port`.
    Udp,
}

impl fmt::Display for TransportMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// Client-side transport requested in a SETUP `Transport` header
/// (RFC 2326 §12.39).
///
/// `rtp`/`rtcp` are interleaved channel ids for TCP and client ports for
/// UDP.
///
/// ## Wire format examples
///
/// ```text
/// Transport: RTP/AVP/TCP;unicast;interleaved=0-1
/// Transport: RTP/AVP;unicast;client_port=8000-8001
/// Transport: RTP/AVP/UDP;unicast;client_port=8000-8001
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    pub method: TransportMethod,
    pub rtp: u16,
    pub rtcp: u16,
}

impl TransportHeader {
    /// Parse the `Transport` header value.
    ///
    /// `RTP/AVP/TCP` selects interleaving; a missing `interleaved=` defaults
    /// to channels 0-1. Any other `RTP/AVP` profile selects UDP and requires
    /// `client_port=`: a UDP request without it is rejected with
    /// [`RtspError::UnsupportedTransport`] rather than set up with ports 0.
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtsp::session::transport::{TransportHeader, TransportMethod};
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001").unwrap();
    /// assert_eq!(th.method, TransportMethod::Udp);
    /// assert_eq!((th.rtp, th.rtcp), (8000, 8001));
    ///
    /// assert!(TransportHeader::parse("RAW/RAW/UDP;unicast").is_err());
    /// ```
    pub fn parse(header: &str) -> Result<Self> {
        if header.contains("RTP/AVP/TCP") {
            let (rtp, rtcp) = param_pair(header, "interleaved=").unwrap_or((0, 1));
            return Ok(Self {
                method: TransportMethod::Tcp,
                rtp,
                rtcp,
            });
        }

        if header.contains("RTP/AVP") {
            let (rtp, rtcp) = param_pair(header, "client_port=")
                .ok_or_else(|| RtspError::UnsupportedTransport(header.to_string()))?;
            return Ok(Self {
                method: TransportMethod::Udp,
                rtp,
                rtcp,
            });
        }

        Err(RtspError::UnsupportedTransport(header.to_string()))
    }

    /// `Transport` value echoed in the SETUP response.
    pub fn response_value(&self, server_rtp_port: u16, server_rtcp_port: u16) -> String {
        match self.method {
            TransportMethod::Tcp => format!(
                "RTP/AVP/TCP;unicast;interleaved={}-{}",
                self.rtp, self.rtcp
            ),
            _ => format!(
                "RTP/AVP;unicast;client_port={}-{};server_port={}-{}",
                self.rtp, self.rtcp, server_rtp_port, server_rtcp_port
            ),
        }
    }
}

/// Find `key` among the `;`-separated parameters and parse `a-b` (or a
/// single `a`, meaning `a-(a+1)`).
fn param_pair(header: &str, key: &str) -> Option<(u16, u16)> {
    let value = header
        .split(';')
        .find_map(|part| part.trim().strip_prefix(key))?;
    match value.split_once('-') {
        Some((a, b)) => Some((a.trim().parse().ok()?, b.trim().parse().ok()?)),
        None => {
            let a: u16 = value.trim().parse().ok()?;
            Some((a, a.checked_add(1)?))
        }
    }
}
