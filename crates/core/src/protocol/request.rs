use std::fmt;

use crate::error::{ParseErrorKind, Result};

/// RTSP methods this server dispatches on.
///
/// Anything else lands in [`Method::Other`] and gets the "option not
/// supported" response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Teardown,
    Other(String),
}

impl Method {
    pub fn parse(token: &str) -> Self {
        match token {
            "OPTIONS" => Method::Options,
            "DESCRIBE" => Method::Describe,
            "SETUP" => Method::Setup,
            "PLAY" => Method::Play,
            "TEARDOWN" => Method::Teardown,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Teardown => "TEARDOWN",
            Method::Other(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed RTSP request (RFC 2326 §6).
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2. Every request must
/// carry a numeric `CSeq`; [`parse`](Self::parse) rejects it otherwise.
#[derive(Debug)]
pub struct RtspRequest {
    pub method: Method,
    /// Request-URI (e.g. `rtsp://host:554/live/track0`).
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs, names as received.
    pub headers: Vec<(String, String)>,
    /// Value of the mandatory `CSeq` header.
    pub cseq: u32,
}

impl RtspRequest {
    /// Parse an RTSP request from its text representation.
    ///
    /// Expects the request line and headers; parsing stops at the first blank
    /// line. Fails with [`RtspError::MalformedRequest`](crate::RtspError::MalformedRequest)
    /// on a bad request line, a header without a colon or a missing `CSeq`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines
            .find(|line| !line.trim().is_empty())
            .ok_or(ParseErrorKind::EmptyRequest)?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let &[method, uri, version] = parts.as_slice() else {
            return Err(ParseErrorKind::InvalidRequestLine.into());
        };

        if version != "RTSP/1.0" {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or(ParseErrorKind::InvalidHeader)?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let cseq = headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("CSeq"))
            .and_then(|(_, value)| value.parse::<u32>().ok())
            .ok_or(ParseErrorKind::MissingCSeq)?;

        Ok(RtspRequest {
            method: Method::parse(method),
            uri: uri.to_string(),
            version: version.to_string(),
            headers,
            cseq,
        })
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
