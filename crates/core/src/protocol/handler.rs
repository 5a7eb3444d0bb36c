use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, RtspError};
use crate::media::StreamDescription;
use crate::protocol::request::{Method, RtspRequest};
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp::{self, SdpOrigin};
use crate::server::ServerConfig;
use crate::session::transport::{TransportHeader, TransportMethod};
use crate::session::Client;

const PUBLIC_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN";

/// Runs RTSP requests against a client's state.
///
/// Shared by every connection; per-client state lives in the [`Client`]
/// entry passed to [`handle`](Self::handle).
pub struct ProtocolHandler {
    stream: Arc<StreamDescription>,
    config: Arc<ServerConfig>,
}

impl ProtocolHandler {
    pub fn new(stream: Arc<StreamDescription>, config: Arc<ServerConfig>) -> Self {
        ProtocolHandler { stream, config }
    }

    /// Parse `raw` and handle it.
    ///
    /// `Ok(None)` means the request was accepted but gets no response
    /// (TEARDOWN). Errors mean the request is dropped without a response.
    pub fn process(&self, client: &mut Client, raw: &str) -> Result<Option<RtspResponse>> {
        let request = RtspRequest::parse(raw)?;
        self.handle(client, &request)
    }

    pub fn handle(
        &self,
        client: &mut Client,
        request: &RtspRequest,
    ) -> Result<Option<RtspResponse>> {
        let cseq = request.cseq.to_string();
        tracing::debug!(
            client_id = client.id(),
            method = %request.method,
            uri = %request.uri,
            cseq = request.cseq,
            "request"
        );

        let response = match &request.method {
            Method::Options => self.handle_options(&cseq),
            Method::Describe => self.handle_describe(client, &cseq, &request.uri),
            Method::Setup => self.handle_setup(client, &cseq, request)?,
            Method::Play => self.handle_play(client, &cseq),
            Method::Teardown => {
                self.handle_teardown(client);
                return Ok(None);
            }
            Method::Other(name) => {
                tracing::warn!(client_id = client.id(), method = %name, cseq = request.cseq, "unsupported RTSP method");
                self.handle_unsupported(client, &cseq)
            }
        };

        tracing::debug!(
            client_id = client.id(),
            status = response.status_code,
            "response"
        );
        Ok(Some(response))
    }

    fn handle_options(&self, cseq: &str) -> RtspResponse {
        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Public", PUBLIC_METHODS)
    }

    /// Host for the SDP origin: configured public host, then the host part
    /// of an `rtsp://` URI, then the client IP.
    fn host_from_uri_or_client(&self, client: &Client, uri: &str) -> String {
        if let Some(host) = &self.config.public_host {
            return host.clone();
        }

        if let Some(after_scheme) = uri
            .strip_prefix("rtsp://")
            .or_else(|| uri.strip_prefix("rtsps://"))
        {
            let host = after_scheme
                .split('/')
                .next()
                .and_then(|host_port| host_port.split(':').next())
                .unwrap_or("")
                .trim();
            if !host.is_empty() {
                return host.to_string();
            }
        }

        client
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    fn handle_describe(&self, client: &Client, cseq: &str, uri: &str) -> RtspResponse {
        let host = self.host_from_uri_or_client(client, uri);
        let unix_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let body = sdp::generate_sdp(
            &self.stream,
            &SdpOrigin {
                username: &self.config.sdp_username,
                session_name: &self.config.sdp_session_name,
                host: &host,
                unix_time,
            },
        );

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Content-Base", uri)
            .add_header("Content-Type", "application/sdp")
            .with_body(body)
    }

    /// Negotiate the transport and hand out the session id.
    ///
    /// A missing `Transport` header, or a UDP one without `client_port=`,
    /// fails with [`RtspError::UnsupportedTransport`]; the request gets no
    /// response and the client keeps its previous transport.
    fn handle_setup(
        &self,
        client: &mut Client,
        cseq: &str,
        request: &RtspRequest,
    ) -> Result<RtspResponse> {
        let header = request
            .get_header("Transport")
            .ok_or_else(|| RtspError::UnsupportedTransport(String::new()))?;
        let transport = TransportHeader::parse(header)?;

        client.configure_transport(&transport);
        let session_id = match client.session_id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.new_session_id();
                client.set_session_id(id.clone());
                id
            }
        };

        tracing::info!(
            client_id = client.id(),
            transport = %transport.method,
            rtp = transport.rtp,
            rtcp = transport.rtcp,
            %session_id,
            "transport negotiated via SETUP"
        );

        let value = transport.response_value(
            self.config.rtp_server_port,
            self.config.rtcp_server_port,
        );
        Ok(RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Transport", &value)
            .add_header("Session", &session_id))
    }

    fn handle_play(&self, client: &mut Client, cseq: &str) -> RtspResponse {
        if client.transport() == TransportMethod::None {
            tracing::warn!(client_id = client.id(), "PLAY before SETUP");
            return RtspResponse::method_not_valid().add_header("CSeq", cseq);
        }

        client.set_ready(true);
        tracing::info!(client_id = client.id(), transport = %client.transport(), "client started playing");

        let session = format!(
            "{}; timeout={}",
            client.session_id().unwrap_or_default(),
            self.config.session_timeout_secs
        );
        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Range", "npt=0.000-")
            .add_header("Session", &session)
    }

    /// Clears the ready flag. Some clients crash on a response to TEARDOWN
    /// followed by a close, so none is sent.
    fn handle_teardown(&self, client: &mut Client) {
        client.set_ready(false);
        tracing::info!(client_id = client.id(), "client stopped playing via TEARDOWN");
    }

    fn handle_unsupported(&self, client: &Client, cseq: &str) -> RtspResponse {
        let response = RtspResponse::not_supported().add_header("CSeq", cseq);
        match client.session_id().or(self.config.session_id.as_deref()) {
            Some(id) => response.add_header("Session", id),
            None => response,
        }
    }

    /// Pinned id from the config, or a random 8-digit one.
    fn new_session_id(&self) -> String {
        match &self.config.session_id {
            Some(id) => id.clone(),
            None => (10_000_000 + rand::random::<u32>() % 90_000_000).to_string(),
        }
    }
}
