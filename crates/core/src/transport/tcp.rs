use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use super::Connection;
use crate::error::RtspError;
use crate::media::Codec;
use crate::media::rtp::{INTERLEAVED_HEADER_LEN, INTERLEAVED_MAGIC, InterleavedHeader};
use crate::protocol::{ProtocolHandler, RtspResponse};
use crate::session::{Client, ClientRegistry};

const READ_BUFFER_SIZE: usize = 4096;

/// Largest unterminated request kept in a client's inbox.
const MAX_INBOX: usize = 64 * 1024;

impl Connection for TcpStream {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream: &TcpStream = self;
        stream.read(buf)
    }

    fn send(&self, data: &[u8]) -> io::Result<usize> {
        let mut stream: &TcpStream = self;
        stream.write(data)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn shutdown(&self) {
        let _ = TcpStream::shutdown(self, Shutdown::Both);
    }
}

/// Non-blocking TCP accept loop.
///
/// Every accepted stream is switched to non-blocking mode and registered as
/// a new, not-ready client. Checks the `running` flag between accepts with a
/// `poll_interval` sleep so that [`crate::Server::stop`] can terminate it
/// promptly.
pub fn accept_loop(
    listener: TcpListener,
    registry: ClientRegistry,
    codec: Codec,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    tracing::warn!(%peer, error = %e, "failed to make client socket non-blocking");
                    continue;
                }
                let _ = stream.set_nodelay(true);
                let id = registry.register(Box::new(stream), codec);
                tracing::info!(client_id = id, %peer, "client connected");
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(poll_interval);
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// Serve RTSP requests for every registered client.
///
/// Each pass reads whatever is available on each open connection, answers
/// every complete request and then sweeps closed clients. A pass that reads
/// nothing sleeps for `poll_interval`, so the loop notices `running` going
/// false within one interval.
pub fn event_loop(
    registry: ClientRegistry,
    handler: ProtocolHandler,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    while running.load(Ordering::SeqCst) {
        let active = registry.with_clients(|clients| {
            let mut active = false;
            for client in clients.iter_mut() {
                active |= service_client(client, &handler, &mut buf);
            }
            active
        });
        registry.sweep();
        if !active {
            thread::sleep(poll_interval);
        }
    }
    tracing::debug!("event loop exited");
}

/// Read from one client and handle its complete requests.
///
/// Returns whether any bytes were read.
pub(crate) fn service_client(client: &mut Client, handler: &ProtocolHandler, buf: &mut [u8]) -> bool {
    if let Err(e) = client.flush_pending() {
        tracing::debug!(client_id = client.id(), error = %e, "flush of queued bytes failed");
    }
    let Some(conn) = client.connection() else {
        return false;
    };
    let n = match conn.recv(buf) {
        Ok(0) => {
            tracing::info!(client_id = client.id(), peer = ?client.peer_addr(), "client disconnected");
            client.close();
            return false;
        }
        Ok(n) => n,
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            return false;
        }
        Err(e) => {
            tracing::warn!(client_id = client.id(), error = %e, "read error, closing client");
            client.close();
            return false;
        }
    };

    let inbox = client.inbox_mut();
    inbox.extend_from_slice(&buf[..n]);
    if inbox.len() > MAX_INBOX {
        tracing::warn!(client_id = client.id(), bytes = n, "oversized request, discarding");
        client.inbox_mut().clear();
        return true;
    }

    while let Some(raw) = take_request(client.inbox_mut()) {
        let text = String::from_utf8_lossy(&raw);
        match handler.process(client, &text) {
            Ok(Some(response)) => send_response(client, &response),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(client_id = client.id(), error = %e, "request dropped");
            }
        }
    }
    true
}

/// Cut the next complete request off the front of `inbox`.
///
/// Interleaved frames the client sends on the control connection (RTCP
/// receiver reports) are skipped.
fn take_request(inbox: &mut Vec<u8>) -> Option<Vec<u8>> {
    while inbox.first() == Some(&INTERLEAVED_MAGIC) {
        let header = InterleavedHeader::decode(inbox)?;
        let frame_len = INTERLEAVED_HEADER_LEN + header.length as usize;
        if inbox.len() < frame_len {
            return None;
        }
        tracing::trace!(channel = header.channel, bytes = frame_len, "skipping interleaved frame from client");
        inbox.drain(..frame_len);
    }

    let end = inbox.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
    Some(inbox.drain(..end).collect())
}

fn send_response(client: &mut Client, response: &RtspResponse) {
    let bytes = response.serialize();
    match client.send_text(bytes.as_bytes()) {
        Ok(()) => {}
        Err(e @ RtspError::SendFailure { .. }) => {
            tracing::debug!(client_id = client.id(), error = %e, "response partly queued");
        }
        Err(e) => {
            tracing::warn!(client_id = client.id(), error = %e, "failed to send response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::StreamDescription;
    use crate::server::ServerConfig;
    use crate::session::TransportMethod;
    use crate::session::tests::{ChokeConn, MemConn};

    fn handler() -> ProtocolHandler {
        ProtocolHandler::new(
            Arc::new(StreamDescription::new(Codec::H264, 96, 90000)),
            Arc::new(ServerConfig::default()),
        )
    }

    fn service(registry: &ClientRegistry, handler: &ProtocolHandler) -> bool {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        registry.with_clients(|clients| {
            clients
                .iter_mut()
                .fold(false, |active, c| service_client(c, handler, &mut buf) | active)
        })
    }

    #[test]
    fn answers_pipelined_requests_in_order() {
        let registry = ClientRegistry::new();
        let conn = MemConn::default();
        registry.register(Box::new(conn.clone()), Codec::H264);
        let handler = handler();

        conn.push_input(
            b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n\
              SETUP rtsp://h/track0 RTSP/1.0\r\nCSeq: 2\r\n\
              Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
        );
        assert!(service(&registry, &handler));

        let out = String::from_utf8(conn.take_output()).unwrap();
        let options = out.find("CSeq: 1\r\n").unwrap();
        let setup = out.find("CSeq: 2\r\n").unwrap();
        assert!(options < setup);
        assert_eq!(registry.snapshot()[0].transport, TransportMethod::Tcp);
    }

    #[test]
    fn partial_request_waits_for_more_bytes() {
        let registry = ClientRegistry::new();
        let conn = MemConn::default();
        registry.register(Box::new(conn.clone()), Codec::H264);
        let handler = handler();

        conn.push_input(b"OPTIONS * RTSP/1.0\r\nCSe");
        service(&registry, &handler);
        assert!(conn.take_output().is_empty());

        conn.push_input(b"q: 5\r\n\r\n");
        service(&registry, &handler);
        let out = String::from_utf8(conn.take_output()).unwrap();
        assert!(out.contains("CSeq: 5\r\n"));
    }

    #[test]
    fn missing_cseq_gets_no_response() {
        let registry = ClientRegistry::new();
        let conn = MemConn::default();
        registry.register(Box::new(conn.clone()), Codec::H264);

        conn.push_input(b"OPTIONS * RTSP/1.0\r\n\r\n");
        service(&registry, &handler());
        assert!(conn.take_output().is_empty());
    }

    #[test]
    fn end_of_stream_closes_and_sweep_removes() {
        let registry = ClientRegistry::new();
        let conn = MemConn::default();
        registry.register(Box::new(conn.clone()), Codec::H264);
        conn.eof.store(true, Ordering::SeqCst);

        service(&registry, &handler());
        assert!(registry.snapshot()[0].closed);
        assert_eq!(registry.sweep(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn skips_interleaved_frames_from_client() {
        let mut inbox = vec![0x24, 0x01, 0x00, 0x02, 0xaa, 0xbb];
        inbox.extend_from_slice(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n");
        let request = take_request(&mut inbox).unwrap();
        assert!(request.starts_with(b"OPTIONS"));
        assert!(inbox.is_empty());

        let mut partial = vec![0x24, 0x01, 0x00, 0x08, 0xaa];
        assert!(take_request(&mut partial).is_none());
        assert_eq!(partial.len(), 5);
    }

    #[test]
    fn queued_tail_drains_on_next_pass() {
        let registry = ClientRegistry::new();
        let conn = ChokeConn::with_budget(3);
        registry.register(Box::new(conn.clone()), Codec::H264);
        let frame = [0x24, 0x00, 0x00, 0x02, 0xaa, 0xbb];
        registry.with_clients(|clients| assert!(clients[0].send_frame(&frame).is_err()));

        conn.budget.store(64, Ordering::SeqCst);
        assert!(!service(&registry, &handler()));
        assert_eq!(&conn.output.lock()[..], &frame);
    }
}
