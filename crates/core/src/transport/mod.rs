//! Network transport layer for RTSP signaling and RTP media delivery.
//!
//! - **TCP** ([`tcp`]): the RTSP control connection. It also carries RTP for
//!   clients that negotiate `RTP/AVP/TCP` interleaving (RFC 2326 §10.12).
//! - **UDP** ([`udp`]): a shared socket that sends RTP to clients that
//!   negotiated `RTP/AVP` with a `client_port` pair.
//! - **Fan-out** ([`delivery`]): sends each packet to every ready client
//!   over whichever of the two it negotiated.
//!
//! The [`Connection`] trait is the seam between the core and its byte
//! sockets; the registry owns one boxed connection per client.

pub mod delivery;
pub mod tcp;
pub mod udp;

use std::io::{self, ErrorKind};
use std::net::SocketAddr;

pub use delivery::{DeliveryReport, deliver};
pub use tcp::{accept_loop, event_loop};
pub use udp::{DatagramSender, UdpTransport};

/// A client byte stream, polled without blocking.
///
/// `recv` returns `Err(WouldBlock)` when nothing is readable and `Ok(0)` at
/// end of stream. Bytes `send` does not take are the caller's to keep.
pub trait Connection: Send {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    fn send(&self, data: &[u8]) -> io::Result<usize>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Release the underlying socket. Called once when the client is closed.
    fn shutdown(&self) {}

    /// Write as much of `data` as the socket takes without blocking.
    ///
    /// Returns the number of bytes written; a short count means the socket
    /// buffer filled up. Errors are only returned when nothing was written.
    fn send_all(&self, data: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < data.len() {
            match self.send(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if written == 0 => return Err(e),
                Err(_) => break,
            }
        }
        Ok(written)
    }
}
