use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::error::Result;

/// Outbound datagram sink used by the delivery fan-out.
pub trait DatagramSender: Send + Sync {
    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> io::Result<usize>;
}

/// UDP transport for outbound RTP packet delivery.
///
/// One socket is bound per server port (RTP and RTCP) and shared by every
/// UDP client. This layer is address-only: the caller resolves the client
/// to a socket address before sending.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind a UDP socket on `addr` (e.g. `0.0.0.0:20001`, or port 0 for an
    /// ephemeral one).
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        tracing::debug!(local = %socket.local_addr()?, "UDP socket bound");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl DatagramSender for UdpTransport {
    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(payload, addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn sends_to_address() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let sender = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        let sent = sender
            .send_to(b"rtp", receiver.local_addr().unwrap())
            .unwrap();
        assert_eq!(sent, 3);

        let mut buf = [0u8; 16];
        let (n, from) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"rtp");
        assert_eq!(from, sender.local_addr().unwrap());
    }
}
