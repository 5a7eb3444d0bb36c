use crate::error::RtspError;
use crate::media::rtp::INTERLEAVED_HEADER_LEN;
use crate::session::{Client, ClientRegistry, TransportMethod};

use super::DatagramSender;

/// Outcome of fanning one packet out to the ready clients.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Clients that got the whole packet.
    pub delivered: usize,
    /// Clients whose send failed or was short.
    pub failed: usize,
}

/// Send one framed packet to every ready client.
///
/// `packet` is the interleaved frame header followed by the RTP packet.
/// TCP clients get it as-is on their RTSP connection; UDP clients get the
/// RTP packet alone at their negotiated RTP port. A TCP frame the socket
/// only partly takes is finished before the next one, and frames arriving
/// meanwhile are skipped. Failures are logged and never close the client.
pub fn deliver(
    registry: &ClientRegistry,
    udp: &dyn DatagramSender,
    packet: &[u8],
) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    registry.for_each_ready(|client| match send_to_client(client, udp, packet) {
        Ok(()) => report.delivered += 1,
        Err(e) => {
            report.failed += 1;
            tracing::warn!(
                client_id = client.id(),
                transport = %client.transport(),
                queued = client.pending_len(),
                error = %e,
                "RTP delivery failed"
            );
        }
    });
    report
}

fn send_to_client(
    client: &mut Client,
    udp: &dyn DatagramSender,
    packet: &[u8],
) -> Result<(), RtspError> {
    match client.transport() {
        TransportMethod::Tcp => client.send_frame(packet),
        TransportMethod::Udp => {
            let addr = client.rtp_addr().ok_or(RtspError::ConnectionClosed)?;
            let rtp = packet.get(INTERLEAVED_HEADER_LEN..).unwrap_or_default();
            let written = udp.send_to(rtp, addr)?;
            if written < rtp.len() {
                return Err(RtspError::SendFailure {
                    written,
                    expected: rtp.len(),
                });
            }
            tracing::trace!(client_id = client.id(), %addr, bytes = written, "RTP sent over UDP");
            Ok(())
        }
        // Ready implies a negotiated transport.
        TransportMethod::None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Codec;
    use crate::session::TransportHeader;
    use crate::session::tests::{ChokeConn, MemConn};
    use std::sync::atomic::Ordering;
    use parking_lot::Mutex;
    use std::io;
    use std::net::SocketAddr;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    }

    impl DatagramSender for RecordingSender {
        fn send_to(&self, payload: &[u8], addr: SocketAddr) -> io::Result<usize> {
            self.sent.lock().push((addr, payload.to_vec()));
            Ok(payload.len())
        }
    }

    fn ready(registry: &ClientRegistry, conn: impl crate::transport::Connection + 'static, header: TransportHeader) {
        let id = registry.register(Box::new(conn), Codec::H264);
        registry.with_clients(|clients| {
            let client = clients.iter_mut().find(|c| c.id() == id).unwrap();
            client.configure_transport(&header);
            client.set_ready(true);
        });
    }

    #[test]
    fn tcp_gets_frame_udp_gets_rtp() {
        let registry = ClientRegistry::new();
        let tcp_conn = MemConn::default();
        ready(
            &registry,
            tcp_conn.clone(),
            TransportHeader { method: TransportMethod::Tcp, rtp: 0, rtcp: 1 },
        );
        ready(
            &registry,
            MemConn::default(),
            TransportHeader { method: TransportMethod::Udp, rtp: 5000, rtcp: 5001 },
        );

        let udp = RecordingSender::default();
        let packet = [0x24, 0x00, 0x00, 0x03, 0x80, 0x60, 0x00];
        let report = deliver(&registry, &udp, &packet);

        assert_eq!(report, DeliveryReport { delivered: 2, failed: 0 });
        assert_eq!(tcp_conn.take_output(), packet);
        let sent = udp.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "192.0.2.10:5000".parse().unwrap());
        assert_eq!(sent[0].1, &packet[4..]);
    }

    #[test]
    fn not_ready_clients_get_nothing() {
        let registry = ClientRegistry::new();
        let conn = MemConn::default();
        registry.register(Box::new(conn.clone()), Codec::H264);

        let udp = RecordingSender::default();
        let report = deliver(&registry, &udp, &[0x24, 0, 0, 0]);
        assert_eq!(report.delivered, 0);
        assert!(conn.take_output().is_empty());
    }

    #[test]
    fn short_write_finishes_frame_before_the_next() {
        let registry = ClientRegistry::new();
        let conn = ChokeConn::with_budget(6);
        ready(
            &registry,
            conn.clone(),
            TransportHeader { method: TransportMethod::Tcp, rtp: 0, rtcp: 1 },
        );
        let udp = RecordingSender::default();
        let frame = [0x24, 0x00, 0x00, 0x04, 0x80, 0x60, 0x12, 0x34];

        let report = deliver(&registry, &udp, &frame);
        assert_eq!(report, DeliveryReport { delivered: 0, failed: 1 });
        assert_eq!(conn.output.lock().len(), 6);

        // Socket still full: the frame is skipped, nothing is interleaved.
        let report = deliver(&registry, &udp, &frame);
        assert_eq!(report.failed, 1);
        assert_eq!(conn.output.lock().len(), 6);

        conn.budget.store(1024, Ordering::SeqCst);
        let report = deliver(&registry, &udp, &frame);
        assert_eq!(report, DeliveryReport { delivered: 1, failed: 0 });

        let wire = conn.output.lock().clone();
        assert_eq!(wire.len(), 16);
        assert_eq!(&wire[..8], &frame);
        assert_eq!(&wire[8..], &frame);
    }
}
