//! Client registry: one entry per accepted RTSP connection.
//!
//! ## Client lifecycle
//!
//! ```text
//! TCP accept      -> registered (not ready, transport = none)
//! SETUP           -> transport + ports negotiated
//! PLAY            -> ready (receives RTP)
//! TEARDOWN        -> not ready
//! zero-byte read  -> closed, removed by the next sweep
//! ```
//!
//! The registry exclusively owns every client and its connection. All
//! access goes through a single mutex, so fan-out to the ready clients and
//! registry mutation (accept, request handling, sweep) never interleave.

pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::media::Codec;
use crate::transport::Connection;
pub use transport::{TransportHeader, TransportMethod};

pub type ClientId = u64;

/// One connected viewer.
pub struct Client {
    id: ClientId,
    conn: Option<Box<dyn Connection>>,
    peer: Option<SocketAddr>,
    codec: Codec,
    ready: bool,
    transport: TransportMethod,
    rtp_port: u16,
    rtcp_port: u16,
    session_id: Option<String>,
    inbox: Vec<u8>,
    /// Bytes the socket did not take yet, written before anything else.
    pending: Vec<u8>,
}

impl Client {
    pub(crate) fn new(id: ClientId, conn: Box<dyn Connection>, codec: Codec) -> Self {
        let peer = conn.peer_addr().ok();
        Self {
            id,
            conn: Some(conn),
            peer,
            codec,
            ready: false,
            transport: TransportMethod::None,
            rtp_port: 0,
            rtcp_port: 0,
            session_id: None,
            inbox: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Whether the client has received PLAY and gets RTP.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn transport(&self) -> TransportMethod {
        self.transport
    }

    /// Client RTP port (UDP) or interleaved RTP channel (TCP).
    pub fn rtp_port(&self) -> u16 {
        self.rtp_port
    }

    /// Client RTCP port (UDP) or interleaved RTCP channel (TCP).
    pub fn rtcp_port(&self) -> u16 {
        self.rtcp_port
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    pub fn connection(&self) -> Option<&dyn Connection> {
        self.conn.as_deref()
    }

    /// Address UDP RTP goes to: the peer's IP at the negotiated RTP port.
    pub fn rtp_addr(&self) -> Option<SocketAddr> {
        self.peer
            .map(|peer| SocketAddr::new(peer.ip(), self.rtp_port))
    }

    pub(crate) fn configure_transport(&mut self, header: &TransportHeader) {
        tracing::debug!(
            client_id = self.id,
            old = %self.transport,
            new = %header.method,
            rtp = header.rtp,
            rtcp = header.rtcp,
            "transport configured"
        );
        self.transport = header.method;
        self.rtp_port = header.rtp;
        self.rtcp_port = header.rtcp;
    }

    pub(crate) fn set_ready(&mut self, ready: bool) {
        if self.ready != ready {
            tracing::debug!(client_id = self.id, ready, "ready flag changed");
        }
        self.ready = ready;
    }

    pub(crate) fn set_session_id(&mut self, session_id: String) {
        self.session_id = Some(session_id);
    }

    pub(crate) fn inbox_mut(&mut self) -> &mut Vec<u8> {
        &mut self.inbox
    }

    /// Bytes still queued for the connection.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Write queued bytes the socket refused earlier.
    ///
    /// Returns whether the queue is now empty.
    pub(crate) fn flush_pending(&mut self) -> Result<bool> {
        if self.pending.is_empty() {
            return Ok(true);
        }
        let conn = self.conn.as_deref().ok_or(RtspError::ConnectionClosed)?;
        let written = conn.send_all(&self.pending)?;
        self.pending.drain(..written);
        if !self.pending.is_empty() {
            tracing::trace!(client_id = self.id, queued = self.pending.len(), "socket still full");
        }
        Ok(self.pending.is_empty())
    }

    /// Send one interleaved frame.
    ///
    /// A short write queues the tail so the frame completes on a later
    /// flush. While a tail is queued, new frames are skipped whole.
    pub(crate) fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        if !self.flush_pending()? {
            return Err(RtspError::SendFailure {
                written: 0,
                expected: frame.len(),
            });
        }
        self.write_or_queue(frame)
    }

    /// Send response text, queued behind any pending bytes.
    pub(crate) fn send_text(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.flush_pending()? {
            self.pending.extend_from_slice(bytes);
            return Ok(());
        }
        self.write_or_queue(bytes)
    }

    fn write_or_queue(&mut self, data: &[u8]) -> Result<()> {
        let conn = self.conn.as_deref().ok_or(RtspError::ConnectionClosed)?;
        let written = conn.send_all(data)?;
        if written < data.len() {
            self.pending.extend_from_slice(&data[written..]);
            return Err(RtspError::SendFailure {
                written,
                expected: data.len(),
            });
        }
        Ok(())
    }

    /// Drop the connection. The entry stays until the next sweep.
    pub(crate) fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.shutdown();
            self.ready = false;
            self.pending.clear();
            tracing::debug!(client_id = self.id, peer = ?self.peer, "connection closed");
        }
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            peer: self.peer,
            transport: self.transport,
            rtp_port: self.rtp_port,
            rtcp_port: self.rtcp_port,
            ready: self.ready,
            closed: self.is_closed(),
        }
    }
}

/// Snapshot of one client, safe to hold outside the registry lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub peer: Option<SocketAddr>,
    pub transport: TransportMethod,
    pub rtp_port: u16,
    pub rtcp_port: u16,
    pub ready: bool,
    pub closed: bool,
}

/// Thread-safe collection of connected clients.
///
/// Cloning is cheap and yields a handle to the same collection.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<Mutex<Vec<Client>>>,
    next_id: Arc<AtomicU64>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new not-ready client owning `conn`.
    pub fn register(&self, conn: Box<dyn Connection>, codec: Codec) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let client = Client::new(id, conn, codec);
        let mut clients = self.clients.lock();
        clients.push(client);
        tracing::debug!(client_id = id, total_clients = clients.len(), "client registered");
        id
    }

    /// Call `f` on every ready client with an open connection.
    ///
    /// Returns how many clients were visited.
    pub fn for_each_ready<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&mut Client),
    {
        let mut clients = self.clients.lock();
        let mut visited = 0;
        for client in clients.iter_mut().filter(|c| c.ready && !c.is_closed()) {
            f(client);
            visited += 1;
        }
        visited
    }

    /// Run `f` with exclusive access to the whole collection.
    pub(crate) fn with_clients<R>(&self, f: impl FnOnce(&mut [Client]) -> R) -> R {
        let mut clients = self.clients.lock();
        f(&mut clients)
    }

    /// Close the client's connection; it is removed on the next sweep.
    pub fn close(&self, id: ClientId) -> bool {
        let mut clients = self.clients.lock();
        match clients.iter_mut().find(|c| c.id == id) {
            Some(client) => {
                client.close();
                true
            }
            None => false,
        }
    }

    /// Close every connection (server shutdown).
    pub fn close_all(&self) {
        let mut clients = self.clients.lock();
        for client in clients.iter_mut() {
            client.close();
        }
    }

    /// Remove clients whose connection has been closed.
    pub fn sweep(&self) -> usize {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|c| !c.is_closed());
        let removed = before - clients.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = clients.len(), "swept closed clients");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.clients
            .lock()
            .iter()
            .filter(|c| c.ready && !c.is_closed())
            .count()
    }

    pub fn get(&self, id: ClientId) -> Option<ClientInfo> {
        self.clients
            .lock()
            .iter()
            .find(|c| c.id == id)
            .map(Client::info)
    }

    pub fn snapshot(&self) -> Vec<ClientInfo> {
        self.clients.lock().iter().map(Client::info).collect()
    }
}
