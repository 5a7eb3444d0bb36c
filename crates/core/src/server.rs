use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::media::nal::DEFAULT_CACHE_CAPACITY;
use crate::media::{Codec, NalExtractor, Packetizer, PacketizerConfig, StreamDescription};
use crate::protocol::ProtocolHandler;
use crate::session::{ClientInfo, ClientRegistry};
use crate::transport::{self, UdpTransport};

pub const DEFAULT_RTSP_PORT: u16 = 554;
pub const DEFAULT_RTP_SERVER_PORT: u16 = 20001;
pub const DEFAULT_RTCP_SERVER_PORT: u16 = 20002;

/// Server-level configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// RTSP listen address. Port 0 picks an ephemeral port.
    pub bind_addr: SocketAddr,
    pub codec: Codec,
    /// Public host advertised in the SDP `o=` line.
    /// When `None`, host is inferred from request URI/client address.
    pub public_host: Option<String>,
    /// SDP origin username field (`o=<username> ...`).
    pub sdp_username: String,
    /// SDP session name (`s=`).
    pub sdp_session_name: String,
    /// Session id handed out at SETUP. `None` mints a random one per client.
    pub session_id: Option<String>,
    /// Timeout advertised in the PLAY `Session` header.
    pub session_timeout_secs: u32,
    /// UDP source port for RTP, echoed as `server_port` in SETUP.
    pub rtp_server_port: u16,
    pub rtcp_server_port: u16,
    /// Sleep between accept and event loop passes that find nothing to do.
    pub poll_interval: Duration,
    /// Bytes the stream cache holds before input is dropped.
    pub cache_capacity: usize,
    pub packetizer: PacketizerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_RTSP_PORT)),
            codec: Codec::default(),
            public_host: None,
            sdp_username: "-".to_string(),
            sdp_session_name: "Stream".to_string(),
            session_id: None,
            session_timeout_secs: 60,
            rtp_server_port: DEFAULT_RTP_SERVER_PORT,
            rtcp_server_port: DEFAULT_RTCP_SERVER_PORT,
            poll_interval: Duration::from_millis(50),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            packetizer: PacketizerConfig::default(),
        }
    }
}

/// Producer-side state: the stream cache and the packetizer.
struct Pipeline {
    extractor: NalExtractor,
    packetizer: Packetizer,
}

/// Sockets and threads that exist only while the server runs.
struct Running {
    local_addr: SocketAddr,
    rtp: UdpTransport,
    // Bound so the advertised RTCP port is ours; nothing is read from it.
    _rtcp: UdpTransport,
    threads: Vec<JoinHandle<()>>,
}

/// High-level RTSP server orchestrator.
///
/// Owns the client registry, the stream pipeline and the network threads.
/// [`start`](Self::start) spawns the accept loop and the event loop;
/// the driver feeds the stream through [`push`](Self::push) and
/// [`flush`](Self::flush), which packetize and fan out on the caller's
/// thread.
pub struct Server {
    config: Arc<ServerConfig>,
    registry: ClientRegistry,
    pipeline: Mutex<Pipeline>,
    stream: Arc<StreamDescription>,
    running: Arc<AtomicBool>,
    state: Option<Running>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let packetizer = Packetizer::new(config.codec, config.packetizer.clone());
        let stream = packetizer.description();
        Self {
            pipeline: Mutex::new(Pipeline {
                extractor: NalExtractor::new(config.cache_capacity),
                packetizer,
            }),
            stream,
            registry: ClientRegistry::new(),
            running: Arc::new(AtomicBool::new(false)),
            state: None,
            config: Arc::new(config),
        }
    }

    /// Bind the RTSP listener and the RTP/RTCP sockets, then spawn the
    /// accept and event loop threads.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let ip = self.config.bind_addr.ip();
        let rtp = UdpTransport::bind(SocketAddr::new(ip, self.config.rtp_server_port))?;
        let rtcp = UdpTransport::bind(SocketAddr::new(ip, self.config.rtcp_server_port))?;

        let listener = TcpListener::bind(self.config.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        // SETUP advertises the ports actually bound (they differ when 0 was asked for).
        let advertised = Arc::new(ServerConfig {
            rtp_server_port: rtp.local_addr()?.port(),
            rtcp_server_port: rtcp.local_addr()?.port(),
            ..(*self.config).clone()
        });
        let handler = ProtocolHandler::new(self.stream.clone(), advertised);

        self.running.store(true, Ordering::SeqCst);

        let accept = {
            let registry = self.registry.clone();
            let running = self.running.clone();
            let codec = self.config.codec;
            let interval = self.config.poll_interval;
            thread::Builder::new()
                .name("rtsp-accept".into())
                .spawn(move || transport::accept_loop(listener, registry, codec, running, interval))
        };
        let events = {
            let registry = self.registry.clone();
            let running = self.running.clone();
            let interval = self.config.poll_interval;
            thread::Builder::new()
                .name("rtsp-events".into())
                .spawn(move || transport::event_loop(registry, handler, running, interval))
        };

        let mut threads = Vec::with_capacity(2);
        for handle in [accept, events] {
            match handle {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    for handle in threads {
                        let _ = handle.join();
                    }
                    return Err(e.into());
                }
            }
        }

        tracing::info!(
            addr = %local_addr,
            codec = %self.config.codec,
            rtp_port = rtp.local_addr()?.port(),
            "RTSP server listening"
        );

        self.state = Some(Running {
            local_addr,
            rtp,
            _rtcp: rtcp,
            threads,
        });
        Ok(())
    }

    /// Set the quit flag, join both threads and close every client.
    pub fn stop(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server stopping");

        for handle in state.threads {
            if handle.join().is_err() {
                tracing::error!("server thread panicked");
            }
        }
        self.registry.close_all();
        self.registry.sweep();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the RTSP listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.as_ref().map(|s| s.local_addr)
    }

    /// Feed elementary-stream bytes.
    ///
    /// Every NAL unit the bytes complete is packetized and sent to the ready
    /// clients. Returns the number of NAL units emitted. A chunk that does
    /// not fit in the stream cache is dropped with
    /// [`RtspError::BufferFull`].
    pub fn push(&self, bytes: &[u8]) -> Result<usize> {
        let state = self.state.as_ref().ok_or(RtspError::NotStarted)?;
        let mut pipeline = self.pipeline.lock();
        let Pipeline {
            extractor,
            packetizer,
        } = &mut *pipeline;

        extractor.feed(bytes, |nal| {
            packetizer.packetize(nal.data, |packet| {
                transport::deliver(&self.registry, &state.rtp, packet);
            });
        })
    }

    /// Emit the unit pending at the end of the stream cache.
    ///
    /// Called by the driver at end of input, before it loops or stops.
    pub fn flush(&self) -> Result<usize> {
        let state = self.state.as_ref().ok_or(RtspError::NotStarted)?;
        let mut pipeline = self.pipeline.lock();
        let Pipeline {
            extractor,
            packetizer,
        } = &mut *pipeline;

        Ok(extractor.flush(|nal| {
            packetizer.packetize(nal.data, |packet| {
                transport::deliver(&self.registry, &state.rtp, packet);
            });
        }))
    }

    /// Driver entry point: `Some(bytes)` feeds, `None` flushes.
    pub fn push_chunk(&self, chunk: Option<&[u8]>) -> Result<usize> {
        match chunk {
            Some(bytes) => self.push(bytes),
            None => self.flush(),
        }
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.registry.snapshot()
    }

    /// Shared stream description (codec and captured parameter sets).
    pub fn stream(&self) -> Arc<StreamDescription> {
        self.stream.clone()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}
