//! Live H.264/H.265 RTSP server core.
//!
//! A raw Annex-B elementary stream is cut into NAL units, packetized into
//! RTP and fanned out to every client that completed SETUP and PLAY, either
//! interleaved on its RTSP connection or over UDP.
//!
//! ```no_run
//! use rtsp::{Server, ServerConfig};
//!
//! let mut server = Server::new(ServerConfig::default());
//! server.start()?;
//! # let chunk: &[u8] = &[];
//! server.push(chunk)?;
//! server.flush()?;
//! # Ok::<(), rtsp::RtspError>(())
//! ```

pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use error::{Result, RtspError};
pub use media::{Codec, Packetizer, PacketizerConfig};
pub use server::{Server, ServerConfig};
pub use session::{ClientInfo, ClientRegistry};
