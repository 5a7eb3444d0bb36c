//! RTSP protocol implementation (RFC 2326).
//!
//! Parses requests, builds responses, dispatches methods against a client's
//! state and generates the SDP for DESCRIBE.
//!
//! ## Per-client state machine
//!
//! ```text
//! Init --SETUP--> Configured --PLAY--> Playing --TEARDOWN--> Configured
//! ```
//!
//! There is no terminal state: a client goes away when its connection
//! closes.
//!
//! ## Supported methods
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | SETUP | §10.4 | Negotiate transport (TCP interleaved or UDP) |
//! | PLAY | §10.5 | Start media delivery |
//! | TEARDOWN | §10.7 | Stop media delivery (no response is sent) |
//!
//! Any other method is answered with `551 Option not supported`.

pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

pub use handler::ProtocolHandler;
pub use request::{Method, RtspRequest};
pub use response::RtspResponse;
