//! # htsp-client
//!
//! Blocking client for tvheadend's HTSP protocol.
//!
//! This crate provides:
//! - A transport that owns one TCP connection, runs the socket loop on a
//!   dedicated thread and turns it into blocking call/answer semantics
//! - Out-of-band delivery of server push messages
//! - A session that performs the hello/authenticate/sync handshake and keeps
//!   id-keyed caches of channels, recordings and tags
//! - A reentrant gate serializing calls across threads

pub mod cache;
pub mod error;
pub mod gate;
pub mod session;
pub mod transport;

pub use cache::{EntityCaches, EntityKind};
pub use error::{ClientError, GateError};
pub use gate::{Gate, GateGuard};
pub use session::{ServerInfo, Session, SessionConfig};
pub use transport::{process_gate, PushHandler, Transport, TransportConfig, TransportState};

pub use htsp_protocol::{Message, PushMethod, Value};
