//! IMAP connection plumbing shared by the client and the server.
//!
//! This module provides:
//! - Configuration and dialing (host, port, security mode)
//! - TLS/plaintext stream abstraction with in-place STARTTLS upgrade
//! - Framed I/O for IMAP protocol
//! - Per-connection protocol state

mod config;
mod framed;
mod state;
mod stream;

pub use config::{Config, ConfigBuilder, Security, connect, connect_with};
pub(crate) use framed::log_frame;
pub use framed::{Frame, FramedStream, MAX_LINE_LENGTH, MAX_LITERAL_SIZE};
pub use state::{ConnectionState, SelectedMailbox};
pub use stream::{
    ImapStream, Rewind, create_tls_acceptor, create_tls_connector, tls_connector_with_roots,
};
