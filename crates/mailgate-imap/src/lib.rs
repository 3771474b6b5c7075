//! # mailgate-imap
//!
//! IMAP (RFC 9051 `IMAP4rev2`, with RFC 3501 `IMAP4rev1` compatibility)
//! client and server, with the ACL extension (RFC 4314).
//!
//! ## Features
//!
//! - **Pipelined client**: commands go out without waiting for earlier
//!   ones; each returns a handle resolved by its tagged completion
//! - **Server dispatcher**: one task per connection over a pluggable
//!   storage [`server::Backend`], with an in-memory implementation
//! - **IDLE, ENABLE, ESEARCH, UTF8=ACCEPT, LITERAL+, SASL-IR, UNSELECT**
//! - **STARTTLS via rustls** on both sides, buffered bytes preserved
//! - **Sans-I/O codec**: parsing and encoding separated from network I/O
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailgate_imap::{Client, client::Options, types::StatusItem};
//!
//! let stream = tokio::net::TcpStream::connect("localhost:143").await?;
//! let client = Client::new(stream, Options::default());
//! client.wait_greeting().await?;
//! client.login("user", "password").await.wait().await?;
//!
//! let mailboxes = client.list("", "%", &[StatusItem::Messages]).await.collect().await?;
//! for mailbox in &mailboxes {
//!     println!("{}", mailbox.mailbox);
//! }
//! client.logout().await.wait().await?;
//! ```
//!
//! ## Connection States
//!
//! ```text
//! NotAuthenticated ── LOGIN/AUTHENTICATE ──→ Authenticated
//! Authenticated    ── SELECT/EXAMINE ──────→ Selected
//! Selected         ── CLOSE/UNSELECT ──────→ Authenticated
//! any              ── LOGOUT ──────────────→ Logout
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: SASL mechanisms
//! - [`client`]: Pipelined client
//! - [`codec`]: Wire encoder
//! - [`command`]: Commands and their arguments
//! - [`connection`]: Streams, framing, TLS and per-connection state
//! - [`parser`]: Sans-I/O command and response parser
//! - [`server`]: Server dispatcher and storage interface
//! - [`types`]: Core IMAP types (flags, mailboxes, sequences, rights, etc.)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod client;
pub mod codec;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod server;
pub mod types;

pub use client::Client;
pub use command::{Command, FetchAttribute, FetchItems, SearchCriteria, StoreAction, TagGenerator};
pub use connection::{Config, ConfigBuilder, ConnectionState, FramedStream, ImapStream, Security};
pub use error::{Error, Result};
pub use parser::{Response, ResponseParser, UntaggedResponse};
pub use server::Server;
pub use types::{
    Capability, ConnState, Flag, Flags, Mailbox, ResponseCode, RightModification, RightSet,
    SeqNum, SequenceSet, Status, Tag, Uid, UidValidity,
};

/// IMAP protocol version supported.
pub const IMAP_VERSION: &str = "IMAP4rev2";
