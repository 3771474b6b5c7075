//! IMAP server.
//!
//! [`Server`] accepts connections and runs one dispatcher task per
//! connection against a shared [`Backend`]. [`MemBackend`] keeps everything
//! in memory.
//!
//! # Example
//!
//! ```no_run
//! use mailgate_imap::server::{MemBackend, Options, Server, User};
//! use mailgate_imap::types::Mailbox;
//!
//! # async fn example() -> mailgate_imap::Result<()> {
//! let backend = MemBackend::new();
//! let user = backend.add_user(User::new("alice", "secret"));
//! user.create(&Mailbox::inbox(), &[]).ok();
//!
//! let server = Server::new(backend, Options::default());
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:1143").await?;
//! server.serve(listener).await?;
//! # Ok(())
//! # }
//! ```

mod conn;
pub mod memstore;
mod message;
pub mod search;
mod session;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

pub use memstore::{MemBackend, MemSession, User};
pub use session::{Backend, Session, StorageError, StorageResult};

use crate::Result;
use crate::types::{Capability, CapabilitySet};

/// Server settings.
#[derive(Clone)]
pub struct Options {
    /// Base capabilities. Extensions the dispatcher implements are added
    /// per connection.
    pub caps: CapabilitySet,
    /// Enables STARTTLS.
    pub tls: Option<TlsAcceptor>,
    /// Allows LOGIN and AUTHENTICATE over plaintext.
    pub insecure_auth: bool,
    /// Text of the greeting.
    pub greeting: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            caps: CapabilitySet::new([Capability::Imap4Rev1, Capability::Imap4Rev2]),
            tls: None,
            insecure_auth: false,
            greeting: "IMAP4rev2 Service Ready".to_string(),
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("caps", &self.caps)
            .field("tls", &self.tls.is_some())
            .field("insecure_auth", &self.insecure_auth)
            .field("greeting", &self.greeting)
            .finish()
    }
}

struct Shared {
    backend: Arc<dyn Backend>,
    options: Options,
    shutdown: watch::Sender<bool>,
}

/// An IMAP server. Cheap to clone; clones share storage and shutdown.
#[derive(Clone)]
pub struct Server {
    shared: Arc<Shared>,
}

impl Server {
    /// Creates a server over a storage backend.
    pub fn new<B: Backend>(backend: B, options: Options) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                backend: Arc::new(backend),
                options,
                shutdown,
            }),
        }
    }

    /// Accepts connections until [`Server::shutdown`] is called.
    ///
    /// # Errors
    ///
    /// Fails if accepting a connection fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "listening");
        }
        let mut shutdown = self.shared.shutdown.subscribe();
        loop {
            tokio::select! {
                () = conn::shutdown_requested(&mut shutdown) => {
                    tracing::info!("listener stopped");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    tracing::info!(%peer, "connection accepted");
                    let server = self.clone();
                    let span = tracing::info_span!("conn", %peer);
                    tokio::spawn(
                        async move {
                            if let Err(err) = server.serve_connection(stream).await {
                                tracing::error!(error = %err, "connection failed");
                            }
                            tracing::info!("connection closed");
                        }
                        .instrument(span),
                    );
                }
            }
        }
    }

    /// Serves a single connection over any duplex stream.
    ///
    /// # Errors
    ///
    /// Fails on I/O or TLS errors. A client hanging up is not an error.
    pub async fn serve_connection<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        conn::Conn::new(Arc::clone(&self.shared), stream).run().await
    }

    /// Asks every connection to say BYE and close, and stops
    /// [`Server::serve`].
    pub fn shutdown(&self) {
        tracing::info!("shutting down");
        self.shared.shutdown.send_replace(true);
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}
