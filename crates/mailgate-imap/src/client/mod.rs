//! Pipelined IMAP client.
//!
//! A [`Client`] owns one connection. Commands are written immediately,
//! without waiting for earlier ones to complete, and each call returns a
//! handle that resolves when the server sends the tagged completion. A
//! background reader task decodes every response and routes it:
//!
//! - tagged completions resolve the pending command with that tag
//! - untagged data goes to the oldest pending command expecting that shape
//! - everything else is unilateral and goes to [`Client::updates`]
//!
//! # Example
//!
//! ```ignore
//! use mailgate_imap::{Client, client::Options};
//!
//! let stream = tokio::net::TcpStream::connect("localhost:143").await?;
//! let client = Client::new(stream, Options::default());
//! client.wait_greeting().await?;
//! client.login("user", "password").await.wait().await?;
//! let inbox = client.select("INBOX").await.wait().await?;
//! println!("{} messages", inbox.exists);
//! client.logout().await.wait().await?;
//! ```

#![allow(clippy::missing_errors_doc)]

mod commands;
mod shared;

use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;

pub use self::commands::{
    AclCommand, AppendCommand, Command, EnableCommand, ExpungeCommand, FetchCommand, IdleCommand,
    ListCommand, MyRightsCommand, SearchCommand, SelectCommand, StatusCommand, UnilateralData,
};
use self::shared::{Greeting, Handle, Kind, Shared, Writer};
use crate::auth::SaslClient;
use crate::codec::LiteralMode;
use crate::command::{AppendOptions, Command as Cmd, FetchItems, SearchCriteria, SearchReturn, StoreAction};
use crate::connection::{ConnectionState, FramedStream, ImapStream, create_tls_connector};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{
    Capability, CapabilitySet, ConnState, Mailbox, RightModification, RightSet, SequenceSet,
    Status, StatusItem,
};
use crate::{Error, Result};

/// Client options.
#[derive(Clone, Default)]
pub struct Options {
    /// Connector used for STARTTLS; the webpki roots when `None`.
    pub tls: Option<TlsConnector>,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

/// An IMAP client connection.
pub struct Client {
    shared: Arc<Shared>,
    updates: Mutex<Option<mpsc::UnboundedReceiver<UnilateralData>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("caps", &self.caps())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Wraps a connected stream and starts the reader task. The greeting is
    /// processed in the background; see [`Client::wait_greeting`].
    ///
    /// Must be called within a tokio runtime.
    pub fn new<S>(stream: S, _options: Options) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        Self::spawn(FramedStream::new(read), write, None)
    }

    /// Reads the greeting, negotiates STARTTLS and upgrades the stream
    /// before starting the reader task.
    pub async fn new_starttls<S>(stream: S, host: &str, options: Options) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response().await?;
        match ResponseParser::parse(&greeting)? {
            Response::Untagged(UntaggedResponse::Ok { .. }) => {}
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                return Err(Error::Bye(text));
            }
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        }

        let tags = crate::command::TagGenerator::new('S');
        let tag = tags.next();
        framed
            .write_all(&Cmd::StartTls.encode(&tag, LiteralMode::Synchronizing, false).to_vec())
            .await?;
        loop {
            let frame = framed.read_response().await?;
            match ResponseParser::parse(&frame)? {
                Response::Tagged {
                    tag: t,
                    status,
                    code,
                    text,
                } if t == tag => match status {
                    Status::Ok => break,
                    Status::Bad => return Err(Error::Bad { code, text }),
                    _ => return Err(Error::No { code, text }),
                },
                other => tracing::debug!(?other, "ignoring response before STARTTLS"),
            }
        }

        let connector = options.tls.clone().unwrap_or_else(create_tls_connector);
        let (stream, buffered) = framed.into_parts();
        let stream = ImapStream::plain(stream)
            .upgrade_client(&connector, host, buffered)
            .await?;
        tracing::debug!(host, "STARTTLS negotiated");

        let (read, write) = tokio::io::split(stream);
        let client = Self::spawn(FramedStream::new(read), write, Some(Greeting::Ready));
        // Capabilities from before the handshake must be discarded
        client.capability().await.wait().await?;
        Ok(client)
    }

    fn spawn<R, W>(reader: FramedStream<R>, writer: W, greeting: Option<Greeting>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(
            Writer::new(Box::new(writer)),
            ConnectionState::new(),
            updates_tx,
        ));
        if let Some(greeting) = greeting {
            shared.greeting.send_replace(greeting);
        }
        tokio::spawn(read_loop(reader, Arc::clone(&shared)));
        Self {
            shared,
            updates: Mutex::new(Some(updates_rx)),
        }
    }

    /// Waits until the server greeting was received.
    pub async fn wait_greeting(&self) -> Result<()> {
        let mut rx = self.shared.greeting.subscribe();
        let greeting = rx
            .wait_for(|g| *g != Greeting::Pending)
            .await
            .map_err(|_| Error::ConnectionClosed)?
            .clone();
        match greeting {
            Greeting::Ready => Ok(()),
            Greeting::Rejected(text) => Err(Error::Bye(text)),
            Greeting::Pending | Greeting::Closed => Err(Error::ConnectionClosed),
        }
    }

    /// Resolves once the connection is closed, by either side.
    pub async fn closed(&self) {
        let mut rx = self.shared.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Closes the connection. Every pending and future command fails with
    /// [`Error::ConnectionClosed`].
    pub async fn close(&self) -> Result<()> {
        self.shared.shutdown.send_replace(true);
        self.closed().await;
        // An active IDLE holds the writer; the stream closes when it drops
        if let Ok(mut writer) = self.shared.writer.try_lock() {
            writer.shutdown().await?;
        }
        Ok(())
    }

    /// Returns the tracked connection state.
    #[must_use]
    pub fn state(&self) -> ConnState {
        self.shared.state.state()
    }

    /// Returns the server capabilities last announced.
    #[must_use]
    pub fn caps(&self) -> CapabilitySet {
        self.shared.caps()
    }

    /// Takes the receiver of unilateral server data. Returns `None` after
    /// the first call.
    pub fn updates(&self) -> Option<mpsc::UnboundedReceiver<UnilateralData>> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn literal_mode(&self) -> LiteralMode {
        if self.shared.caps().has(&Capability::LiteralPlus) {
            LiteralMode::NonSynchronizing
        } else {
            LiteralMode::Synchronizing
        }
    }

    /// Writes a command and returns its handle.
    async fn send(&self, cmd: Cmd, kind: Kind) -> Handle {
        let mut writer = self.shared.writer.lock().await;
        self.send_locked(&mut writer, &cmd, kind).await.0
    }

    async fn send_locked(
        &self,
        writer: &mut Writer,
        cmd: &Cmd,
        kind: Kind,
    ) -> (Handle, mpsc::UnboundedReceiver<Option<String>>) {
        let (handle, mut continuation) = match self.shared.register(kind) {
            Ok(registered) => registered,
            Err(err) => {
                let (_, rx) = mpsc::unbounded_channel();
                return (Handle::failed(err), rx);
            }
        };
        tracing::debug!(tag = %handle.tag, command = cmd.name(), "sending");

        let encoded = cmd.encode(&handle.tag, self.literal_mode(), self.shared.utf8());
        for (i, chunk) in encoded.chunks().iter().enumerate() {
            // Synchronizing literal: wait for the server's go-ahead. A
            // rejection completes the command and closes the channel.
            if i > 0 && continuation.recv().await.is_none() {
                break;
            }
            if let Err(err) = writer.write(chunk).await {
                self.shared.fail(&handle.tag, err);
                break;
            }
        }
        (handle, continuation)
    }

    /// CAPABILITY. The result is available through [`Client::caps`] once
    /// the command completed.
    pub async fn capability(&self) -> Command {
        Command {
            handle: self.send(Cmd::Capability, Kind::Capability).await,
        }
    }

    /// NOOP, also used to poll for mailbox updates.
    pub async fn noop(&self) -> Command {
        Command {
            handle: self.send(Cmd::Noop, Kind::Plain).await,
        }
    }

    /// LOGIN.
    pub async fn login(&self, username: &str, password: &str) -> Command {
        let cmd = Cmd::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        Command {
            handle: self.send(cmd, Kind::Login).await,
        }
    }

    /// AUTHENTICATE with a SASL mechanism. The initial response is sent
    /// inline when the server supports SASL-IR.
    pub async fn authenticate(&self, mut mechanism: impl SaslClient) -> Command {
        let mut initial = match mechanism.start() {
            Ok(initial) => initial,
            Err(err) => return Command { handle: Handle::failed(err) },
        };
        let sasl_ir = self.caps().has(&Capability::SaslIr);
        let cmd = Cmd::Authenticate {
            mechanism: mechanism.mechanism().to_string(),
            initial_response: if sasl_ir { initial.take() } else { None },
        };

        let mut writer = self.shared.writer.lock().await;
        let (handle, mut challenges) = self.send_locked(&mut writer, &cmd, Kind::Login).await;

        // The channel closes when the command completes
        while let Some(challenge) = challenges.recv().await {
            let challenge = challenge.unwrap_or_default();
            let reply = match initial.take() {
                Some(initial) => Ok(initial),
                None => BASE64
                    .decode(challenge.trim())
                    .map_err(|_| Error::Auth("invalid base64 challenge".to_string()))
                    .and_then(|decoded| mechanism.next(&decoded)),
            };
            let line = match reply {
                Ok(reply) => format!("{}\r\n", BASE64.encode(reply)),
                Err(err) => {
                    tracing::debug!(error = %err, "cancelling authentication");
                    "*\r\n".to_string()
                }
            };
            if let Err(err) = writer.write(line.as_bytes()).await {
                self.shared.fail(&handle.tag, err);
                break;
            }
        }
        Command { handle }
    }

    /// LOGOUT.
    pub async fn logout(&self) -> Command {
        Command {
            handle: self.send(Cmd::Logout, Kind::Logout).await,
        }
    }

    /// ENABLE.
    pub async fn enable(&self, capabilities: &[Capability]) -> EnableCommand {
        let cmd = Cmd::Enable {
            capabilities: capabilities.to_vec(),
        };
        EnableCommand {
            handle: self.send(cmd, Kind::Enable).await,
        }
    }

    /// CREATE.
    pub async fn create(&self, mailbox: &str) -> Command {
        let cmd = Cmd::Create {
            mailbox: Mailbox::new(mailbox),
        };
        Command {
            handle: self.send(cmd, Kind::Plain).await,
        }
    }

    /// DELETE.
    pub async fn delete(&self, mailbox: &str) -> Command {
        let cmd = Cmd::Delete {
            mailbox: Mailbox::new(mailbox),
        };
        Command {
            handle: self.send(cmd, Kind::Plain).await,
        }
    }

    /// LIST, optionally with `RETURN (STATUS (...))`.
    pub async fn list(&self, reference: &str, pattern: &str, status: &[StatusItem]) -> ListCommand {
        let cmd = Cmd::List {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
            return_status: status.to_vec(),
        };
        ListCommand {
            handle: self.send(cmd, Kind::List).await,
        }
    }

    /// STATUS.
    pub async fn status(&self, mailbox: &str, items: &[StatusItem]) -> StatusCommand {
        let cmd = Cmd::Status {
            mailbox: Mailbox::new(mailbox),
            items: items.to_vec(),
        };
        StatusCommand {
            handle: self.send(cmd, Kind::Status).await,
        }
    }

    /// APPEND. Uses a non-synchronizing literal when LITERAL+ is available.
    pub async fn append(&self, mailbox: &str, options: AppendOptions, message: &[u8]) -> AppendCommand {
        let cmd = Cmd::Append {
            mailbox: Mailbox::new(mailbox),
            options,
            message: message.to_vec(),
        };
        AppendCommand {
            handle: self.send(cmd, Kind::Plain).await,
        }
    }

    /// SELECT.
    pub async fn select(&self, mailbox: &str) -> SelectCommand {
        self.select_inner(mailbox, false).await
    }

    /// EXAMINE (read-only SELECT).
    pub async fn examine(&self, mailbox: &str) -> SelectCommand {
        self.select_inner(mailbox, true).await
    }

    async fn select_inner(&self, mailbox: &str, read_only: bool) -> SelectCommand {
        let mailbox = Mailbox::new(mailbox);
        let cmd = if read_only {
            Cmd::Examine {
                mailbox: mailbox.clone(),
            }
        } else {
            Cmd::Select {
                mailbox: mailbox.clone(),
            }
        };
        SelectCommand {
            handle: self.send(cmd, Kind::Select { mailbox, read_only }).await,
            read_only,
        }
    }

    /// CLOSE: expunges deleted messages silently and leaves Selected.
    pub async fn close_mailbox(&self) -> Command {
        Command {
            handle: self.send(Cmd::Close, Kind::Unselect).await,
        }
    }

    /// UNSELECT: leaves Selected without expunging.
    pub async fn unselect(&self) -> Command {
        Command {
            handle: self.send(Cmd::Unselect, Kind::Unselect).await,
        }
    }

    /// EXPUNGE.
    pub async fn expunge(&self) -> ExpungeCommand {
        ExpungeCommand {
            handle: self.send(Cmd::Expunge, Kind::Expunge).await,
        }
    }

    /// UID EXPUNGE: expunges only the given deleted messages.
    pub async fn uid_expunge(&self, uids: &SequenceSet) -> ExpungeCommand {
        let cmd = Cmd::UidExpunge { uids: uids.clone() };
        ExpungeCommand {
            handle: self.send(cmd, Kind::Expunge).await,
        }
    }

    /// FETCH by sequence numbers.
    pub async fn fetch(&self, sequence: &SequenceSet, items: FetchItems) -> FetchCommand {
        self.fetch_inner(sequence, items, false).await
    }

    /// UID FETCH.
    pub async fn uid_fetch(&self, uids: &SequenceSet, items: FetchItems) -> FetchCommand {
        self.fetch_inner(uids, items, true).await
    }

    async fn fetch_inner(&self, sequence: &SequenceSet, items: FetchItems, uid: bool) -> FetchCommand {
        let cmd = Cmd::Fetch {
            sequence: sequence.clone(),
            items,
            uid,
        };
        FetchCommand {
            handle: self.send(cmd, Kind::Fetch).await,
        }
    }

    /// STORE by sequence numbers. Unless `silent`, the updated flags stream
    /// back through the handle.
    pub async fn store(&self, sequence: &SequenceSet, action: StoreAction, silent: bool) -> FetchCommand {
        self.store_inner(sequence, action, silent, false).await
    }

    /// UID STORE.
    pub async fn uid_store(&self, uids: &SequenceSet, action: StoreAction, silent: bool) -> FetchCommand {
        self.store_inner(uids, action, silent, true).await
    }

    async fn store_inner(
        &self,
        sequence: &SequenceSet,
        action: StoreAction,
        silent: bool,
        uid: bool,
    ) -> FetchCommand {
        let cmd = Cmd::Store {
            sequence: sequence.clone(),
            action,
            silent,
            uid,
        };
        FetchCommand {
            handle: self.send(cmd, Kind::Fetch).await,
        }
    }

    /// SEARCH. With `returns` the server answers with ESEARCH.
    pub async fn search(&self, criteria: SearchCriteria, returns: Option<&[SearchReturn]>) -> SearchCommand {
        self.search_inner(criteria, returns, false).await
    }

    /// UID SEARCH.
    pub async fn uid_search(&self, criteria: SearchCriteria, returns: Option<&[SearchReturn]>) -> SearchCommand {
        self.search_inner(criteria, returns, true).await
    }

    async fn search_inner(
        &self,
        criteria: SearchCriteria,
        returns: Option<&[SearchReturn]>,
        uid: bool,
    ) -> SearchCommand {
        let cmd = Cmd::Search {
            criteria,
            returns: returns.map(<[SearchReturn]>::to_vec),
            uid,
        };
        SearchCommand {
            handle: self.send(cmd, Kind::Search).await,
            uid,
        }
    }

    /// IDLE. Returns once the server accepted the IDLE (or refused it, in
    /// which case the handle carries the error). The connection is reserved
    /// until the handle is closed.
    pub async fn idle(&self) -> IdleCommand {
        let mut writer = Arc::clone(&self.shared.writer).lock_owned().await;
        let (handle, mut continuation) = self.send_locked(&mut writer, &Cmd::Idle, Kind::Plain).await;
        let writer = continuation.recv().await.map(|_| writer);
        IdleCommand { handle, writer }
    }

    /// SETACL.
    pub async fn set_acl(
        &self,
        mailbox: &str,
        identifier: &str,
        modification: RightModification,
        rights: &RightSet,
    ) -> Command {
        let cmd = Cmd::SetAcl {
            mailbox: Mailbox::new(mailbox),
            identifier: identifier.to_string(),
            modification,
            rights: rights.clone(),
        };
        Command {
            handle: self.send(cmd, Kind::Plain).await,
        }
    }

    /// DELETEACL.
    pub async fn delete_acl(&self, mailbox: &str, identifier: &str) -> Command {
        let cmd = Cmd::DeleteAcl {
            mailbox: Mailbox::new(mailbox),
            identifier: identifier.to_string(),
        };
        Command {
            handle: self.send(cmd, Kind::Plain).await,
        }
    }

    /// GETACL.
    pub async fn get_acl(&self, mailbox: &str) -> AclCommand {
        let cmd = Cmd::GetAcl {
            mailbox: Mailbox::new(mailbox),
        };
        AclCommand {
            handle: self.send(cmd, Kind::Acl).await,
        }
    }

    /// MYRIGHTS.
    pub async fn my_rights(&self, mailbox: &str) -> MyRightsCommand {
        let cmd = Cmd::MyRights {
            mailbox: Mailbox::new(mailbox),
        };
        MyRightsCommand {
            handle: self.send(cmd, Kind::MyRights).await,
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
    }
}

/// Decodes responses until EOF, error or shutdown.
async fn read_loop<R>(mut reader: FramedStream<R>, shared: Arc<Shared>)
where
    R: AsyncRead + Send + Unpin,
{
    let mut shutdown = shared.shutdown.subscribe();
    let mut greeted = *shared.greeting.borrow() != Greeting::Pending;

    let reason = loop {
        // read_response keeps partial frames in the stream, so losing the
        // race against shutdown drops no data
        let frame = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break None,
            frame = reader.read_response() => frame,
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => break Some(err),
        };

        if greeted {
            shared.dispatch(&frame);
        } else {
            greeted = true;
            if let Err(err) = shared.greet(&frame) {
                break Some(err);
            }
        }
    };

    shared.close(reason.as_ref());
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use super::*;
    use crate::auth::PlainClient;

    #[tokio::test]
    async fn greeting_eof_fails_wait_greeting() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let client = Client::new(client_io, Options::default());
        drop(server_io);
        assert!(client.wait_greeting().await.is_err());
    }

    #[tokio::test]
    async fn pipelined_commands_complete_in_order() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev2 AUTH=PLAIN] ready\r\n")
            .write(b"A0001 NOOP\r\n")
            .write(b"A0002 NOOP\r\n")
            .read(b"* 3 EXISTS\r\nA0001 OK done\r\nA0002 OK done\r\n")
            .build();
        let client = Client::new(mock, Options::default());
        let mut updates = client.updates().unwrap();
        client.wait_greeting().await.unwrap();
        assert!(client.caps().has_auth("plain"));

        let first = client.noop().await;
        let second = client.noop().await;
        first.wait().await.unwrap();
        second.wait().await.unwrap();
        assert_eq!(updates.recv().await, Some(UnilateralData::Exists(3)));
    }

    #[tokio::test]
    async fn authenticate_without_sasl_ir_answers_challenge() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n")
            .write(b"A0001 AUTHENTICATE PLAIN\r\n")
            .read(b"+ \r\n")
            .write(b"AHVzZXIAcGFzcw==\r\n")
            .read(b"A0001 OK [CAPABILITY IMAP4rev1 IDLE] authenticated\r\n")
            .build();
        let client = Client::new(mock, Options::default());
        client.wait_greeting().await.unwrap();

        client
            .authenticate(PlainClient::new("user", "pass"))
            .await
            .wait()
            .await
            .unwrap();
        assert_eq!(client.state(), ConnState::Authenticated);
        assert!(client.caps().has(&Capability::Idle));
    }

    #[tokio::test]
    async fn sync_literal_waits_for_continuation() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* PREAUTH ready\r\n")
            .write(b"A0001 APPEND INBOX {2}\r\n")
            .read(b"+ go ahead\r\n")
            .write(b"Hi\r\n")
            .read(b"A0001 OK appended\r\n")
            .build();
        let client = Client::new(mock, Options::default());
        client.wait_greeting().await.unwrap();
        assert_eq!(client.state(), ConnState::Authenticated);
        client
            .append("INBOX", AppendOptions::default(), b"Hi")
            .await
            .wait()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn close_fails_pending_commands() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let client = Client::new(client_io, Options::default());
        let (server_read, mut server_write) = tokio::io::split(server_io);
        server_write.write_all(b"* OK ready\r\n").await.unwrap();
        client.wait_greeting().await.unwrap();

        let pending = client.noop().await;
        let mut lines = BufReader::new(server_read).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "A0001 NOOP");

        client.close().await.unwrap();
        client.closed().await;
        assert!(matches!(pending.wait().await, Err(Error::ConnectionClosed)));
        assert!(matches!(
            client.noop().await.wait().await,
            Err(Error::ConnectionClosed)
        ));
    }
}
