//! State shared between the client handle and its reader task.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};

use super::UnilateralData;
use crate::command::TagGenerator;
use crate::connection::{ConnectionState, log_frame};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, CapabilitySet, Mailbox, ResponseCode, Status, Tag};
use crate::{Error, Result};

/// Tagged completion of a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Completion {
    pub code: Option<ResponseCode>,
    pub text: String,
}

/// Shape of the untagged data a pending command collects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Kind {
    Plain,
    Capability,
    Login,
    Select { mailbox: Mailbox, read_only: bool },
    Unselect,
    Logout,
    List,
    Status,
    Fetch,
    Search,
    Expunge,
    Enable,
    Acl,
    MyRights,
}

impl Kind {
    fn accepts(&self, data: &UntaggedResponse) -> bool {
        match (self, data) {
            (Self::Capability, UntaggedResponse::Capability(_))
            | (Self::List, UntaggedResponse::List(_) | UntaggedResponse::MailboxStatus(_))
            | (Self::Status, UntaggedResponse::MailboxStatus(_))
            | (Self::Fetch, UntaggedResponse::Fetch(_))
            | (Self::Search, UntaggedResponse::Search(_) | UntaggedResponse::Esearch { tag: None, .. })
            | (Self::Expunge, UntaggedResponse::Expunge(_))
            | (Self::Enable, UntaggedResponse::Enabled(_))
            | (Self::Acl, UntaggedResponse::Acl(_))
            | (Self::MyRights, UntaggedResponse::MyRights { .. })
            | (
                Self::Select { .. },
                UntaggedResponse::Flags(_)
                | UntaggedResponse::Exists(_)
                | UntaggedResponse::Recent(_),
            ) => true,
            (Self::Select { .. }, UntaggedResponse::Ok { code: Some(code), .. }) => matches!(
                code,
                ResponseCode::PermanentFlags(_)
                    | ResponseCode::UidNext(_)
                    | ResponseCode::UidValidity(_)
            ),
            _ => false,
        }
    }
}

struct PendingCommand {
    tag: Tag,
    kind: Kind,
    data: mpsc::UnboundedSender<UntaggedResponse>,
    continuation: mpsc::UnboundedSender<Option<String>>,
    done: oneshot::Sender<Result<Completion>>,
}

#[derive(Default)]
struct PendingTable {
    queue: VecDeque<PendingCommand>,
    closed: bool,
}

/// Receiving side of one pending command.
pub(crate) struct Handle {
    pub tag: Tag,
    done: oneshot::Receiver<Result<Completion>>,
    data: mpsc::UnboundedReceiver<UntaggedResponse>,
}

impl Handle {
    /// A handle that already failed, for commands that never hit the wire.
    pub fn failed(err: Error) -> Self {
        let (done_tx, done) = oneshot::channel();
        let (_, data) = mpsc::unbounded_channel();
        let _ = done_tx.send(Err(err));
        Self {
            tag: Tag::new("*"),
            done,
            data,
        }
    }

    /// Next untagged item, or `None` once the command completed.
    pub async fn next(&mut self) -> Option<UntaggedResponse> {
        self.data.recv().await
    }

    /// Waits for the tagged completion, discarding unread data.
    pub async fn finish(mut self) -> Result<Completion> {
        self.data.close();
        while self.data.recv().await.is_some() {}
        self.done.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Drains all untagged data, then waits for the completion.
    pub async fn collect(mut self) -> Result<(Vec<UntaggedResponse>, Completion)> {
        let mut items = Vec::new();
        while let Some(item) = self.data.recv().await {
            items.push(item);
        }
        let completion = self.done.await.map_err(|_| Error::ConnectionClosed)??;
        Ok((items, completion))
    }
}

/// Greeting progress, observed by `Client::wait_greeting`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Greeting {
    Pending,
    Ready,
    Rejected(String),
    Closed,
}

/// The write half of the connection.
pub(crate) struct Writer {
    io: Option<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl Writer {
    pub fn new(io: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self { io: Some(io) }
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let io = self.io.as_mut().ok_or(Error::ConnectionClosed)?;
        log_frame("C:", data);
        io.write_all(data).await?;
        io.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(mut io) = self.io.take() {
            io.shutdown().await?;
        }
        Ok(())
    }
}

/// Everything the reader task and the client handle share.
pub(crate) struct Shared {
    pub writer: std::sync::Arc<tokio::sync::Mutex<Writer>>,
    pub tags: TagGenerator,
    pub state: ConnectionState,
    caps: Mutex<CapabilitySet>,
    pending: Mutex<PendingTable>,
    pub greeting: watch::Sender<Greeting>,
    pub closed: watch::Sender<bool>,
    pub shutdown: watch::Sender<bool>,
    updates: mpsc::UnboundedSender<UnilateralData>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub fn new(
        writer: Writer,
        state: ConnectionState,
        updates: mpsc::UnboundedSender<UnilateralData>,
    ) -> Self {
        Self {
            writer: std::sync::Arc::new(tokio::sync::Mutex::new(writer)),
            tags: TagGenerator::default(),
            state,
            caps: Mutex::new(CapabilitySet::default()),
            pending: Mutex::new(PendingTable::default()),
            greeting: watch::channel(Greeting::Pending).0,
            closed: watch::channel(false).0,
            shutdown: watch::channel(false).0,
            updates,
        }
    }

    pub fn caps(&self) -> CapabilitySet {
        lock(&self.caps).clone()
    }

    pub fn set_caps(&self, caps: Vec<Capability>) {
        *lock(&self.caps) = CapabilitySet::new(caps);
    }

    pub fn utf8(&self) -> bool {
        self.state.is_enabled(&Capability::Utf8Accept)
    }

    /// Assigns a tag and queues the command. Must be called with the writer
    /// lock held so queue order matches wire order.
    pub fn register(
        &self,
        kind: Kind,
    ) -> Result<(Handle, mpsc::UnboundedReceiver<Option<String>>)> {
        let mut pending = lock(&self.pending);
        if pending.closed {
            return Err(Error::ConnectionClosed);
        }
        let tag = self.tags.next();
        let (data_tx, data) = mpsc::unbounded_channel();
        let (cont_tx, cont_rx) = mpsc::unbounded_channel();
        let (done_tx, done) = oneshot::channel();
        pending.queue.push_back(PendingCommand {
            tag: tag.clone(),
            kind,
            data: data_tx,
            continuation: cont_tx,
            done: done_tx,
        });
        Ok((Handle { tag, done, data }, cont_rx))
    }

    /// Resolves a queued command with an error (write failure).
    pub fn fail(&self, tag: &Tag, err: Error) {
        let mut pending = lock(&self.pending);
        if let Some(pos) = pending.queue.iter().position(|p| &p.tag == tag) {
            if let Some(cmd) = pending.queue.remove(pos) {
                let _ = cmd.done.send(Err(err));
            }
        }
    }

    /// Handles the first response of the connection.
    pub fn greet(&self, frame: &[u8]) -> Result<()> {
        let response = ResponseParser::parse(frame)?;
        match response {
            Response::Untagged(UntaggedResponse::Ok { code, .. }) => {
                if let Some(ResponseCode::Capability(caps)) = code {
                    self.set_caps(caps);
                }
                self.greeting.send_replace(Greeting::Ready);
                Ok(())
            }
            Response::Untagged(UntaggedResponse::PreAuth { code, .. }) => {
                if let Some(ResponseCode::Capability(caps)) = code {
                    self.set_caps(caps);
                }
                self.state.authenticated();
                self.greeting.send_replace(Greeting::Ready);
                Ok(())
            }
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                self.greeting.send_replace(Greeting::Rejected(text.clone()));
                Err(Error::Bye(text))
            }
            other => Err(Error::Protocol(format!("unexpected greeting: {other:?}"))),
        }
    }

    /// Routes one decoded frame.
    pub fn dispatch(&self, frame: &[u8]) {
        let response = match ResponseParser::parse_with(frame, self.utf8()) {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unparseable response");
                return;
            }
        };

        match response {
            Response::Tagged {
                tag,
                status,
                code,
                text,
            } => self.complete(&tag, status, code, text),
            Response::Continuation { text } => self.continuation(text),
            Response::Untagged(data) => self.untagged(data),
        }
    }

    fn complete(&self, tag: &Tag, status: Status, code: Option<ResponseCode>, text: String) {
        let cmd = {
            let mut pending = lock(&self.pending);
            let Some(pos) = pending.queue.iter().position(|p| &p.tag == tag) else {
                tracing::warn!(%tag, "completion for unknown tag");
                return;
            };
            pending.queue.remove(pos)
        };
        let Some(cmd) = cmd else { return };

        if let Some(ResponseCode::Capability(caps)) = &code {
            self.set_caps(caps.clone());
        }

        let result = match status {
            Status::Ok => {
                self.track_state(&cmd.kind);
                Ok(Completion { code, text })
            }
            Status::No => Err(Error::No { code, text }),
            Status::Bad => Err(Error::Bad { code, text }),
            Status::PreAuth | Status::Bye => {
                Err(Error::Protocol(format!("unexpected tagged {}", status.as_str())))
            }
        };
        tracing::debug!(%tag, ok = result.is_ok(), "command completed");
        let _ = cmd.done.send(result);
    }

    fn track_state(&self, kind: &Kind) {
        match kind {
            Kind::Login => self.state.authenticated(),
            Kind::Select { mailbox, read_only } => {
                self.state.selected(mailbox.clone(), *read_only);
            }
            Kind::Unselect => self.state.unselected(),
            Kind::Logout => {
                self.state.logout();
            }
            _ => {}
        }
    }

    fn continuation(&self, text: Option<String>) {
        let pending = lock(&self.pending);
        let target = pending
            .queue
            .iter()
            .rev()
            .find(|p| !p.continuation.is_closed());
        match target {
            Some(cmd) => {
                let _ = cmd.continuation.send(text);
            }
            None => tracing::warn!("unexpected continuation request"),
        }
    }

    fn untagged(&self, data: UntaggedResponse) {
        match &data {
            UntaggedResponse::Capability(caps) => self.set_caps(caps.clone()),
            UntaggedResponse::Enabled(caps) => {
                self.state.enable(caps);
            }
            UntaggedResponse::Bye { text, .. } => {
                self.state.logout();
                self.unilateral(UnilateralData::Bye(text.clone()));
                return;
            }
            UntaggedResponse::Ok { code: Some(ResponseCode::Capability(caps)), .. } => {
                self.set_caps(caps.clone());
            }
            _ => {}
        }

        let unrouted = {
            let pending = lock(&self.pending);
            let target = match &data {
                UntaggedResponse::Esearch { tag: Some(tag), .. } => {
                    pending.queue.iter().find(|p| &p.tag == tag)
                }
                _ => pending.queue.iter().find(|p| p.kind.accepts(&data)),
            };
            if let Some(cmd) = target {
                // A dropped handle means nobody reads the data
                let _ = cmd.data.send(data);
                None
            } else {
                Some(data)
            }
        };
        let Some(data) = unrouted else { return };

        match data {
            UntaggedResponse::Exists(n) => self.unilateral(UnilateralData::Exists(n)),
            UntaggedResponse::Recent(n) => self.unilateral(UnilateralData::Recent(n)),
            UntaggedResponse::Expunge(seq) => self.unilateral(UnilateralData::Expunge(seq)),
            UntaggedResponse::Fetch(msg) => self.unilateral(UnilateralData::Fetch(msg)),
            UntaggedResponse::Flags(flags) => self.unilateral(UnilateralData::Flags(flags)),
            UntaggedResponse::Ok { code: Some(ResponseCode::Alert), text }
            | UntaggedResponse::No { code: Some(ResponseCode::Alert), text } => {
                self.unilateral(UnilateralData::Alert(text));
            }
            other => tracing::debug!(?other, "ignoring untagged response"),
        }
    }

    fn unilateral(&self, data: UnilateralData) {
        tracing::trace!(?data, "unilateral update");
        // Never blocks; a dropped receiver just discards updates
        let _ = self.updates.send(data);
    }

    /// Fails every pending command and marks the connection closed.
    pub fn close(&self, reason: Option<&Error>) {
        if let Some(err) = reason {
            tracing::debug!(error = %err, "connection reader stopped");
        }
        let drained: Vec<_> = {
            let mut pending = lock(&self.pending);
            pending.closed = true;
            pending.queue.drain(..).collect()
        };
        for cmd in drained {
            let _ = cmd.done.send(Err(Error::ConnectionClosed));
        }
        self.greeting.send_if_modified(|g| {
            if *g == Greeting::Pending {
                *g = Greeting::Closed;
                true
            } else {
                false
            }
        });
        self.closed.send_replace(true);
    }
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
    use super::*;
    use crate::types::{ListData, SeqNum};

    fn shared() -> (Shared, mpsc::UnboundedReceiver<UnilateralData>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = Writer::new(Box::new(tokio::io::sink()));
        (Shared::new(writer, ConnectionState::new(), tx), rx)
    }

    #[test]
    fn select_accepts_mailbox_data_only() {
        let select = Kind::Select {
            mailbox: Mailbox::inbox(),
            read_only: false,
        };
        assert!(select.accepts(&UntaggedResponse::Exists(3)));
        assert!(select.accepts(&UntaggedResponse::Ok {
            code: Some(ResponseCode::UidNext(crate::types::Uid::new(4).unwrap())),
            text: String::new(),
        }));
        assert!(!select.accepts(&UntaggedResponse::Ok {
            code: None,
            text: String::new(),
        }));
        assert!(!Kind::Plain.accepts(&UntaggedResponse::Exists(3)));
        assert!(Kind::List.accepts(&UntaggedResponse::List(ListData {
            attributes: vec![],
            delimiter: Some('/'),
            mailbox: Mailbox::inbox(),
            status: None,
        })));
    }

    #[tokio::test]
    async fn routes_to_oldest_accepting_command() {
        let (shared, mut updates) = shared();
        let (noop, _) = shared.register(Kind::Plain).unwrap();
        let (mut expunge, _) = shared.register(Kind::Expunge).unwrap();

        shared.dispatch(b"* 1 EXPUNGE\r\n");
        shared.dispatch(b"* 4 EXISTS\r\n");
        shared.dispatch(format!("{} OK done\r\n", noop.tag).as_bytes());
        shared.dispatch(format!("{} OK done\r\n", expunge.tag).as_bytes());

        assert_eq!(
            expunge.next().await,
            Some(UntaggedResponse::Expunge(SeqNum::new(1).unwrap()))
        );
        assert!(expunge.next().await.is_none());
        assert_eq!(updates.recv().await, Some(UnilateralData::Exists(4)));
        assert!(noop.finish().await.is_ok());
    }

    #[tokio::test]
    async fn close_fails_pending_and_future_commands() {
        let (shared, _updates) = shared();
        let (handle, _) = shared.register(Kind::Plain).unwrap();
        shared.close(None);
        assert!(matches!(handle.finish().await, Err(Error::ConnectionClosed)));
        assert!(matches!(
            shared.register(Kind::Plain),
            Err(Error::ConnectionClosed)
        ));
        assert_eq!(*shared.greeting.borrow(), Greeting::Closed);
    }

    #[tokio::test]
    async fn no_completion_carries_text_verbatim() {
        let (shared, _updates) = shared();
        let (handle, _) = shared.register(Kind::Plain).unwrap();
        shared.dispatch(format!("{} NO [NONEXISTENT] No such mailbox\r\n", handle.tag).as_bytes());
        let err = handle.finish().await.unwrap_err();
        assert_eq!(err.code(), Some(&ResponseCode::NonExistent));
        assert_eq!(err.to_string(), "Server returned NO: No such mailbox");
    }
}
