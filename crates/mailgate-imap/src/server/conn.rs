//! Per-connection command dispatcher.
//!
//! Commands are read and answered strictly in order. Storage failures become
//! tagged NO, malformed or misplaced commands tagged BAD, and only I/O
//! errors, LOGOUT or server shutdown end the connection.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, watch};

use super::Shared;
use super::session::{Session, StorageError};
use crate::Result;
use crate::auth::{Step, server_mechanism};
use crate::codec::Encoder;
use crate::command::{Command, SearchReturn};
use crate::connection::{ConnectionState, Frame, FramedStream, ImapStream};
use crate::parser::{CommandParser, Response, SearchData, UntaggedResponse, decode_sasl};
use crate::types::{Capability, ConnState, Mailbox, ResponseCode, SequenceSet, Status, Tag};

/// Tagged completion of a command.
#[derive(Debug)]
struct Reply {
    status: Status,
    code: Option<ResponseCode>,
    text: String,
}

impl Reply {
    fn ok(text: impl Into<String>) -> Self {
        Self::with_code(Status::Ok, None, text)
    }

    fn no(code: Option<ResponseCode>, text: impl Into<String>) -> Self {
        Self::with_code(Status::No, code, text)
    }

    fn bad(text: impl Into<String>) -> Self {
        Self::with_code(Status::Bad, None, text)
    }

    fn with_code(status: Status, code: Option<ResponseCode>, text: impl Into<String>) -> Self {
        Self {
            status,
            code,
            text: text.into(),
        }
    }
}

impl From<StorageError> for Reply {
    fn from(err: StorageError) -> Self {
        Self::no(err.code(), err.to_string())
    }
}

enum Flow {
    Continue,
    Close,
}

pub(super) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        // The server is gone without asking anyone to stop
        std::future::pending::<()>().await;
    }
}

async fn mailbox_changed(rx: &mut Option<broadcast::Receiver<()>>) {
    if let Some(rx) = rx {
        loop {
            match rx.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    std::future::pending::<()>().await;
}

fn is_done(line: &[u8]) -> bool {
    line.trim_ascii().eq_ignore_ascii_case(b"DONE")
}

fn esearch_data(uid: bool, hits: &[u32], returns: &[SearchReturn]) -> SearchData {
    let full = SearchData::from_matches(uid, hits);
    let wants = |r: SearchReturn| {
        returns.contains(&r) || (returns.is_empty() && r == SearchReturn::All)
    };
    SearchData {
        uid,
        min: full.min.filter(|_| wants(SearchReturn::Min)),
        max: full.max.filter(|_| wants(SearchReturn::Max)),
        all: if wants(SearchReturn::All) {
            full.all
        } else {
            SequenceSet::empty()
        },
        count: full.count.filter(|_| wants(SearchReturn::Count)),
    }
}

pub(super) struct Conn<S> {
    framed: FramedStream<ImapStream<S>>,
    shared: Arc<Shared>,
    session: Box<dyn Session>,
    state: ConnectionState,
    shutdown: watch::Receiver<bool>,
}

impl<S> Conn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub(super) fn new(shared: Arc<Shared>, stream: S) -> Self {
        Self {
            framed: FramedStream::server(ImapStream::plain(stream)),
            session: shared.backend.new_session(),
            shutdown: shared.shutdown.subscribe(),
            state: ConnectionState::new(),
            shared,
        }
    }

    fn utf8(&self) -> bool {
        self.state.is_enabled(&Capability::Utf8Accept)
    }

    fn auth_allowed(&self) -> bool {
        self.framed.get_ref().is_tls() || self.shared.options.insecure_auth
    }

    fn capabilities(&self) -> Vec<Capability> {
        let options = &self.shared.options;
        let mut caps = options.caps.clone();
        for cap in [
            Capability::Enable,
            Capability::Idle,
            Capability::Acl,
            Capability::Utf8Accept,
            Capability::LiteralPlus,
            Capability::SaslIr,
            Capability::Unselect,
        ] {
            caps.insert(cap);
        }
        if !caps.has(&Capability::Esearch) {
            caps.insert(Capability::Esearch);
        }
        if options.tls.is_some() && !self.framed.get_ref().is_tls() {
            caps.insert(Capability::StartTls);
        }
        if self.auth_allowed() {
            caps.insert(Capability::Auth("PLAIN".to_string()));
        } else {
            caps.insert(Capability::LoginDisabled);
        }
        caps.iter().cloned().collect()
    }

    async fn send(&mut self, responses: &[UntaggedResponse]) -> Result<()> {
        if responses.is_empty() {
            return Ok(());
        }
        let mut enc = Encoder::response().utf8(self.utf8());
        for response in responses {
            response.serialize(&mut enc);
        }
        self.framed.write_all(&enc.into_bytes()).await
    }

    async fn complete(&mut self, tag: Option<Tag>, reply: Reply) -> Result<()> {
        let bytes = match tag {
            Some(tag) => Response::tagged(tag, reply.status, reply.code, reply.text),
            None => Response::Untagged(match reply.status {
                Status::Ok => UntaggedResponse::Ok {
                    code: reply.code,
                    text: reply.text,
                },
                Status::No => UntaggedResponse::No {
                    code: reply.code,
                    text: reply.text,
                },
                _ => UntaggedResponse::Bad {
                    code: reply.code,
                    text: reply.text,
                },
            }),
        }
        .to_bytes(self.utf8());
        self.framed.write_all(&bytes).await
    }

    async fn bye(&mut self, text: &str) -> Result<()> {
        self.send(&[UntaggedResponse::Bye {
            code: None,
            text: text.to_string(),
        }])
        .await
    }

    /// Serves the connection until it ends.
    pub(super) async fn run(mut self) -> Result<()> {
        let greeting = Response::Untagged(UntaggedResponse::Ok {
            code: Some(ResponseCode::Capability(self.capabilities())),
            text: self.shared.options.greeting.clone(),
        });
        self.framed.write_all(&greeting.to_bytes(false)).await?;

        loop {
            let frame = tokio::select! {
                () = shutdown_requested(&mut self.shutdown) => {
                    self.bye("Server shutting down").await?;
                    return Ok(());
                }
                frame = self.framed.read_command() => frame,
            };
            let line = match frame {
                Ok(Frame::Command(line)) => line,
                Ok(Frame::Rejected { tag, reason }) => {
                    self.complete(tag, Reply::bad(reason)).await?;
                    continue;
                }
                Err(err) if err.is_closed() => {
                    tracing::debug!("client went away");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };

            let (tag, command) = match CommandParser::parse(&line, self.utf8()) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(error = %err, "unparsable command");
                    self.complete(CommandParser::tag(&line), Reply::bad(err.to_string()))
                        .await?;
                    continue;
                }
            };
            tracing::debug!(tag = %tag, command = command.name(), "dispatch");

            if let Err(err) = self.state.check_state(command.min_state()) {
                self.complete(Some(tag), Reply::bad(err.to_string())).await?;
                continue;
            }

            match command {
                Command::Logout => {
                    self.bye("Logging out").await?;
                    self.complete(Some(tag), Reply::ok("LOGOUT completed")).await?;
                    self.state.logout();
                    return Ok(());
                }
                Command::StartTls => {
                    let acceptor = match (&self.shared.options.tls, self.framed.get_ref().is_tls()) {
                        (Some(acceptor), false)
                            if self.state.state() == ConnState::NotAuthenticated =>
                        {
                            acceptor.clone()
                        }
                        _ => {
                            self.complete(Some(tag), Reply::bad("STARTTLS not available"))
                                .await?;
                            continue;
                        }
                    };
                    self.complete(Some(tag), Reply::ok("Begin TLS negotiation now"))
                        .await?;
                    let (stream, buffered) = self.framed.into_parts();
                    let stream = stream.upgrade_server(&acceptor, buffered).await?;
                    tracing::debug!("TLS established");
                    self.framed = FramedStream::server(stream);
                }
                Command::Idle => {
                    if let Flow::Close = self.idle(tag).await? {
                        return Ok(());
                    }
                }
                command => {
                    // EXPUNGE must not renumber messages a FETCH, STORE or
                    // SEARCH response just addressed
                    let allow_expunge = !matches!(
                        command,
                        Command::Fetch { .. } | Command::Store { .. } | Command::Search { .. }
                    );
                    let reply = self.execute(&tag, command).await?;
                    if self.state.state() == ConnState::Selected {
                        let updates = self.session.poll(allow_expunge);
                        self.send(&updates).await?;
                    }
                    self.complete(Some(tag), reply).await?;
                }
            }
        }
    }

    async fn idle(&mut self, tag: Tag) -> Result<Flow> {
        self.framed.write_all(b"+ idling\r\n").await?;
        let mut changes = self.session.watch();
        let updates = self.session.poll(true);
        self.send(&updates).await?;

        let reply = loop {
            tokio::select! {
                () = shutdown_requested(&mut self.shutdown) => {
                    self.bye("Server shutting down").await?;
                    return Ok(Flow::Close);
                }
                frame = self.framed.read_command() => match frame? {
                    Frame::Command(line) if is_done(&line) => break Reply::ok("IDLE terminated"),
                    Frame::Command(_) | Frame::Rejected { .. } => {
                        break Reply::bad("Expected DONE");
                    }
                },
                () = mailbox_changed(&mut changes) => {
                    let updates = self.session.poll(true);
                    self.send(&updates).await?;
                }
            }
        };
        self.complete(Some(tag), reply).await?;
        Ok(Flow::Continue)
    }

    fn login(&mut self, username: &str, password: &str) -> Reply {
        match self.session.login(username, password) {
            Ok(()) => {
                tracing::info!(user = username, "authenticated");
                self.state.authenticated();
                Reply::with_code(
                    Status::Ok,
                    Some(ResponseCode::Capability(self.capabilities())),
                    "Authenticated",
                )
            }
            Err(err) => {
                tracing::warn!(user = username, "authentication failed");
                err.into()
            }
        }
    }

    async fn authenticate(&mut self, mechanism: &str, initial: Option<Vec<u8>>) -> Result<Reply> {
        if !self.auth_allowed() {
            return Ok(Reply::no(
                Some(ResponseCode::PrivacyRequired),
                "Authentication requires TLS",
            ));
        }
        let Some(mut server) = server_mechanism(mechanism) else {
            return Ok(Reply::no(None, format!("Unsupported mechanism {mechanism}")));
        };
        let mut response = initial;
        loop {
            match server.next(response.as_deref()) {
                Ok(Step::Challenge(challenge)) => {
                    let line = format!("+ {}\r\n", BASE64.encode(challenge));
                    self.framed.write_all(line.as_bytes()).await?;
                    let line = match self.framed.read_command().await? {
                        Frame::Command(line) => line,
                        Frame::Rejected { reason, .. } => return Ok(Reply::bad(reason)),
                    };
                    let text = std::str::from_utf8(&line).unwrap_or_default().trim_end();
                    if text == "*" {
                        return Ok(Reply::bad("AUTHENTICATE cancelled"));
                    }
                    let Some(decoded) = decode_sasl(text) else {
                        return Ok(Reply::bad("Invalid base64 response"));
                    };
                    response = Some(decoded);
                }
                Ok(Step::Done(credentials)) => {
                    return Ok(self.login(&credentials.username, &credentials.password));
                }
                Err(err) => {
                    return Ok(Reply::no(
                        Some(ResponseCode::AuthenticationFailed),
                        err.to_string(),
                    ));
                }
            }
        }
    }

    async fn select(&mut self, mailbox: Mailbox, read_only: bool) -> Result<Reply> {
        if self.state.state() == ConnState::Selected {
            self.state.unselected();
            self.send(&[UntaggedResponse::Ok {
                code: Some(ResponseCode::Closed),
                text: "Previous mailbox closed".to_string(),
            }])
            .await?;
        }
        let data = match self.session.select(&mailbox, read_only) {
            Ok(data) => data,
            Err(err) => return Ok(err.into()),
        };

        let mut untagged = vec![
            UntaggedResponse::Flags(data.flags.clone()),
            UntaggedResponse::Exists(data.exists),
        ];
        if !self.state.is_enabled(&Capability::Imap4Rev2) {
            untagged.push(UntaggedResponse::Recent(data.recent.unwrap_or(0)));
        }
        if let Some(validity) = data.uid_validity {
            untagged.push(UntaggedResponse::Ok {
                code: Some(ResponseCode::UidValidity(validity)),
                text: "UIDs valid".to_string(),
            });
        }
        if let Some(next) = data.uid_next {
            untagged.push(UntaggedResponse::Ok {
                code: Some(ResponseCode::UidNext(next)),
                text: "Predicted next UID".to_string(),
            });
        }
        untagged.push(UntaggedResponse::Ok {
            code: Some(ResponseCode::PermanentFlags(
                data.permanent_flags.iter().cloned().collect(),
            )),
            text: "Limited".to_string(),
        });
        self.send(&untagged).await?;
        self.state.selected(mailbox, read_only);

        let (code, verb) = if read_only {
            (ResponseCode::ReadOnly, "EXAMINE")
        } else {
            (ResponseCode::ReadWrite, "SELECT")
        };
        Ok(Reply::with_code(
            Status::Ok,
            Some(code),
            format!("{verb} completed"),
        ))
    }

    fn unselect(&mut self, expunge: bool, completed: String) -> Reply {
        let result = self.session.unselect(expunge);
        self.state.unselected();
        match result {
            Ok(()) => Reply::ok(completed),
            Err(err) => err.into(),
        }
    }

    /// Runs one command that follows the plain request/response shape.
    async fn execute(&mut self, tag: &Tag, command: Command) -> Result<Reply> {
        let name = command.name();
        let completed = format!("{name} completed");
        let data = match command {
            Command::Capability => {
                let caps = self.capabilities();
                vec![UntaggedResponse::Capability(caps)]
            }
            Command::Noop => Vec::new(),
            Command::Login { username, password } => {
                if !self.auth_allowed() {
                    return Ok(Reply::no(
                        Some(ResponseCode::PrivacyRequired),
                        "LOGIN is disabled on insecure connections",
                    ));
                }
                if let Err(err) = self.state.check_not_state(ConnState::NotAuthenticated) {
                    return Ok(Reply::bad(err.to_string()));
                }
                return Ok(self.login(&username, &password));
            }
            Command::Authenticate {
                mechanism,
                initial_response,
            } => {
                if let Err(err) = self.state.check_not_state(ConnState::NotAuthenticated) {
                    return Ok(Reply::bad(err.to_string()));
                }
                return self.authenticate(&mechanism, initial_response).await;
            }
            Command::Enable { capabilities } => {
                let enabled = self.state.enable(&capabilities);
                vec![UntaggedResponse::Enabled(enabled)]
            }
            Command::Select { mailbox } => return self.select(mailbox, false).await,
            Command::Examine { mailbox } => return self.select(mailbox, true).await,
            Command::Create { mailbox } => match self.session.create(&mailbox) {
                Ok(()) => Vec::new(),
                Err(err) => return Ok(err.into()),
            },
            Command::Delete { mailbox } => match self.session.delete(&mailbox) {
                Ok(()) => Vec::new(),
                Err(err) => return Ok(err.into()),
            },
            Command::List {
                reference,
                pattern,
                return_status,
            } => match self.session.list(&reference, &pattern, &return_status) {
                Ok(list) => list.into_iter().map(UntaggedResponse::List).collect(),
                Err(err) => return Ok(err.into()),
            },
            Command::Status { mailbox, items } => match self.session.status(&mailbox, &items) {
                Ok(status) => vec![UntaggedResponse::MailboxStatus(status)],
                Err(err) => return Ok(err.into()),
            },
            Command::Append {
                mailbox,
                options,
                message,
            } => match self.session.append(&mailbox, &options, &message) {
                Ok(uid) => {
                    tracing::debug!(mailbox = %mailbox, uid = uid.get(), "appended");
                    Vec::new()
                }
                Err(StorageError::NoSuchMailbox) => {
                    return Ok(Reply::no(Some(ResponseCode::TryCreate), "No such mailbox"));
                }
                Err(err) => return Ok(err.into()),
            },
            Command::SetAcl {
                mailbox,
                identifier,
                modification,
                rights,
            } => match self
                .session
                .set_acl(&mailbox, &identifier, modification, &rights)
            {
                Ok(()) => Vec::new(),
                Err(err) => return Ok(err.into()),
            },
            Command::DeleteAcl {
                mailbox,
                identifier,
            } => match self.session.delete_acl(&mailbox, &identifier) {
                Ok(()) => Vec::new(),
                Err(err) => return Ok(err.into()),
            },
            Command::GetAcl { mailbox } => match self.session.get_acl(&mailbox) {
                Ok(acl) => vec![UntaggedResponse::Acl(acl)],
                Err(err) => return Ok(err.into()),
            },
            Command::MyRights { mailbox } => match self.session.my_rights(&mailbox) {
                Ok(rights) => vec![UntaggedResponse::MyRights { mailbox, rights }],
                Err(err) => return Ok(err.into()),
            },
            Command::Close => return Ok(self.unselect(true, completed)),
            Command::Unselect => return Ok(self.unselect(false, completed)),
            Command::Expunge => match self.session.expunge(None) {
                Ok(seqs) => seqs.into_iter().map(UntaggedResponse::Expunge).collect(),
                Err(err) => return Ok(err.into()),
            },
            Command::UidExpunge { uids } => match self.session.expunge(Some(&uids)) {
                Ok(seqs) => seqs.into_iter().map(UntaggedResponse::Expunge).collect(),
                Err(err) => return Ok(err.into()),
            },
            Command::Search {
                criteria,
                returns,
                uid,
            } => {
                let hits = match self.session.search(&criteria, uid) {
                    Ok(hits) => hits,
                    Err(err) => return Ok(err.into()),
                };
                let esearch = returns.is_some() || self.state.is_enabled(&Capability::Imap4Rev2);
                if esearch {
                    vec![UntaggedResponse::Esearch {
                        tag: Some(tag.clone()),
                        data: esearch_data(uid, &hits, returns.as_deref().unwrap_or_default()),
                    }]
                } else {
                    vec![UntaggedResponse::Search(hits)]
                }
            }
            Command::Fetch {
                sequence,
                items,
                uid,
            } => match self.session.fetch(&sequence, uid, &items.attributes()) {
                Ok(messages) => messages.into_iter().map(UntaggedResponse::Fetch).collect(),
                Err(err) => return Ok(err.into()),
            },
            Command::Store {
                sequence,
                action,
                silent,
                uid,
            } => match self.session.store(&sequence, uid, &action, silent) {
                Ok(messages) => messages.into_iter().map(UntaggedResponse::Fetch).collect(),
                Err(err) => return Ok(err.into()),
            },
            Command::Done => return Ok(Reply::bad("Not idling")),
            Command::Logout | Command::StartTls | Command::Idle => {
                return Ok(Reply::bad(format!("{name} not expected here")));
            }
        };
        self.send(&data).await?;
        Ok(Reply::ok(completed))
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

    #[test]
    fn done_is_case_insensitive() {
        assert!(is_done(b"DONE\r\n"));
        assert!(is_done(b"done\r\n"));
        assert!(!is_done(b"A1 DONE\r\n"));
    }

    #[test]
    fn esearch_keeps_requested_items() {
        let data = esearch_data(false, &[2, 4, 5], &[SearchReturn::Count, SearchReturn::Min]);
        assert_eq!(data.count, Some(3));
        assert_eq!(data.min, Some(2));
        assert_eq!(data.max, None);
        assert!(data.all.is_empty());

        // RETURN () means ALL
        let data = esearch_data(true, &[2, 4, 5], &[]);
        assert_eq!(data.all.numbers().unwrap(), vec![2, 4, 5]);
        assert_eq!(data.count, None);
        assert!(data.uid);
    }

    #[test]
    fn storage_errors_become_no() {
        let reply = Reply::from(StorageError::NoSuchMailbox);
        assert_eq!(reply.status, Status::No);
        assert_eq!(reply.code, Some(ResponseCode::NonExistent));
        assert_eq!(reply.text, "No such mailbox");
    }
}
