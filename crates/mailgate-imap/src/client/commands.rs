//! Handles for in-flight commands.
//!
//! Every client method returns as soon as the command is on the wire. The
//! handle resolves when the tagged completion arrives; if the connection
//! closes first it fails with [`Error::ConnectionClosed`].

#![allow(clippy::missing_errors_doc)]

use tokio::sync::OwnedMutexGuard;

use super::shared::{Completion, Handle, Writer};
use crate::parser::{AclData, FetchMessage, SearchData, UntaggedResponse};
use crate::types::{
    Capability, Flags, ListData, ResponseCode, RightSet, SelectData, SeqNum, StatusData,
};
use crate::{Error, Result};

/// A command whose only outcome is its completion.
pub struct Command {
    pub(super) handle: Handle,
}

impl Command {
    /// Waits for the tagged completion.
    pub async fn wait(self) -> Result<()> {
        self.handle.finish().await.map(drop)
    }
}

/// Handle for LIST.
pub struct ListCommand {
    pub(super) handle: Handle,
}

impl ListCommand {
    /// Collects all mailboxes. STATUS data returned through
    /// `RETURN (STATUS ...)` is attached to its mailbox.
    pub async fn collect(self) -> Result<Vec<ListData>> {
        let (items, _) = self.handle.collect().await?;
        let mut lists: Vec<ListData> = Vec::new();
        for item in items {
            match item {
                UntaggedResponse::List(list) => lists.push(list),
                UntaggedResponse::MailboxStatus(status) => {
                    if let Some(list) = lists.iter_mut().rev().find(|l| l.mailbox == status.mailbox)
                    {
                        list.status = Some(status);
                    }
                }
                _ => {}
            }
        }
        Ok(lists)
    }
}

/// Handle for FETCH and STORE, streaming messages as they arrive.
pub struct FetchCommand {
    pub(super) handle: Handle,
}

impl FetchCommand {
    /// Returns the next message, or `None` once the command completed.
    pub async fn next(&mut self) -> Option<FetchMessage> {
        while let Some(item) = self.handle.next().await {
            if let UntaggedResponse::Fetch(msg) = item {
                return Some(msg);
            }
        }
        None
    }

    /// Collects all remaining messages.
    pub async fn collect(mut self) -> Result<Vec<FetchMessage>> {
        let mut messages = Vec::new();
        while let Some(msg) = self.next().await {
            messages.push(msg);
        }
        self.handle.finish().await?;
        Ok(messages)
    }

    /// Discards unread messages and waits for the completion.
    pub async fn close(self) -> Result<()> {
        self.handle.finish().await.map(drop)
    }
}

/// Handle for EXPUNGE and UID EXPUNGE.
pub struct ExpungeCommand {
    pub(super) handle: Handle,
}

impl ExpungeCommand {
    /// Collects the sequence numbers of expunged messages, in the order the
    /// server reported them.
    pub async fn collect(self) -> Result<Vec<u32>> {
        let (items, _) = self.handle.collect().await?;
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                UntaggedResponse::Expunge(seq) => Some(seq.get()),
                _ => None,
            })
            .collect())
    }
}

/// Handle for SEARCH and UID SEARCH.
pub struct SearchCommand {
    pub(super) handle: Handle,
    pub(super) uid: bool,
}

impl SearchCommand {
    /// Waits for the results.
    ///
    /// A plain `* SEARCH` answer is turned into complete result data, so
    /// MIN, MAX and COUNT are always available.
    pub async fn wait(self) -> Result<SearchData> {
        let (items, _) = self.handle.collect().await?;
        let mut numbers = Vec::new();
        let mut esearch = None;
        for item in items {
            match item {
                UntaggedResponse::Search(nums) => numbers.extend(nums),
                UntaggedResponse::Esearch { data, .. } => esearch = Some(data),
                _ => {}
            }
        }
        Ok(esearch.unwrap_or_else(|| SearchData::from_matches(self.uid, &numbers)))
    }
}

/// Handle for SELECT and EXAMINE.
pub struct SelectCommand {
    pub(super) handle: Handle,
    pub(super) read_only: bool,
}

impl SelectCommand {
    /// Waits for the mailbox data.
    pub async fn wait(self) -> Result<SelectData> {
        let (items, Completion { code, .. }) = self.handle.collect().await?;
        let mut data = SelectData {
            read_only: self.read_only,
            ..SelectData::default()
        };
        for item in items {
            match item {
                UntaggedResponse::Exists(n) => data.exists = n,
                UntaggedResponse::Recent(n) => data.recent = Some(n),
                UntaggedResponse::Flags(flags) => data.flags = flags,
                UntaggedResponse::Ok {
                    code: Some(code), ..
                } => match code {
                    ResponseCode::PermanentFlags(flags) => {
                        data.permanent_flags = Flags::from_vec(flags);
                    }
                    ResponseCode::UidNext(uid) => data.uid_next = Some(uid),
                    ResponseCode::UidValidity(v) => data.uid_validity = Some(v),
                    _ => {}
                },
                _ => {}
            }
        }
        match code {
            Some(ResponseCode::ReadOnly) => data.read_only = true,
            Some(ResponseCode::ReadWrite) => data.read_only = false,
            _ => {}
        }
        Ok(data)
    }
}

/// Handle for STATUS.
pub struct StatusCommand {
    pub(super) handle: Handle,
}

impl StatusCommand {
    /// Waits for the status data.
    pub async fn wait(self) -> Result<StatusData> {
        let (items, _) = self.handle.collect().await?;
        items
            .into_iter()
            .find_map(|item| match item {
                UntaggedResponse::MailboxStatus(status) => Some(status),
                _ => None,
            })
            .ok_or_else(|| Error::Protocol("STATUS completed without data".to_string()))
    }
}

/// Handle for ENABLE.
pub struct EnableCommand {
    pub(super) handle: Handle,
}

impl EnableCommand {
    /// Waits for the capabilities the server enabled.
    pub async fn wait(self) -> Result<Vec<Capability>> {
        let (items, _) = self.handle.collect().await?;
        Ok(items
            .into_iter()
            .flat_map(|item| match item {
                UntaggedResponse::Enabled(caps) => caps,
                _ => Vec::new(),
            })
            .collect())
    }
}

/// Handle for GETACL.
pub struct AclCommand {
    pub(super) handle: Handle,
}

impl AclCommand {
    /// Waits for the access control list.
    pub async fn wait(self) -> Result<AclData> {
        let (items, _) = self.handle.collect().await?;
        items
            .into_iter()
            .find_map(|item| match item {
                UntaggedResponse::Acl(acl) => Some(acl),
                _ => None,
            })
            .ok_or_else(|| Error::Protocol("GETACL completed without data".to_string()))
    }
}

/// Handle for MYRIGHTS.
pub struct MyRightsCommand {
    pub(super) handle: Handle,
}

impl MyRightsCommand {
    /// Waits for the rights of the logged-in user.
    pub async fn wait(self) -> Result<RightSet> {
        let (items, _) = self.handle.collect().await?;
        items
            .into_iter()
            .find_map(|item| match item {
                UntaggedResponse::MyRights { rights, .. } => Some(rights),
                _ => None,
            })
            .ok_or_else(|| Error::Protocol("MYRIGHTS completed without data".to_string()))
    }
}

/// Handle for APPEND.
pub struct AppendCommand {
    pub(super) handle: Handle,
}

impl AppendCommand {
    /// Waits for the message to be stored.
    pub async fn wait(self) -> Result<()> {
        self.handle.finish().await.map(drop)
    }
}

/// Handle for an IDLE in progress.
///
/// The connection is reserved for the IDLE until [`IdleCommand::close`]
/// sends DONE; other commands wait for the write lock meanwhile.
pub struct IdleCommand {
    pub(super) handle: Handle,
    pub(super) writer: Option<OwnedMutexGuard<Writer>>,
}

impl IdleCommand {
    /// Ends the IDLE and waits for its completion.
    pub async fn close(mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.write(b"DONE\r\n").await?;
        }
        self.wait().await
    }

    /// Waits for the IDLE to end without sending DONE, e.g. because the
    /// server or the connection terminated it.
    pub async fn wait(self) -> Result<()> {
        let Self { handle, writer } = self;
        let result = handle.finish().await.map(drop);
        drop(writer);
        result
    }
}

/// Unsolicited server data, delivered through [`super::Client::updates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnilateralData {
    /// The mailbox now holds this many messages.
    Exists(u32),
    /// A message was expunged.
    Expunge(SeqNum),
    /// Flags (or other data) of a message changed.
    Fetch(FetchMessage),
    /// The mailbox flag list changed.
    Flags(Flags),
    /// Recent count changed.
    Recent(u32),
    /// The server is closing the connection.
    Bye(String),
    /// `[ALERT]` text meant for the user.
    Alert(String),
}
