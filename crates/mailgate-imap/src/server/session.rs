//! Storage interface consumed by the server dispatcher.
//!
//! A [`Backend`] is shared by every connection and hands out one
//! [`Session`] per connection. Sequence numbers passed to and returned by a
//! session are those of the session's own view of the selected mailbox.

use thiserror::Error;
use tokio::sync::broadcast;

use crate::command::{AppendOptions, FetchAttribute, SearchCriteria, StoreAction};
use crate::parser::{AclData, FetchMessage, UntaggedResponse};
use crate::types::{
    ListData, Mailbox, ResponseCode, RightModification, RightSet, SelectData, SeqNum,
    SequenceSet, StatusData, StatusItem, Uid,
};

/// Failure reported by the storage collaborator. Sent to the client as a
/// tagged NO carrying the error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The mailbox does not exist.
    #[error("No such mailbox")]
    NoSuchMailbox,

    /// The mailbox already exists.
    #[error("Mailbox already exists")]
    AlreadyExists,

    /// The selected mailbox was opened read-only.
    #[error("Mailbox is read-only")]
    ReadOnly,

    /// Unknown user or wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Any other failure, with a message for the client.
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Returns the response code sent with the NO.
    #[must_use]
    pub const fn code(&self) -> Option<ResponseCode> {
        match self {
            Self::NoSuchMailbox => Some(ResponseCode::NonExistent),
            Self::AlreadyExists => Some(ResponseCode::AlreadyExists),
            Self::ReadOnly => Some(ResponseCode::Cannot),
            Self::InvalidCredentials => Some(ResponseCode::AuthenticationFailed),
            Self::Other(_) => None,
        }
    }
}

/// Result of a storage operation.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Shared storage, one per server.
pub trait Backend: Send + Sync + 'static {
    /// Opens a session for a new connection.
    fn new_session(&self) -> Box<dyn Session>;
}

/// Per-connection access to storage.
///
/// Methods past [`Session::login`] are only called once it succeeded, and
/// the message methods only while a mailbox is selected.
pub trait Session: Send {
    /// Checks credentials and binds the session to the user.
    fn login(&mut self, username: &str, password: &str) -> StorageResult<()>;

    /// Creates a mailbox, along with any missing parents.
    fn create(&mut self, mailbox: &Mailbox) -> StorageResult<()>;

    /// Deletes a mailbox.
    fn delete(&mut self, mailbox: &Mailbox) -> StorageResult<()>;

    /// Lists mailboxes matching `pattern` under `reference`. `status` items
    /// are attached to each entry when non-empty.
    fn list(
        &mut self,
        reference: &str,
        pattern: &str,
        status: &[StatusItem],
    ) -> StorageResult<Vec<ListData>>;

    /// Returns the requested counters of a mailbox.
    fn status(&mut self, mailbox: &Mailbox, items: &[StatusItem]) -> StorageResult<StatusData>;

    /// Stores a new message and returns its UID.
    fn append(
        &mut self,
        mailbox: &Mailbox,
        options: &AppendOptions,
        message: &[u8],
    ) -> StorageResult<Uid>;

    /// Opens a view of a mailbox, replacing any previous one.
    fn select(&mut self, mailbox: &Mailbox, read_only: bool) -> StorageResult<SelectData>;

    /// Closes the view. With `expunge`, messages flagged `\Deleted` are
    /// removed silently first.
    fn unselect(&mut self, expunge: bool) -> StorageResult<()>;

    /// Returns data of the addressed messages.
    fn fetch(
        &mut self,
        set: &SequenceSet,
        uid: bool,
        items: &[FetchAttribute],
    ) -> StorageResult<Vec<FetchMessage>>;

    /// Changes flags. Unless `silent`, returns the resulting flags of every
    /// targeted message, changed or not.
    fn store(
        &mut self,
        set: &SequenceSet,
        uid: bool,
        action: &StoreAction,
        silent: bool,
    ) -> StorageResult<Vec<FetchMessage>>;

    /// Removes `\Deleted` messages, restricted to `uids` when given, and
    /// returns their sequence numbers in reporting order.
    fn expunge(&mut self, uids: Option<&SequenceSet>) -> StorageResult<Vec<SeqNum>>;

    /// Returns matching sequence numbers, or UIDs with `uid`.
    fn search(&mut self, criteria: &SearchCriteria, uid: bool) -> StorageResult<Vec<u32>>;

    /// Changes the rights of `identifier` on a mailbox.
    fn set_acl(
        &mut self,
        mailbox: &Mailbox,
        identifier: &str,
        modification: RightModification,
        rights: &RightSet,
    ) -> StorageResult<()>;

    /// Removes `identifier` from a mailbox ACL.
    fn delete_acl(&mut self, mailbox: &Mailbox, identifier: &str) -> StorageResult<()>;

    /// Returns the ACL of a mailbox.
    fn get_acl(&mut self, mailbox: &Mailbox) -> StorageResult<AclData>;

    /// Returns the rights of the logged-in user on a mailbox.
    fn my_rights(&mut self, mailbox: &Mailbox) -> StorageResult<RightSet>;

    /// Collects changes made by other sessions to the selected mailbox since
    /// the last poll. EXPUNGE responses are held back unless
    /// `allow_expunge`.
    fn poll(&mut self, allow_expunge: bool) -> Vec<UntaggedResponse>;

    /// Subscribes to change notifications of the selected mailbox.
    fn watch(&self) -> Option<broadcast::Receiver<()>>;
}
