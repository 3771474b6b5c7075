//! Core IMAP types.
//!
//! This module defines the fundamental types used throughout the IMAP library,
//! following RFC 9051 (`IMAP4rev2`), RFC 3501 (`IMAP4rev1`) and RFC 4314
//! (ACL).

#![allow(clippy::missing_const_for_fn)]

mod capability;
pub mod datetime;
mod flags;
mod identifiers;
mod mailbox;
mod response_code;
pub mod rights;
mod sequence;
mod state;

pub use capability::{Capability, CapabilitySet, Status};
pub use flags::{Flag, Flags};
pub use identifiers::{SeqNum, Tag, Uid, UidValidity};
pub use mailbox::{
    DELIMITER, ListData, Mailbox, MailboxAttribute, SelectData, StatusData, StatusItem,
    list_matches,
};
pub use response_code::ResponseCode;
pub use rights::{RightModification, RightSet, format_rights, parse_rights};
pub use sequence::SequenceSet;
pub use state::ConnState;
