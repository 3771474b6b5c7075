//! IMAP command builder.
//!
//! This module provides types and serialization for IMAP commands. The same
//! [`Command`] value is produced by the server-side parser
//! ([`crate::parser::CommandParser`]) and serialized by the client.

mod serialize;
mod tag_generator;
mod types;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::codec::{Encoded, Encoder, LiteralMode};
use crate::types::{
    Capability, ConnState, Mailbox, RightModification, RightSet, SequenceSet, StatusItem, Tag,
    format_rights,
};

pub use tag_generator::TagGenerator;
pub use types::{
    AppendOptions, BodySection, FetchAttribute, FetchItems, SearchCriteria, SearchReturn,
    SectionSpecifier, StoreAction,
};

pub(crate) use serialize::{write_flags, write_section};
use serialize::{write_fetch_items, write_search_criteria, write_search_return, write_store_action};

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // Any State Commands
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,

    // Not Authenticated State Commands
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE command.
    Authenticate {
        /// SASL mechanism name.
        mechanism: String,
        /// Initial response (SASL-IR), raw bytes before base64.
        initial_response: Option<Vec<u8>>,
    },

    // Authenticated State Commands
    /// ENABLE command.
    Enable {
        /// Capabilities to enable.
        capabilities: Vec<Capability>,
    },
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: Mailbox,
    },
    /// EXAMINE command (read-only SELECT).
    Examine {
        /// Mailbox to examine.
        mailbox: Mailbox,
    },
    /// CREATE command.
    Create {
        /// Mailbox to create.
        mailbox: Mailbox,
    },
    /// DELETE command.
    Delete {
        /// Mailbox to delete.
        mailbox: Mailbox,
    },
    /// LIST command.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
        /// `RETURN (STATUS (...))` items; empty for a plain LIST.
        return_status: Vec<StatusItem>,
    },
    /// STATUS command.
    Status {
        /// Mailbox name.
        mailbox: Mailbox,
        /// Status items to request.
        items: Vec<StatusItem>,
    },
    /// APPEND command.
    Append {
        /// Target mailbox.
        mailbox: Mailbox,
        /// Flags and internal date.
        options: AppendOptions,
        /// Message data.
        message: Vec<u8>,
    },
    /// SETACL command (RFC 4314).
    SetAcl {
        /// Mailbox name.
        mailbox: Mailbox,
        /// Principal the rights apply to.
        identifier: String,
        /// How the rights combine with the existing ones.
        modification: RightModification,
        /// Rights to apply.
        rights: RightSet,
    },
    /// DELETEACL command.
    DeleteAcl {
        /// Mailbox name.
        mailbox: Mailbox,
        /// Principal to remove.
        identifier: String,
    },
    /// GETACL command.
    GetAcl {
        /// Mailbox name.
        mailbox: Mailbox,
    },
    /// MYRIGHTS command.
    MyRights {
        /// Mailbox name.
        mailbox: Mailbox,
    },
    /// IDLE command.
    Idle,
    /// DONE (to end IDLE).
    Done,

    // Selected State Commands
    /// CLOSE command.
    Close,
    /// UNSELECT command.
    Unselect,
    /// EXPUNGE command.
    Expunge,
    /// UID EXPUNGE command (RFC 4315 UIDPLUS) - expunge specific UIDs.
    UidExpunge {
        /// UIDs to expunge.
        uids: SequenceSet,
    },
    /// SEARCH command.
    Search {
        /// Search criteria.
        criteria: SearchCriteria,
        /// ESEARCH result options; `None` for a plain SEARCH.
        returns: Option<Vec<SearchReturn>>,
        /// Use UIDs.
        uid: bool,
    },
    /// FETCH command.
    Fetch {
        /// Sequence set.
        sequence: SequenceSet,
        /// Items to fetch.
        items: FetchItems,
        /// Use UIDs.
        uid: bool,
    },
    /// STORE command.
    Store {
        /// Sequence set.
        sequence: SequenceSet,
        /// Store action.
        action: StoreAction,
        /// Silent mode (no FETCH response).
        silent: bool,
        /// Use UIDs.
        uid: bool,
    },
}

impl Command {
    /// Returns the minimum connection state the command requires.
    #[must_use]
    pub const fn min_state(&self) -> ConnState {
        match self {
            Self::Capability
            | Self::Noop
            | Self::Logout
            | Self::StartTls
            | Self::Login { .. }
            | Self::Authenticate { .. }
            | Self::Done => ConnState::NotAuthenticated,
            Self::Enable { .. }
            | Self::Select { .. }
            | Self::Examine { .. }
            | Self::Create { .. }
            | Self::Delete { .. }
            | Self::List { .. }
            | Self::Status { .. }
            | Self::Append { .. }
            | Self::SetAcl { .. }
            | Self::DeleteAcl { .. }
            | Self::GetAcl { .. }
            | Self::MyRights { .. }
            | Self::Idle => ConnState::Authenticated,
            Self::Close
            | Self::Unselect
            | Self::Expunge
            | Self::UidExpunge { .. }
            | Self::Search { .. }
            | Self::Fetch { .. }
            | Self::Store { .. } => ConnState::Selected,
        }
    }

    /// Returns the command name, as used in logs and completion text.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Enable { .. } => "ENABLE",
            Self::Select { .. } => "SELECT",
            Self::Examine { .. } => "EXAMINE",
            Self::Create { .. } => "CREATE",
            Self::Delete { .. } => "DELETE",
            Self::List { .. } => "LIST",
            Self::Status { .. } => "STATUS",
            Self::Append { .. } => "APPEND",
            Self::SetAcl { .. } => "SETACL",
            Self::DeleteAcl { .. } => "DELETEACL",
            Self::GetAcl { .. } => "GETACL",
            Self::MyRights { .. } => "MYRIGHTS",
            Self::Idle => "IDLE",
            Self::Done => "DONE",
            Self::Close => "CLOSE",
            Self::Unselect => "UNSELECT",
            Self::Expunge => "EXPUNGE",
            Self::UidExpunge { .. } => "UID EXPUNGE",
            Self::Search { uid: false, .. } => "SEARCH",
            Self::Search { uid: true, .. } => "UID SEARCH",
            Self::Fetch { uid: false, .. } => "FETCH",
            Self::Fetch { uid: true, .. } => "UID FETCH",
            Self::Store { uid: false, .. } => "STORE",
            Self::Store { uid: true, .. } => "UID STORE",
        }
    }

    /// Encodes the command with the given tag.
    #[must_use]
    pub fn encode(&self, tag: &Tag, mode: LiteralMode, utf8: bool) -> Encoded {
        let mut enc = Encoder::new(mode).utf8(utf8);
        self.serialize(tag, &mut enc);
        enc.finish()
    }

    /// Serializes the command, including the trailing CRLF.
    #[allow(clippy::too_many_lines)]
    pub fn serialize(&self, tag: &Tag, enc: &mut Encoder) {
        // DONE doesn't get a tag (it's sent during IDLE)
        if !matches!(self, Self::Done) {
            enc.atom(tag.as_str()).sp();
        }

        match self {
            Self::Capability
            | Self::Noop
            | Self::Logout
            | Self::StartTls
            | Self::Idle
            | Self::Done
            | Self::Close
            | Self::Unselect
            | Self::Expunge => {
                enc.atom(self.name());
            }

            Self::Login { username, password } => {
                enc.atom("LOGIN ").astring(username).sp().astring(password);
            }

            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                enc.atom("AUTHENTICATE ").atom(mechanism);
                if let Some(resp) = initial_response {
                    enc.sp();
                    if resp.is_empty() {
                        enc.atom("=");
                    } else {
                        enc.atom(&BASE64.encode(resp));
                    }
                }
            }

            Self::Enable { capabilities } => {
                enc.atom("ENABLE");
                for cap in capabilities {
                    enc.sp().atom(&cap.to_string());
                }
            }

            Self::Select { mailbox }
            | Self::Examine { mailbox }
            | Self::Create { mailbox }
            | Self::Delete { mailbox }
            | Self::GetAcl { mailbox }
            | Self::MyRights { mailbox } => {
                enc.atom(self.name()).sp().mailbox(mailbox.as_str());
            }

            Self::List {
                reference,
                pattern,
                return_status,
            } => {
                enc.atom("LIST ").mailbox(reference).sp();
                write_list_pattern(enc, pattern);
                if !return_status.is_empty() {
                    enc.atom(" RETURN (STATUS ").list(return_status, |e, item| {
                        e.atom(item.as_str());
                    });
                    enc.raw(b")");
                }
            }

            Self::Status { mailbox, items } => {
                enc.atom("STATUS ").mailbox(mailbox.as_str()).sp();
                enc.list(items, |e, item| {
                    e.atom(item.as_str());
                });
            }

            Self::Append {
                mailbox,
                options,
                message,
            } => {
                enc.atom("APPEND ").mailbox(mailbox.as_str());
                if !options.flags.is_empty() {
                    enc.sp();
                    write_flags(enc, &options.flags);
                }
                if let Some(date) = &options.date {
                    enc.sp().quoted(&crate::types::datetime::format_date_time(date));
                }
                enc.sp().literal(message);
            }

            Self::SetAcl {
                mailbox,
                identifier,
                modification,
                rights,
            } => {
                enc.atom("SETACL ")
                    .mailbox(mailbox.as_str())
                    .sp()
                    .astring(identifier)
                    .sp()
                    .astring(&format_rights(*modification, rights));
            }

            Self::DeleteAcl {
                mailbox,
                identifier,
            } => {
                enc.atom("DELETEACL ")
                    .mailbox(mailbox.as_str())
                    .sp()
                    .astring(identifier);
            }

            Self::UidExpunge { uids } => {
                enc.atom("UID EXPUNGE ").number(uids);
            }

            Self::Search {
                criteria,
                returns,
                uid: _,
            } => {
                enc.atom(self.name()).sp();
                if let Some(returns) = returns {
                    write_search_return(enc, returns);
                    enc.sp();
                }
                write_search_criteria(enc, criteria);
            }

            Self::Fetch {
                sequence,
                items,
                uid: _,
            } => {
                enc.atom(self.name()).sp().number(sequence).sp();
                write_fetch_items(enc, items);
            }

            Self::Store {
                sequence,
                action,
                silent,
                uid: _,
            } => {
                enc.atom(self.name()).sp().number(sequence).sp();
                write_store_action(enc, action, *silent);
            }
        }

        enc.crlf();
    }
}

/// LIST patterns keep their wildcards bare when they are otherwise atoms.
fn write_list_pattern(enc: &mut Encoder, pattern: &str) {
    let bare = pattern
        .split(['%', '*'])
        .all(|part| part.is_empty() || crate::parser::lexer::is_atom(part));
    if bare && !pattern.is_empty() && pattern.is_ascii() && !pattern.contains('&') {
        enc.atom(pattern);
    } else {
        enc.mailbox(pattern);
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
    use chrono::NaiveDate;

    use super::*;
    use crate::types::Flag;

    fn wire(cmd: &Command) -> String {
        let bytes = cmd
            .encode(&Tag::new("A001"), LiteralMode::Synchronizing, false)
            .to_vec();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(wire(&Command::Capability), "A001 CAPABILITY\r\n");
        assert_eq!(wire(&Command::Noop), "A001 NOOP\r\n");
        assert_eq!(wire(&Command::Idle), "A001 IDLE\r\n");
        assert_eq!(wire(&Command::Done), "DONE\r\n");
    }

    #[test]
    fn test_login_quotes_when_needed() {
        let cmd = Command::Login {
            username: "test-user".into(),
            password: "pass word".into(),
        };
        assert_eq!(wire(&cmd), "A001 LOGIN test-user \"pass word\"\r\n");
    }

    #[test]
    fn test_authenticate_initial_response() {
        let cmd = Command::Authenticate {
            mechanism: "PLAIN".into(),
            initial_response: Some(b"\0user\0pass".to_vec()),
        };
        assert_eq!(wire(&cmd), "A001 AUTHENTICATE PLAIN AHVzZXIAcGFzcw==\r\n");

        let cmd = Command::Authenticate {
            mechanism: "PLAIN".into(),
            initial_response: Some(Vec::new()),
        };
        assert_eq!(wire(&cmd), "A001 AUTHENTICATE PLAIN =\r\n");
    }

    #[test]
    fn test_mailbox_encoding() {
        let cmd = Command::Create {
            mailbox: Mailbox::new("Cafè"),
        };
        assert_eq!(wire(&cmd), "A001 CREATE Caf&AOg-\r\n");

        let utf8 = cmd
            .encode(&Tag::new("A001"), LiteralMode::Synchronizing, true)
            .to_vec();
        assert_eq!(utf8, "A001 CREATE \"Cafè\"\r\n".as_bytes());
    }

    #[test]
    fn test_list_with_status() {
        let cmd = Command::List {
            reference: String::new(),
            pattern: "%".into(),
            return_status: vec![StatusItem::Messages, StatusItem::Unseen],
        };
        assert_eq!(
            wire(&cmd),
            "A001 LIST \"\" % RETURN (STATUS (MESSAGES UNSEEN))\r\n"
        );
    }

    #[test]
    fn test_append_splits_on_literal() {
        let cmd = Command::Append {
            mailbox: Mailbox::inbox(),
            options: AppendOptions {
                flags: vec![Flag::Seen],
                date: None,
            },
            message: b"Hi".to_vec(),
        };
        let out = cmd.encode(&Tag::new("A001"), LiteralMode::Synchronizing, false);
        assert_eq!(out.chunks().len(), 2);
        assert_eq!(out.chunks()[0], b"A001 APPEND INBOX (\\Seen) {2}\r\n");
        assert_eq!(out.chunks()[1], b"Hi\r\n");

        let out = cmd.encode(&Tag::new("A001"), LiteralMode::NonSynchronizing, false);
        assert_eq!(out.to_vec(), b"A001 APPEND INBOX (\\Seen) {2+}\r\nHi\r\n");
    }

    #[test]
    fn test_fetch_and_store() {
        let cmd = Command::Fetch {
            sequence: SequenceSet::range(1, 3).unwrap(),
            items: FetchItems::Items(vec![
                FetchAttribute::Uid,
                FetchAttribute::Body {
                    section: BodySection::of(SectionSpecifier::HeaderFields(vec![
                        "Message-Id".into(),
                    ])),
                    peek: true,
                    partial: Some((0, 100)),
                },
            ]),
            uid: true,
        };
        assert_eq!(
            wire(&cmd),
            "A001 UID FETCH 1:3 (UID BODY.PEEK[HEADER.FIELDS (Message-Id)]<0.100>)\r\n"
        );

        let cmd = Command::Store {
            sequence: SequenceSet::single(1).unwrap(),
            action: StoreAction::AddFlags(vec![Flag::Deleted]),
            silent: true,
            uid: false,
        };
        assert_eq!(wire(&cmd), "A001 STORE 1 +FLAGS.SILENT (\\Deleted)\r\n");
    }

    #[test]
    fn test_search_serialization() {
        let cmd = Command::Search {
            criteria: SearchCriteria::And(vec![
                SearchCriteria::Header("Message-Id".into(), "<1@example.com>".into()),
                SearchCriteria::or(
                    SearchCriteria::Since(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()),
                    SearchCriteria::And(vec![SearchCriteria::Seen, SearchCriteria::Larger(10)]),
                ),
            ]),
            returns: Some(vec![SearchReturn::Count]),
            uid: false,
        };
        assert_eq!(
            wire(&cmd),
            "A001 SEARCH RETURN (COUNT) HEADER Message-Id <1@example.com> \
             OR SINCE 05-Jan-2024 (SEEN LARGER 10)\r\n"
        );
    }

    #[test]
    fn test_acl_commands() {
        let cmd = Command::SetAcl {
            mailbox: Mailbox::new("MyFolder"),
            identifier: "test-user".into(),
            modification: RightModification::Add,
            rights: RightSet::from("rwi"),
        };
        assert_eq!(wire(&cmd), "A001 SETACL MyFolder test-user +rwi\r\n");

        let cmd = Command::MyRights {
            mailbox: Mailbox::inbox(),
        };
        assert_eq!(wire(&cmd), "A001 MYRIGHTS INBOX\r\n");
    }

    #[test]
    fn test_min_state() {
        assert_eq!(Command::Noop.min_state(), ConnState::NotAuthenticated);
        assert_eq!(Command::Idle.min_state(), ConnState::Authenticated);
        assert_eq!(Command::Expunge.min_state(), ConnState::Selected);
    }
}
