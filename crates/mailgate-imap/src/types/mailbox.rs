//! Mailbox types.

use super::{Flags, Uid, UidValidity};

/// Hierarchy delimiter used by mailgate mailboxes.
pub const DELIMITER: char = '/';

/// Mailbox name.
///
/// `INBOX` is case-insensitive; constructors normalize it so names compare
/// equal regardless of the case a client used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mailbox(pub String);

impl Mailbox {
    /// Creates a new mailbox name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("INBOX") {
            Self::inbox()
        } else {
            Self(name)
        }
    }

    /// The INBOX mailbox (case-insensitive per RFC).
    #[must_use]
    pub fn inbox() -> Self {
        Self("INBOX".to_string())
    }

    /// Returns true if this is INBOX.
    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.0 == "INBOX"
    }

    /// Returns the mailbox name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the parent mailbox name, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once(DELIMITER)
            .map(|(parent, _)| Self::new(parent))
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Mailbox {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Mailbox data reported by SELECT/EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectData {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Number of recent messages (`IMAP4rev1` servers only).
    pub recent: Option<u32>,
    /// Next UID to be assigned.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<UidValidity>,
    /// Flags defined for this mailbox.
    pub flags: Flags,
    /// Flags that can be permanently stored.
    pub permanent_flags: Flags,
    /// Whether mailbox is read-only.
    pub read_only: bool,
}

/// Attribute requested in a STATUS command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusItem {
    /// Number of messages.
    Messages,
    /// Next UID.
    UidNext,
    /// UIDVALIDITY value.
    UidValidity,
    /// Number of messages without `\Seen`.
    Unseen,
    /// Number of messages with `\Deleted`.
    Deleted,
    /// Total size of the mailbox in octets.
    Size,
    /// Number of recent messages (`IMAP4rev1`).
    Recent,
}

impl StatusItem {
    /// Returns the wire keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
            Self::Deleted => "DELETED",
            Self::Size => "SIZE",
            Self::Recent => "RECENT",
        }
    }

    /// Parses a wire keyword.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_uppercase().as_str() {
            "MESSAGES" => Self::Messages,
            "UIDNEXT" => Self::UidNext,
            "UIDVALIDITY" => Self::UidValidity,
            "UNSEEN" => Self::Unseen,
            "DELETED" => Self::Deleted,
            "SIZE" => Self::Size,
            "RECENT" => Self::Recent,
            _ => return None,
        })
    }
}

/// STATUS response data. Only requested items are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusData {
    /// Mailbox name.
    pub mailbox: Mailbox,
    /// Number of messages.
    pub messages: Option<u32>,
    /// Next UID.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<UidValidity>,
    /// Number of unseen messages.
    pub unseen: Option<u32>,
    /// Number of deleted messages.
    pub deleted: Option<u32>,
    /// Mailbox size in octets.
    pub size: Option<u64>,
    /// Number of recent messages.
    pub recent: Option<u32>,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::inbox()
    }
}

/// LIST response data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListData {
    /// Mailbox attributes.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter.
    pub delimiter: Option<char>,
    /// Mailbox name.
    pub mailbox: Mailbox,
    /// STATUS data returned by `LIST ... RETURN (STATUS ...)`.
    pub status: Option<StatusData>,
}

/// Mailbox attributes from LIST response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// Mailbox cannot be selected.
    NoSelect,
    /// Mailbox does not exist.
    NonExistent,
    /// Mailbox has no children.
    HasNoChildren,
    /// Mailbox has children.
    HasChildren,
    /// Mailbox is marked for attention.
    Marked,
    /// Mailbox is not marked.
    Unmarked,
    // SPECIAL-USE mailbox attributes (RFC 6154)
    /// All messages (virtual mailbox).
    All,
    /// Mailbox is the archive folder.
    Archive,
    /// Mailbox is the drafts folder.
    Drafts,
    /// Flagged/starred messages (virtual mailbox).
    Flagged,
    /// Mailbox is the junk/spam folder.
    Junk,
    /// Mailbox is the sent folder.
    Sent,
    /// Mailbox is the trash folder.
    Trash,
    // Other attributes
    /// Mailbox is subscribed.
    Subscribed,
    /// Unknown attribute.
    Unknown(String),
}

impl MailboxAttribute {
    /// Parses a mailbox attribute string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\NONEXISTENT" => Self::NonExistent,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\MARKED" => Self::Marked,
            "\\UNMARKED" => Self::Unmarked,
            // RFC 6154 SPECIAL-USE
            "\\ALL" => Self::All,
            "\\ARCHIVE" => Self::Archive,
            "\\DRAFTS" => Self::Drafts,
            "\\FLAGGED" => Self::Flagged,
            "\\JUNK" | "\\SPAM" => Self::Junk,
            "\\SENT" => Self::Sent,
            "\\TRASH" => Self::Trash,
            "\\SUBSCRIBED" => Self::Subscribed,
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Returns the attribute as an IMAP string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NoSelect => "\\Noselect",
            Self::NonExistent => "\\NonExistent",
            Self::HasNoChildren => "\\HasNoChildren",
            Self::HasChildren => "\\HasChildren",
            Self::Marked => "\\Marked",
            Self::Unmarked => "\\Unmarked",
            Self::All => "\\All",
            Self::Archive => "\\Archive",
            Self::Drafts => "\\Drafts",
            Self::Flagged => "\\Flagged",
            Self::Junk => "\\Junk",
            Self::Sent => "\\Sent",
            Self::Trash => "\\Trash",
            Self::Subscribed => "\\Subscribed",
            Self::Unknown(s) => s,
        }
    }

    /// Returns true for RFC 6154 special-use attributes.
    #[must_use]
    pub const fn is_special_use(&self) -> bool {
        matches!(
            self,
            Self::All
                | Self::Archive
                | Self::Drafts
                | Self::Flagged
                | Self::Junk
                | Self::Sent
                | Self::Trash
        )
    }
}

impl std::fmt::Display for MailboxAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matches a mailbox name against a LIST pattern.
///
/// `*` matches any run of characters, `%` any run without the hierarchy
/// delimiter. INBOX is matched case-insensitively.
#[must_use]
pub fn list_matches(pattern: &str, name: &str) -> bool {
    let name = if name.eq_ignore_ascii_case("INBOX") {
        "INBOX"
    } else {
        name
    };
    let pattern = if pattern.eq_ignore_ascii_case("INBOX") {
        "INBOX"
    } else {
        pattern
    };
    wildcard(pattern.as_bytes(), name.as_bytes())
}

fn wildcard(pattern: &[u8], name: &[u8]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((b'*', rest)) => (0..=name.len()).any(|i| wildcard(rest, &name[i..])),
        Some((b'%', rest)) => {
            let stop = name
                .iter()
                .position(|&c| c == DELIMITER as u8)
                .unwrap_or(name.len());
            (0..=stop).any(|i| wildcard(rest, &name[i..]))
        }
        Some((&c, rest)) => name.first() == Some(&c) && wildcard(rest, &name[1..]),
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

    mod mailbox_tests {
        use super::*;

        #[test]
        fn inbox_is_normalized() {
            assert_eq!(Mailbox::new("inbox"), Mailbox::inbox());
            assert!(Mailbox::new("InBoX").is_inbox());
            assert!(!Mailbox::new("INBOX/Sub").is_inbox());
        }

        #[test]
        fn parent() {
            assert_eq!(
                Mailbox::new("MyFolder/Child").parent(),
                Some(Mailbox::new("MyFolder"))
            );
            assert_eq!(Mailbox::new("MyFolder").parent(), None);
        }
    }

    mod attribute_tests {
        use super::*;

        #[test]
        fn parse_and_display() {
            assert_eq!(MailboxAttribute::parse("\\NoSelect"), MailboxAttribute::NoSelect);
            assert_eq!(MailboxAttribute::parse("\\Spam"), MailboxAttribute::Junk);
            assert_eq!(MailboxAttribute::Trash.to_string(), "\\Trash");
            assert_eq!(
                MailboxAttribute::parse("\\X-Custom"),
                MailboxAttribute::Unknown("\\X-Custom".into())
            );
            assert!(MailboxAttribute::Sent.is_special_use());
            assert!(!MailboxAttribute::HasChildren.is_special_use());
        }
    }

    mod status_item_tests {
        use super::*;

        #[test]
        fn parse() {
            assert_eq!(StatusItem::parse("messages"), Some(StatusItem::Messages));
            assert_eq!(StatusItem::parse("UIDNEXT"), Some(StatusItem::UidNext));
            assert_eq!(StatusItem::parse("HIGHESTMODSEQ"), None);
            assert_eq!(StatusItem::Unseen.as_str(), "UNSEEN");
        }
    }

    mod pattern_tests {
        use super::*;

        #[test]
        fn star_and_percent() {
            assert!(list_matches("*", "MyFolder/Child"));
            assert!(list_matches("%", "MyFolder"));
            assert!(!list_matches("%", "MyFolder/Child"));
            assert!(list_matches("MyFolder/%", "MyFolder/Child"));
            assert!(list_matches("My*", "MyFolder/Child"));
            assert!(!list_matches("Other*", "MyFolder"));
        }

        #[test]
        fn exact_and_inbox() {
            assert!(list_matches("Angus & Julia", "Angus & Julia"));
            assert!(list_matches("inbox", "INBOX"));
            assert!(!list_matches("Test", "Test mailbox"));
        }
    }
}
