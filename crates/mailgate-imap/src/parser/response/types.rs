//! Response data types.

use chrono::{DateTime, FixedOffset};

use crate::command::BodySection;
use crate::types::{
    Capability, Flags, ListData, Mailbox, ResponseCode, RightSet, SeqNum, SequenceSet, Status,
    StatusData, Tag, Uid,
};

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Response status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text/data.
        text: Option<String>,
    },
}

impl Response {
    /// Builds a tagged completion.
    #[must_use]
    pub fn tagged(
        tag: Tag,
        status: Status,
        code: Option<ResponseCode>,
        text: impl Into<String>,
    ) -> Self {
        Self::Tagged {
            tag,
            status,
            code,
            text: text.into(),
        }
    }
}

/// FETCH response item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// Message flags.
    Flags(Flags),
    /// Internal date.
    InternalDate(DateTime<FixedOffset>),
    /// RFC822 size.
    Rfc822Size(u32),
    /// UID.
    Uid(Uid),
    /// BODY section.
    Body {
        /// Section specifier.
        section: BodySection,
        /// Origin offset of a partial fetch.
        origin: Option<u32>,
        /// Body data.
        data: Option<Vec<u8>>,
    },
}

/// One `* n FETCH (...)` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMessage {
    /// Message sequence number.
    pub seq: SeqNum,
    /// Fetch data items.
    pub items: Vec<FetchItem>,
}

impl FetchMessage {
    /// Returns the UID, if fetched.
    #[must_use]
    pub fn uid(&self) -> Option<Uid> {
        self.items.iter().find_map(|item| match item {
            FetchItem::Uid(uid) => Some(*uid),
            _ => None,
        })
    }

    /// Returns the flags, if fetched.
    #[must_use]
    pub fn flags(&self) -> Option<&Flags> {
        self.items.iter().find_map(|item| match item {
            FetchItem::Flags(flags) => Some(flags),
            _ => None,
        })
    }

    /// Returns the data of a body section.
    #[must_use]
    pub fn body(&self, section: &BodySection) -> Option<&[u8]> {
        self.items.iter().find_map(|item| match item {
            FetchItem::Body {
                section: s,
                data: Some(data),
                ..
            } if s == section => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Merges items from a later response for the same message.
    pub fn merge(&mut self, other: Self) {
        self.items.extend(other.items);
    }
}

/// Result of a SEARCH or ESEARCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchData {
    /// True if the numbers are UIDs.
    pub uid: bool,
    /// Lowest match.
    pub min: Option<u32>,
    /// Highest match.
    pub max: Option<u32>,
    /// All matches.
    pub all: SequenceSet,
    /// Number of matches.
    pub count: Option<u32>,
}

impl Default for SearchData {
    fn default() -> Self {
        Self {
            uid: false,
            min: None,
            max: None,
            all: SequenceSet::empty(),
            count: None,
        }
    }
}

impl SearchData {
    /// Builds a complete result from matching numbers.
    #[must_use]
    pub fn from_matches(uid: bool, numbers: &[u32]) -> Self {
        Self {
            uid,
            min: numbers.iter().copied().min(),
            max: numbers.iter().copied().max(),
            all: SequenceSet::from_numbers(numbers.iter().copied()),
            count: u32::try_from(numbers.len()).ok(),
        }
    }

    /// Returns the matches as a list.
    ///
    /// The list is empty when `all` uses `*` or is too large to enumerate;
    /// test membership on `all` instead.
    #[must_use]
    pub fn numbers(&self) -> Vec<u32> {
        self.all.numbers().unwrap_or_default()
    }
}

/// `* ACL` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclData {
    /// Mailbox name.
    pub mailbox: Mailbox,
    /// Identifier and rights pairs.
    pub entries: Vec<(String, RightSet)>,
}

impl AclData {
    /// Returns the rights for an identifier.
    #[must_use]
    pub fn rights(&self, identifier: &str) -> Option<&RightSet> {
        self.entries
            .iter()
            .find(|(id, _)| id == identifier)
            .map(|(_, rights)| rights)
    }
}

/// Untagged response data.
#[derive(Debug, Clone, PartialEq)]
pub enum UntaggedResponse {
    /// OK response with optional code.
    Ok {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// NO response.
    No {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BAD response.
    Bad {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// PREAUTH response.
    PreAuth {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BYE response.
    Bye {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// CAPABILITY response.
    Capability(Vec<Capability>),
    /// ENABLED response.
    Enabled(Vec<Capability>),
    /// LIST response.
    List(ListData),
    /// STATUS response.
    MailboxStatus(StatusData),
    /// FLAGS response.
    Flags(Flags),
    /// EXISTS response (message count).
    Exists(u32),
    /// RECENT response.
    Recent(u32),
    /// EXPUNGE response (message removed).
    Expunge(SeqNum),
    /// FETCH response.
    Fetch(FetchMessage),
    /// SEARCH response.
    Search(Vec<u32>),
    /// ESEARCH response.
    Esearch {
        /// Correlator of the command that asked.
        tag: Option<Tag>,
        /// Results.
        data: SearchData,
    },
    /// ACL response.
    Acl(AclData),
    /// MYRIGHTS response.
    MyRights {
        /// Mailbox name.
        mailbox: Mailbox,
        /// Rights of the current user.
        rights: RightSet,
    },
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
    use crate::types::Flag;

    #[test]
    fn fetch_message_accessors() {
        let msg = FetchMessage {
            seq: SeqNum::new(1).unwrap(),
            items: vec![
                FetchItem::Uid(Uid::new(42).unwrap()),
                FetchItem::Flags(Flags::from_vec(vec![Flag::Seen])),
                FetchItem::Body {
                    section: BodySection::full(),
                    origin: None,
                    data: Some(b"Hello".to_vec()),
                },
            ],
        };
        assert_eq!(msg.uid().unwrap().get(), 42);
        assert!(msg.flags().unwrap().is_seen());
        assert_eq!(msg.body(&BodySection::full()), Some(&b"Hello"[..]));
        assert_eq!(
            msg.body(&BodySection::of(crate::command::SectionSpecifier::Header)),
            None
        );
    }

    #[test]
    fn search_data_from_matches() {
        let data = SearchData::from_matches(true, &[5, 1, 2, 3]);
        assert_eq!(data.min, Some(1));
        assert_eq!(data.max, Some(5));
        assert_eq!(data.count, Some(4));
        assert_eq!(data.all.to_string(), "1:3,5");
        assert_eq!(data.numbers(), vec![1, 2, 3, 5]);

        let empty = SearchData::from_matches(false, &[]);
        assert_eq!(empty.count, Some(0));
        assert!(empty.numbers().is_empty());
    }

    #[test]
    fn acl_lookup() {
        let acl = AclData {
            mailbox: Mailbox::inbox(),
            entries: vec![("test-user".into(), RightSet::from("akxeilprwtscd"))],
        };
        assert_eq!(acl.rights("test-user"), Some(&RightSet::from("lrswipkxteacd")));
        assert!(acl.rights("anyone").is_none());
    }
}
