//! Core IMAP identifiers.
//!
//! Types for tags, sequence numbers, UIDs, and UIDVALIDITY.

use std::num::NonZeroU32;

/// IMAP command tag.
///
/// Tags are alphanumeric prefixes that identify commands and their responses.
/// Each command sent by the client has a unique tag, and the server's response
/// includes the same tag to correlate request and response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub String);

impl Tag {
    /// Creates a new tag from a string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the tag is a valid `tag` production: one or more
    /// ASTRING-CHARs other than `+`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| crate::parser::lexer::is_astring_char(b) && b != b'+')
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! nonzero_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub NonZeroU32);

        impl $name {
            /// The smallest value, 1.
            pub const MIN: Self = Self(NonZeroU32::MIN);

            /// Creates a new value.
            ///
            /// Returns `None` if the value is 0.
            #[must_use]
            pub fn new(n: u32) -> Option<Self> {
                NonZeroU32::new(n).map(Self)
            }

            /// Returns the underlying value.
            #[must_use]
            pub fn get(self) -> u32 {
                self.0.get()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

nonzero_id!(
    /// Message sequence number.
    ///
    /// Sequence numbers are assigned to messages in a mailbox starting from 1.
    /// They are ephemeral and change when messages are expunged.
    SeqNum
);

nonzero_id!(
    /// Unique identifier for a message.
    ///
    /// UIDs are persistent identifiers that don't change when messages are
    /// expunged. They are assigned in ascending order and never reused while
    /// the mailbox's `UIDVALIDITY` is unchanged.
    Uid
);

nonzero_id!(
    /// UIDVALIDITY value for a mailbox.
    ///
    /// If this value changes, all cached UIDs are invalid.
    UidValidity
);

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

    mod tag_tests {
        use super::*;

        #[test]
        fn new_and_display() {
            let tag = Tag::new("A001".to_string());
            assert_eq!(tag.as_str(), "A001");
            assert_eq!(format!("{tag}"), "A001");
        }

        #[test]
        fn validity() {
            assert!(Tag::new("A0001").is_valid());
            assert!(Tag::new("a.b-c]").is_valid());
            assert!(!Tag::new("").is_valid());
            assert!(!Tag::new("A+1").is_valid());
            assert!(!Tag::new("A 1").is_valid());
            assert!(!Tag::new("A*").is_valid());
        }
    }

    mod id_tests {
        use super::*;

        #[test]
        fn zero_is_rejected() {
            assert!(SeqNum::new(0).is_none());
            assert!(Uid::new(0).is_none());
            assert!(UidValidity::new(0).is_none());
        }

        #[test]
        fn round_trip_value() {
            assert_eq!(SeqNum::new(u32::MAX).unwrap().get(), u32::MAX);
            assert_eq!(Uid::new(12345).unwrap().to_string(), "12345");
            assert_eq!(UidValidity::new(987654321).unwrap().get(), 987654321);
        }

        #[test]
        fn ordering() {
            assert!(Uid::new(100).unwrap() < Uid::new(200).unwrap());
            assert!(SeqNum::new(1).unwrap() < SeqNum::new(2).unwrap());
        }
    }
}
