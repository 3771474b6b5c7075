//! Message flags.

/// Message flags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message is a draft.
    Draft,
    /// Message is recent (`IMAP4rev1` only).
    Recent,
    /// `\*` in PERMANENTFLAGS: new keywords may be created.
    Wildcard,
    /// Custom keyword flag.
    Keyword(String),
}

impl Flag {
    /// Parses a flag string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\SEEN" => Self::Seen,
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\DRAFT" => Self::Draft,
            "\\RECENT" => Self::Recent,
            "\\*" => Self::Wildcard,
            _ => Self::Keyword(s.to_string()),
        }
    }

    /// Returns the flag as an IMAP string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Wildcard => "\\*",
            Self::Keyword(s) => s,
        }
    }

    /// Returns true if a client may store this flag on a message.
    #[must_use]
    pub fn is_storable(&self) -> bool {
        match self {
            Self::Recent | Self::Wildcard => false,
            Self::Keyword(k) => !k.is_empty() && !k.starts_with('\\'),
            _ => true,
        }
    }

    /// The flags a mailbox reports in its FLAGS response.
    #[must_use]
    pub fn system() -> [Self; 5] {
        [
            Self::Answered,
            Self::Flagged,
            Self::Deleted,
            Self::Seen,
            Self::Draft,
        ]
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Collection of message flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    flags: Vec<Flag>,
}

impl Flags {
    /// Creates an empty flags collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates flags from a vector, dropping duplicates.
    #[must_use]
    pub fn from_vec(flags: Vec<Flag>) -> Self {
        flags.into_iter().collect()
    }

    /// Adds a flag.
    pub fn insert(&mut self, flag: Flag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    /// Removes a flag.
    pub fn remove(&mut self, flag: &Flag) {
        self.flags.retain(|f| f != flag);
    }

    /// Returns true if the flag is present.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// Returns true if the message has been seen.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.contains(&Flag::Seen)
    }

    /// Returns true if the message is marked for deletion.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.contains(&Flag::Deleted)
    }

    /// Returns true if the keyword is present, compared case-insensitively.
    #[must_use]
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.flags
            .iter()
            .any(|f| matches!(f, Flag::Keyword(k) if k.eq_ignore_ascii_case(keyword)))
    }

    /// Returns an iterator over the flags.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    /// Returns the number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if there are no flags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Returns true if both collections hold the same flags in any order.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|f| other.contains(f))
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        let mut flags = Self::new();
        for flag in iter {
            flags.insert(flag);
        }
        flags
    }
}

impl IntoIterator for Flags {
    type Item = Flag;
    type IntoIter = std::vec::IntoIter<Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.into_iter()
    }
}

impl<'a> IntoIterator for &'a Flags {
    type Item = &'a Flag;
    type IntoIter = std::slice::Iter<'a, Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;

    mod flag_tests {
        use super::*;

        #[test]
        fn parse_system_flags() {
            assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
            assert_eq!(Flag::parse("\\FLAGGED"), Flag::Flagged);
            assert_eq!(Flag::parse("\\deleted"), Flag::Deleted);
            assert_eq!(Flag::parse("\\*"), Flag::Wildcard);
        }

        #[test]
        fn parse_keyword() {
            assert_eq!(Flag::parse("$Forwarded"), Flag::Keyword("$Forwarded".into()));
            assert_eq!(Flag::parse("$Forwarded").as_str(), "$Forwarded");
        }

        #[test]
        fn storable() {
            assert!(Flag::Seen.is_storable());
            assert!(Flag::Keyword("$Junk".into()).is_storable());
            assert!(!Flag::Recent.is_storable());
            assert!(!Flag::Wildcard.is_storable());
            assert!(!Flag::Keyword("\\Bogus".into()).is_storable());
        }
    }

    mod flags_tests {
        use super::*;

        #[test]
        fn insert_remove() {
            let mut flags = Flags::new();
            assert!(flags.is_empty());
            flags.insert(Flag::Seen);
            flags.insert(Flag::Seen);
            assert_eq!(flags.len(), 1);
            assert!(flags.is_seen());
            flags.remove(&Flag::Seen);
            assert!(!flags.is_seen());
        }

        #[test]
        fn from_vec_dedups() {
            let flags = Flags::from_vec(vec![Flag::Deleted, Flag::Seen, Flag::Deleted]);
            assert_eq!(flags.len(), 2);
            assert!(flags.is_deleted());
        }

        #[test]
        fn keyword_lookup_ignores_case() {
            let flags: Flags = [Flag::Keyword("$Label1".into())].into_iter().collect();
            assert!(flags.has_keyword("$label1"));
            assert!(!flags.has_keyword("$label2"));
        }

        #[test]
        fn same_as_ignores_order() {
            let a = Flags::from_vec(vec![Flag::Seen, Flag::Draft]);
            let b = Flags::from_vec(vec![Flag::Draft, Flag::Seen]);
            assert!(a.same_as(&b));
            assert!(!a.same_as(&Flags::from_vec(vec![Flag::Seen])));
        }
    }
}
