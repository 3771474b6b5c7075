//! Access control rights (RFC 4314).

use std::fmt;

/// `l`: mailbox is visible to LIST.
pub const LOOKUP: char = 'l';
/// `r`: SELECT, FETCH, SEARCH.
pub const READ: char = 'r';
/// `s`: keep seen/unseen state.
pub const SEEN: char = 's';
/// `w`: write flags other than `\Seen` and `\Deleted`.
pub const WRITE: char = 'w';
/// `i`: APPEND and COPY into the mailbox.
pub const INSERT: char = 'i';
/// `p`: post to the submission address.
pub const POST: char = 'p';
/// `k`: create child mailboxes.
pub const CREATE_MAILBOX: char = 'k';
/// `x`: delete or rename the mailbox.
pub const DELETE_MAILBOX: char = 'x';
/// `t`: set or clear `\Deleted`.
pub const DELETE_MESSAGES: char = 't';
/// `e`: EXPUNGE.
pub const EXPUNGE: char = 'e';
/// `a`: administer the ACL.
pub const ADMIN: char = 'a';
/// Obsolete RFC 2086 `c` right.
pub const OBSOLETE_CREATE: char = 'c';
/// Obsolete RFC 2086 `d` right.
pub const OBSOLETE_DELETE: char = 'd';

/// Every standard RFC 4314 right, in canonical order.
pub const STANDARD_RIGHTS: &str = "lrswipkxtea";

/// How a SETACL command changes an identifier's rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RightModification {
    /// Rights become exactly the given set.
    #[default]
    Replace,
    /// Rights are added (`+` prefix).
    Add,
    /// Rights are removed (`-` prefix).
    Remove,
}

impl RightModification {
    /// Returns the wire prefix.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Replace => "",
            Self::Add => "+",
            Self::Remove => "-",
        }
    }
}

/// An unordered set of right characters.
///
/// Display order follows first insertion so a set built from `"akxeilprwtscd"`
/// prints back unchanged; equality ignores order. Characters outside the
/// standard alphabet are kept as-is.
#[derive(Debug, Clone, Default)]
pub struct RightSet {
    rights: Vec<char>,
}

impl RightSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { rights: Vec::new() }
    }

    /// Returns every standard right.
    #[must_use]
    pub fn all() -> Self {
        Self::from(STANDARD_RIGHTS)
    }

    /// Adds a right.
    pub fn insert(&mut self, right: char) {
        if !self.rights.contains(&right) {
            self.rights.push(right);
        }
    }

    /// Returns true if the right is present.
    #[must_use]
    pub fn contains(&self, right: char) -> bool {
        self.rights.contains(&right)
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rights.is_empty()
    }

    /// Returns the number of rights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rights.len()
    }

    /// Iterates rights in display order.
    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        self.rights.iter().copied()
    }

    /// Applies a modification and returns the resulting set.
    #[must_use]
    pub fn apply(&self, modification: RightModification, delta: &Self) -> Self {
        match modification {
            RightModification::Replace => delta.clone(),
            RightModification::Add => {
                let mut out = self.clone();
                delta.iter().for_each(|r| out.insert(r));
                out
            }
            RightModification::Remove => Self {
                rights: self.iter().filter(|r| !delta.contains(*r)).collect(),
            },
        }
    }
}

impl PartialEq for RightSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|r| other.contains(r))
    }
}

impl Eq for RightSet {}

impl From<&str> for RightSet {
    fn from(s: &str) -> Self {
        s.chars().collect()
    }
}

impl FromIterator<char> for RightSet {
    fn from_iter<I: IntoIterator<Item = char>>(iter: I) -> Self {
        let mut set = Self::new();
        for r in iter {
            set.insert(r);
        }
        set
    }
}

impl fmt::Display for RightSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.rights.iter().try_for_each(|r| write!(f, "{r}"))
    }
}

/// Formats a SETACL rights argument.
#[must_use]
pub fn format_rights(modification: RightModification, rights: &RightSet) -> String {
    format!("{}{rights}", modification.prefix())
}

/// Parses a SETACL rights argument such as `+rwi`.
#[must_use]
pub fn parse_rights(s: &str) -> (RightModification, RightSet) {
    if let Some(rest) = s.strip_prefix('+') {
        (RightModification::Add, RightSet::from(rest))
    } else if let Some(rest) = s.strip_prefix('-') {
        (RightModification::Remove, RightSet::from(rest))
    } else {
        (RightModification::Replace, RightSet::from(s))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn format_replace_round_trips() {
        let rights = RightSet::from("akxeilprwtscd");
        assert_eq!(
            format_rights(RightModification::Replace, &rights),
            "akxeilprwtscd"
        );
    }

    #[test]
    fn format_with_sign() {
        assert_eq!(
            format_rights(RightModification::Add, &RightSet::from("rwi")),
            "+rwi"
        );
        assert_eq!(
            format_rights(RightModification::Remove, &RightSet::from("iwc")),
            "-iwc"
        );
    }

    #[test]
    fn parse() {
        assert_eq!(
            parse_rights("+rwi"),
            (RightModification::Add, RightSet::from("irw"))
        );
        assert_eq!(
            parse_rights("-c"),
            (RightModification::Remove, RightSet::from("c"))
        );
        assert_eq!(
            parse_rights("ailw"),
            (RightModification::Replace, RightSet::from("wail"))
        );
    }

    #[test]
    fn apply_sequence() {
        let base = RightSet::from("ailw");
        let added = base.apply(RightModification::Add, &RightSet::from("rwi"));
        assert_eq!(added, RightSet::from("ailwr"));
        assert_eq!(added.to_string(), "ailwr");

        let removed = added.apply(RightModification::Remove, &RightSet::from("iwc"));
        assert_eq!(removed, RightSet::from("alr"));

        let replaced = removed.apply(RightModification::Replace, &RightSet::from("a"));
        assert_eq!(replaced, RightSet::from("a"));
    }

    #[test]
    fn equality_ignores_order_and_duplicates() {
        assert_eq!(RightSet::from("lr"), RightSet::from("rll"));
        assert_ne!(RightSet::from("lr"), RightSet::from("lrs"));
    }

    #[test]
    fn unknown_rights_are_kept() {
        let set = RightSet::from("lr9");
        assert!(set.contains('9'));
        assert_eq!(set.to_string(), "lr9");
    }

    fn rights() -> impl Strategy<Value = RightSet> {
        let standard: Vec<char> = STANDARD_RIGHTS.chars().collect();
        proptest::collection::vec(proptest::sample::select(standard), 0..11)
            .prop_map(|v| v.into_iter().collect())
    }

    proptest! {
        #[test]
        fn add_then_remove_drops_delta(r in rights(), d in rights()) {
            let out = r
                .apply(RightModification::Add, &d)
                .apply(RightModification::Remove, &d);
            let expected = r.apply(RightModification::Remove, &d);
            prop_assert_eq!(out, expected);
        }

        #[test]
        fn add_then_remove_of_new_rights_is_identity(r in rights(), d in rights()) {
            let fresh: RightSet = d.iter().filter(|c| !r.contains(*c)).collect();
            let out = r
                .apply(RightModification::Add, &fresh)
                .apply(RightModification::Remove, &fresh);
            prop_assert_eq!(out, r);
        }

        #[test]
        fn format_parse_round_trip(r in rights()) {
            for m in [RightModification::Replace, RightModification::Add, RightModification::Remove] {
                prop_assert_eq!(parse_rights(&format_rights(m, &r)), (m, r.clone()));
            }
        }
    }
}
