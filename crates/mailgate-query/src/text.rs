//! Text-match algebra shared by address-book filters and mailbox search.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// How a text-match clause compares its text against a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MatchType {
    /// Whole-value equality.
    Equals,
    /// Substring match.
    #[default]
    Contains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
}

impl MatchType {
    /// Returns the protocol token for this match type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::StartsWith => "starts-with",
            Self::EndsWith => "ends-with",
        }
    }
}

impl FromStr for MatchType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "equals" => Ok(Self::Equals),
            "" | "contains" => Ok(Self::Contains),
            "starts-with" => Ok(Self::StartsWith),
            "ends-with" => Ok(Self::EndsWith),
            _ => Err(FilterError::UnknownMatchType(s.to_string())),
        }
    }
}

/// Combinator deciding whether all or any sub-tests must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FilterTest {
    /// At least one sub-test must hold.
    #[default]
    AnyOf,
    /// Every sub-test must hold.
    AllOf,
}

impl FilterTest {
    /// Returns the protocol token for this combinator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AnyOf => "anyof",
            Self::AllOf => "allof",
        }
    }

    /// Folds a sequence of test outcomes, short-circuiting where possible.
    pub fn combine<I>(self, outcomes: I) -> bool
    where
        I: IntoIterator<Item = bool>,
    {
        let mut outcomes = outcomes.into_iter();
        match self {
            Self::AnyOf => outcomes.any(|ok| ok),
            Self::AllOf => outcomes.all(|ok| ok),
        }
    }
}

impl FromStr for FilterTest {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "anyof" => Ok(Self::AnyOf),
            "allof" => Ok(Self::AllOf),
            _ => Err(FilterError::UnknownFilterTest(s.to_string())),
        }
    }
}

/// Comparison collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Collation {
    /// Byte-wise comparison.
    Octet,
    /// Case-insensitive comparison after Unicode case mapping.
    #[default]
    UnicodeCasemap,
}

impl Collation {
    /// Returns the collation identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Octet => "i;octet",
            Self::UnicodeCasemap => "i;unicode-casemap",
        }
    }

    fn fold(self, s: &str) -> String {
        match self {
            Self::Octet => s.to_string(),
            Self::UnicodeCasemap => s.to_lowercase(),
        }
    }
}

impl FromStr for Collation {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i;octet" => Ok(Self::Octet),
            "" | "i;unicode-casemap" | "i;ascii-casemap" => Ok(Self::UnicodeCasemap),
            _ => Err(FilterError::UnknownCollation(s.to_string())),
        }
    }
}

macro_rules! token_conversions {
    ($($ty:ty),*) => {
        $(
            impl TryFrom<String> for $ty {
                type Error = FilterError;

                fn try_from(s: String) -> Result<Self, Self::Error> {
                    s.parse()
                }
            }

            impl From<$ty> for String {
                fn from(value: $ty) -> Self {
                    value.as_str().to_string()
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

token_conversions!(MatchType, FilterTest, Collation);

/// A single text-match clause.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextMatch {
    /// Text to look for.
    pub text: String,
    /// Comparison kind.
    pub match_type: MatchType,
    /// Inverts the outcome.
    pub negate: bool,
    /// Collation used before comparing.
    pub collation: Collation,
}

impl TextMatch {
    /// Creates a case-insensitive substring clause.
    #[must_use]
    pub fn contains(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Creates a clause with the given match type and default collation.
    #[must_use]
    pub fn new(text: impl Into<String>, match_type: MatchType) -> Self {
        Self {
            text: text.into(),
            match_type,
            ..Self::default()
        }
    }

    /// Returns this clause with its outcome inverted.
    #[must_use]
    pub const fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Returns this clause with a different collation.
    #[must_use]
    pub const fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }

    /// Tests a value against this clause.
    ///
    /// An empty text matches every value for `contains`, `starts-with` and
    /// `ends-with`.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        let needle = self.collation.fold(&self.text);
        let haystack = self.collation.fold(value);
        let hit = match self.match_type {
            MatchType::Equals => haystack == needle,
            MatchType::Contains => haystack.contains(&needle),
            MatchType::StartsWith => haystack.starts_with(&needle),
            MatchType::EndsWith => haystack.ends_with(&needle),
        };
        hit != self.negate
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_match_types() {
        assert!(TextMatch::contains("EXAMPLE").matches("alice@example.com"));
        assert!(TextMatch::new("alice@", MatchType::StartsWith).matches("alice@example.com"));
        assert!(TextMatch::new("com", MatchType::EndsWith).matches("alice@example.com"));
        assert!(!TextMatch::new(".org", MatchType::EndsWith).matches("alice@example.com"));
        assert!(!TextMatch::new("example.com", MatchType::Equals).matches("alice@example.com"));
    }

    #[test]
    fn test_negate() {
        let m = TextMatch::new("bob@example.com", MatchType::Equals).negated();
        assert!(m.matches("alice@example.com"));
        assert!(!m.matches("BOB@example.com"));
    }

    #[test]
    fn test_octet_collation_is_case_sensitive() {
        let m = TextMatch::contains("Alice").with_collation(Collation::Octet);
        assert!(m.matches("Alice Gopher"));
        assert!(!m.matches("alice gopher"));
    }

    #[test]
    fn test_empty_text_matches_everything() {
        assert!(TextMatch::contains("").matches(""));
        assert!(TextMatch::contains("").matches("anything"));
    }

    #[test]
    fn test_token_parsing() {
        assert_eq!("allof".parse::<FilterTest>().unwrap(), FilterTest::AllOf);
        assert_eq!("".parse::<FilterTest>().unwrap(), FilterTest::AnyOf);
        assert_eq!("starts-with".parse::<MatchType>().unwrap(), MatchType::StartsWith);
        assert_eq!("i;octet".parse::<Collation>().unwrap(), Collation::Octet);

        let err = "XXX-invalid-filter".parse::<FilterTest>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown query filter test \"XXX-invalid-filter\""
        );
        assert!(matches!(
            "fuzzy".parse::<MatchType>(),
            Err(FilterError::UnknownMatchType(_))
        ));
    }

    #[test]
    fn test_combine() {
        assert!(FilterTest::AnyOf.combine([false, true]));
        assert!(!FilterTest::AnyOf.combine(std::iter::empty()));
        assert!(FilterTest::AllOf.combine(std::iter::empty()));
        assert!(!FilterTest::AllOf.combine([true, false]));
    }
}
