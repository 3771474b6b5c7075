//! Command-related type definitions.

use chrono::NaiveDate;

use crate::types::{Flag, SequenceSet};

/// FETCH items to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItems {
    /// Fetch fast (equivalent to FLAGS INTERNALDATE RFC822.SIZE).
    Fast,
    /// Custom list of items.
    Items(Vec<FetchAttribute>),
}

impl FetchItems {
    /// Expands macros into the attribute list.
    #[must_use]
    pub fn attributes(&self) -> Vec<FetchAttribute> {
        match self {
            Self::Fast => vec![
                FetchAttribute::Flags,
                FetchAttribute::InternalDate,
                FetchAttribute::Rfc822Size,
            ],
            Self::Items(items) => items.clone(),
        }
    }
}

/// Individual FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// Message flags.
    Flags,
    /// Internal date.
    InternalDate,
    /// RFC822 size.
    Rfc822Size,
    /// UID.
    Uid,
    /// Body section.
    Body {
        /// Section specifier.
        section: BodySection,
        /// Peek (don't set \Seen).
        peek: bool,
        /// Partial fetch range: origin and maximum length.
        partial: Option<(u32, u32)>,
    },
}

impl FetchAttribute {
    /// Whole message body, optionally without setting `\Seen`.
    #[must_use]
    pub const fn full_body(peek: bool) -> Self {
        Self::Body {
            section: BodySection::full(),
            peek,
            partial: None,
        }
    }
}

/// Body section specifier, e.g. `[]`, `[HEADER]`, `[1]` or
/// `[HEADER.FIELDS (Subject)]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodySection {
    /// MIME part path; empty for the whole message.
    pub part: Vec<u32>,
    /// Which part of the addressed entity.
    pub specifier: SectionSpecifier,
}

impl BodySection {
    /// The whole message.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            part: Vec::new(),
            specifier: SectionSpecifier::Full,
        }
    }

    /// A section with only a specifier.
    #[must_use]
    pub const fn of(specifier: SectionSpecifier) -> Self {
        Self {
            part: Vec::new(),
            specifier,
        }
    }
}

impl std::fmt::Display for BodySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let part: Vec<String> = self.part.iter().map(u32::to_string).collect();
        let part = part.join(".");
        let spec = match &self.specifier {
            SectionSpecifier::Full => String::new(),
            SectionSpecifier::Header => "HEADER".to_string(),
            SectionSpecifier::Text => "TEXT".to_string(),
            SectionSpecifier::Mime => "MIME".to_string(),
            SectionSpecifier::HeaderFields(fields) => {
                format!("HEADER.FIELDS ({})", fields.join(" "))
            }
            SectionSpecifier::HeaderFieldsNot(fields) => {
                format!("HEADER.FIELDS.NOT ({})", fields.join(" "))
            }
        };
        match (part.is_empty(), spec.is_empty()) {
            (true, _) => f.write_str(&spec),
            (false, true) => f.write_str(&part),
            (false, false) => write!(f, "{part}.{spec}"),
        }
    }
}

/// Section text after the part path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SectionSpecifier {
    /// Everything.
    #[default]
    Full,
    /// The header, including the blank line.
    Header,
    /// The body after the header.
    Text,
    /// MIME header of a part.
    Mime,
    /// Only the named header fields.
    HeaderFields(Vec<String>),
    /// All header fields except the named ones.
    HeaderFieldsNot(Vec<String>),
}

/// STORE action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Replace flags.
    SetFlags(Vec<Flag>),
    /// Add flags.
    AddFlags(Vec<Flag>),
    /// Remove flags.
    RemoveFlags(Vec<Flag>),
}

impl StoreAction {
    /// Returns the flags carried by the action.
    #[must_use]
    pub fn flags(&self) -> &[Flag] {
        match self {
            Self::SetFlags(f) | Self::AddFlags(f) | Self::RemoveFlags(f) => f,
        }
    }

    pub(crate) const fn item_name(&self) -> &'static str {
        match self {
            Self::SetFlags(_) => "FLAGS",
            Self::AddFlags(_) => "+FLAGS",
            Self::RemoveFlags(_) => "-FLAGS",
        }
    }
}

/// ESEARCH result options (`RETURN (...)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchReturn {
    /// Lowest matching number.
    Min,
    /// Highest matching number.
    Max,
    /// All matches as a sequence set.
    All,
    /// Number of matches.
    Count,
}

impl SearchReturn {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::All => "ALL",
            Self::Count => "COUNT",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_uppercase().as_str() {
            "MIN" => Self::Min,
            "MAX" => Self::Max,
            "ALL" => Self::All,
            "COUNT" => Self::Count,
            _ => return None,
        })
    }
}

/// SEARCH criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// All messages.
    All,
    /// Messages with \Answered flag.
    Answered,
    /// Messages with \Deleted flag.
    Deleted,
    /// Messages with \Draft flag.
    Draft,
    /// Messages with \Flagged flag.
    Flagged,
    /// Messages with \Seen flag.
    Seen,
    /// Messages without \Answered flag.
    Unanswered,
    /// Messages without \Deleted flag.
    Undeleted,
    /// Messages without \Draft flag.
    Undraft,
    /// Messages without \Flagged flag.
    Unflagged,
    /// Messages without \Seen flag.
    Unseen,
    /// Messages with the keyword.
    Keyword(String),
    /// Messages without the keyword.
    Unkeyword(String),
    /// Sequence number set.
    SequenceSet(SequenceSet),
    /// UID set.
    Uid(SequenceSet),
    /// Subject contains text.
    Subject(String),
    /// From contains text.
    From(String),
    /// To contains text.
    To(String),
    /// Body contains text.
    Body(String),
    /// Text in header or body.
    Text(String),
    /// Internal date on or after the day.
    Since(NaiveDate),
    /// Internal date before the day.
    Before(NaiveDate),
    /// Internal date within the day.
    On(NaiveDate),
    /// Larger than size.
    Larger(u64),
    /// Smaller than size.
    Smaller(u64),
    /// Header field contains value.
    Header(String, String),
    /// AND of criteria.
    And(Vec<Self>),
    /// OR of criteria.
    Or(Box<Self>, Box<Self>),
    /// NOT of criteria.
    Not(Box<Self>),
}

impl SearchCriteria {
    /// Builds an OR.
    #[must_use]
    pub fn or(a: Self, b: Self) -> Self {
        Self::Or(Box::new(a), Box::new(b))
    }

    /// Builds a NOT.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(c: Self) -> Self {
        Self::Not(Box::new(c))
    }

    /// Returns true if evaluation depends on sequence numbers.
    ///
    /// Such searches must not see EXPUNGE responses in the middle.
    #[must_use]
    pub fn uses_sequence_numbers(&self) -> bool {
        match self {
            Self::SequenceSet(_) => true,
            Self::And(all) => all.iter().any(Self::uses_sequence_numbers),
            Self::Or(a, b) => a.uses_sequence_numbers() || b.uses_sequence_numbers(),
            Self::Not(c) => c.uses_sequence_numbers(),
            _ => false,
        }
    }
}

/// Options for APPEND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendOptions {
    /// Flags to set on the new message.
    pub flags: Vec<Flag>,
    /// Internal date; the server uses the current time when absent.
    pub date: Option<chrono::DateTime<chrono::FixedOffset>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_display() {
        assert_eq!(BodySection::full().to_string(), "");
        assert_eq!(BodySection::of(SectionSpecifier::Header).to_string(), "HEADER");
        let part = BodySection {
            part: vec![1, 2],
            specifier: SectionSpecifier::Full,
        };
        assert_eq!(part.to_string(), "1.2");
        let fields = BodySection {
            part: vec![1],
            specifier: SectionSpecifier::HeaderFields(vec!["Subject".into(), "From".into()]),
        };
        assert_eq!(fields.to_string(), "1.HEADER.FIELDS (Subject From)");
    }

    #[test]
    fn fast_expands() {
        assert_eq!(FetchItems::Fast.attributes().len(), 3);
    }

    #[test]
    fn sequence_number_dependence() {
        let seq = SearchCriteria::SequenceSet(SequenceSet::All);
        assert!(seq.uses_sequence_numbers());
        assert!(SearchCriteria::not(seq.clone()).uses_sequence_numbers());
        assert!(!SearchCriteria::Uid(SequenceSet::All).uses_sequence_numbers());
        assert!(
            SearchCriteria::or(SearchCriteria::Seen, SearchCriteria::And(vec![seq]))
                .uses_sequence_numbers()
        );
    }
}
