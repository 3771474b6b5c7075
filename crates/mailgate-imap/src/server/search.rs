//! SEARCH criteria evaluation.
//!
//! Text keys match case-insensitively on substrings, using the same
//! [`TextMatch`] clauses as the address-book query engine.

use chrono::{DateTime, FixedOffset, NaiveDate};
use mailgate_query::{Collation, TextMatch};

use super::message;
use crate::command::SearchCriteria;
use crate::types::{Flag, Flags};

/// A message as seen by the evaluator.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Sequence number in the searching view.
    pub seq: u32,
    /// UID.
    pub uid: u32,
    /// Highest sequence number in the view, the value of `*`.
    pub max_seq: u32,
    /// Highest UID in the view.
    pub max_uid: u32,
    /// Current flags.
    pub flags: &'a Flags,
    /// Internal date.
    pub date: DateTime<FixedOffset>,
    /// Raw message.
    pub raw: &'a [u8],
}

fn text_match(needle: &str) -> TextMatch {
    TextMatch::contains(needle).with_collation(Collation::UnicodeCasemap)
}

fn header_contains(raw: &[u8], name: &str, needle: &str) -> bool {
    let values = message::header_values(raw, name);
    // An empty value only asks for the field to be present
    if needle.is_empty() {
        return !values.is_empty();
    }
    let clause = text_match(needle);
    values.iter().any(|v| clause.matches(v))
}

fn body_contains(raw: &[u8], needle: &str) -> bool {
    let (_, body) = message::split(raw);
    text_match(needle).matches(&String::from_utf8_lossy(body))
}

fn day(date: &DateTime<FixedOffset>) -> NaiveDate {
    date.date_naive()
}

/// Returns true if the message satisfies the criteria.
#[must_use]
pub fn matches(criteria: &SearchCriteria, msg: &Candidate<'_>) -> bool {
    let flag = |f: &Flag| msg.flags.contains(f);
    match criteria {
        SearchCriteria::All => true,
        SearchCriteria::Answered => flag(&Flag::Answered),
        SearchCriteria::Deleted => flag(&Flag::Deleted),
        SearchCriteria::Draft => flag(&Flag::Draft),
        SearchCriteria::Flagged => flag(&Flag::Flagged),
        SearchCriteria::Seen => flag(&Flag::Seen),
        SearchCriteria::Unanswered => !flag(&Flag::Answered),
        SearchCriteria::Undeleted => !flag(&Flag::Deleted),
        SearchCriteria::Undraft => !flag(&Flag::Draft),
        SearchCriteria::Unflagged => !flag(&Flag::Flagged),
        SearchCriteria::Unseen => !flag(&Flag::Seen),
        SearchCriteria::Keyword(k) => msg.flags.has_keyword(k),
        SearchCriteria::Unkeyword(k) => !msg.flags.has_keyword(k),
        SearchCriteria::SequenceSet(set) => set.contains(msg.seq, msg.max_seq),
        SearchCriteria::Uid(set) => set.contains(msg.uid, msg.max_uid),
        SearchCriteria::Subject(s) => header_contains(msg.raw, "Subject", s),
        SearchCriteria::From(s) => header_contains(msg.raw, "From", s),
        SearchCriteria::To(s) => header_contains(msg.raw, "To", s),
        SearchCriteria::Header(name, value) => header_contains(msg.raw, name, value),
        SearchCriteria::Body(s) => body_contains(msg.raw, s),
        SearchCriteria::Text(s) => {
            text_match(s).matches(&String::from_utf8_lossy(msg.raw))
        }
        SearchCriteria::Since(d) => day(&msg.date) >= *d,
        SearchCriteria::Before(d) => day(&msg.date) < *d,
        SearchCriteria::On(d) => day(&msg.date) == *d,
        SearchCriteria::Larger(n) => msg.raw.len() as u64 > *n,
        SearchCriteria::Smaller(n) => (msg.raw.len() as u64) < *n,
        SearchCriteria::And(all) => all.iter().all(|c| matches(c, msg)),
        SearchCriteria::Or(a, b) => matches(a, msg) || matches(b, msg),
        SearchCriteria::Not(c) => !matches(c, msg),
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
    use crate::types::SequenceSet;

    const RAW: &[u8] = b"From: Alice <alice@example.com>\r\n\
To: bob@example.com\r\n\
Subject: Quarterly Report\r\n\
Message-Id: <191101702316132@example.com>\r\n\
\r\n\
Numbers are UP this quarter.";

    fn candidate(flags: &Flags) -> Candidate<'_> {
        Candidate {
            seq: 2,
            uid: 7,
            max_seq: 3,
            max_uid: 9,
            flags,
            date: DateTime::parse_from_rfc3339("2024-03-10T23:30:00-05:00").unwrap(),
            raw: RAW,
        }
    }

    #[test]
    fn flag_keys() {
        let flags = Flags::from_vec(vec![Flag::Seen, Flag::Keyword("$Work".into())]);
        let msg = candidate(&flags);
        assert!(matches(&SearchCriteria::Seen, &msg));
        assert!(!matches(&SearchCriteria::Unseen, &msg));
        assert!(matches(&SearchCriteria::Undeleted, &msg));
        assert!(matches(&SearchCriteria::Keyword("$Work".into()), &msg));
        assert!(matches(&SearchCriteria::Unkeyword("$Home".into()), &msg));
    }

    #[test]
    fn header_and_text_keys_ignore_case() {
        let flags = Flags::new();
        let msg = candidate(&flags);
        assert!(matches(&SearchCriteria::Subject("quarterly".into()), &msg));
        assert!(matches(&SearchCriteria::From("ALICE@".into()), &msg));
        assert!(!matches(&SearchCriteria::To("alice".into()), &msg));
        assert!(matches(
            &SearchCriteria::Header(
                "Message-ID".into(),
                "<191101702316132@example.com>".into()
            ),
            &msg
        ));
        assert!(matches(&SearchCriteria::Header("To".into(), String::new()), &msg));
        assert!(!matches(&SearchCriteria::Header("Cc".into(), String::new()), &msg));
        assert!(matches(&SearchCriteria::Body("up this".into()), &msg));
        assert!(!matches(&SearchCriteria::Body("Report".into()), &msg));
        assert!(matches(&SearchCriteria::Text("report".into()), &msg));
    }

    #[test]
    fn numbers_dates_and_sizes() {
        let flags = Flags::new();
        let msg = candidate(&flags);
        assert!(matches(&SearchCriteria::SequenceSet(SequenceSet::single(2).unwrap()), &msg));
        assert!(!matches(&SearchCriteria::SequenceSet(SequenceSet::All), &msg));
        assert!(matches(&SearchCriteria::Uid(SequenceSet::range(5, 8).unwrap()), &msg));

        // Internal dates compare by their own calendar day
        let on = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert!(matches(&SearchCriteria::On(on), &msg));
        assert!(matches(&SearchCriteria::Since(on), &msg));
        assert!(!matches(&SearchCriteria::Before(on), &msg));

        assert!(matches(&SearchCriteria::Larger(10), &msg));
        assert!(matches(&SearchCriteria::Smaller(10_000), &msg));
    }

    #[test]
    fn combinators() {
        let flags = Flags::from_vec(vec![Flag::Flagged]);
        let msg = candidate(&flags);
        let both = SearchCriteria::And(vec![SearchCriteria::Flagged, SearchCriteria::Unseen]);
        assert!(matches(&both, &msg));
        let either = SearchCriteria::or(SearchCriteria::Deleted, SearchCriteria::Subject("report".into()));
        assert!(matches(&either, &msg));
        assert!(!matches(&SearchCriteria::not(either), &msg));
    }
}
