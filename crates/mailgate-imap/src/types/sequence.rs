//! Sequence sets for message ranges.
//!
//! The same type addresses both sequence numbers and UIDs; commands carry a
//! separate `uid` flag to say which one is meant.

use super::SeqNum;
use crate::error::{Error, Result};

/// Largest set [`SequenceSet::numbers`] will expand.
pub const MAX_EXPANSION: u64 = 1 << 20;

/// Sequence set for specifying message ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// Single sequence number.
    Single(SeqNum),
    /// Range of sequence numbers (inclusive, either order).
    Range(SeqNum, SeqNum),
    /// Range from start to end of mailbox.
    RangeFrom(SeqNum),
    /// All messages (*).
    All,
    /// Multiple sequence specifications.
    Set(Vec<Self>),
}

impl SequenceSet {
    /// Creates a sequence set from a single number.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        SeqNum::new(n).map(Self::Single)
    }

    /// Creates a range sequence set.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        Some(Self::Range(SeqNum::new(start)?, SeqNum::new(end)?))
    }

    /// Returns an empty set. Empty sets cannot be sent on the wire.
    #[must_use]
    pub const fn empty() -> Self {
        Self::Set(Vec::new())
    }

    /// Builds a compact set from arbitrary numbers, merging adjacent runs.
    ///
    /// Zeroes are ignored.
    #[must_use]
    pub fn from_numbers<I>(numbers: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        let mut nums: Vec<u32> = numbers.into_iter().filter(|&n| n != 0).collect();
        nums.sort_unstable();
        nums.dedup();

        let mut parts = Vec::new();
        let mut iter = nums.into_iter();
        let Some(mut start) = iter.next() else {
            return Self::empty();
        };
        let mut end = start;
        for n in iter {
            if n == end + 1 {
                end = n;
                continue;
            }
            parts.extend(Self::run(start, end));
            start = n;
            end = n;
        }
        parts.extend(Self::run(start, end));

        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Self::Set(parts)
        }
    }

    fn run(start: u32, end: u32) -> Option<Self> {
        if start == end {
            Self::single(start)
        } else {
            Self::range(start, end)
        }
    }

    /// Parses the wire form, e.g. `1:3,5,7:*`.
    ///
    /// # Errors
    ///
    /// Returns a parse error for empty input, zero values or stray
    /// characters.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = Vec::new();
        for item in s.split(',') {
            parts.push(Self::parse_item(item)?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Self::Set(parts)
        })
    }

    fn parse_item(item: &str) -> Result<Self> {
        match item.split_once(':') {
            None if item == "*" => Ok(Self::All),
            None => Ok(Self::Single(parse_seq_num(item)?)),
            Some(("*", "*")) => Ok(Self::All),
            Some(("*", n) | (n, "*")) => Ok(Self::RangeFrom(parse_seq_num(n)?)),
            Some((a, b)) => Ok(Self::Range(parse_seq_num(a)?, parse_seq_num(b)?)),
        }
    }

    /// Returns true if the set selects nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Set(items) => items.iter().all(Self::is_empty),
            _ => false,
        }
    }

    /// Returns true if `n` is in the set, where `*` stands for `max`.
    #[must_use]
    pub fn contains(&self, n: u32, max: u32) -> bool {
        match self {
            Self::Single(s) => s.get() == n,
            Self::Range(a, b) => {
                let (lo, hi) = ordered(a.get(), b.get());
                (lo..=hi).contains(&n)
            }
            Self::RangeFrom(a) => {
                let (lo, hi) = ordered(a.get(), max);
                (lo..=hi).contains(&n)
            }
            Self::All => max != 0 && n == max,
            Self::Set(items) => items.iter().any(|s| s.contains(n, max)),
        }
    }

    /// Returns true if the set uses `*`.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Single(_) | Self::Range(..) => false,
            Self::RangeFrom(_) | Self::All => true,
            Self::Set(items) => items.iter().any(Self::is_dynamic),
        }
    }

    /// Returns the largest number named outside `*`, without expanding
    /// ranges.
    #[must_use]
    pub fn max_static(&self) -> Option<u32> {
        match self {
            Self::Single(s) => Some(s.get()),
            Self::Range(a, b) => Some(a.get().max(b.get())),
            Self::RangeFrom(a) => Some(a.get()),
            Self::All => None,
            Self::Set(items) => items.iter().filter_map(Self::max_static).max(),
        }
    }

    /// Counts the numbers the set names, duplicates included, or `None` if
    /// it uses `*`.
    #[must_use]
    pub fn span(&self) -> Option<u64> {
        match self {
            Self::Single(_) => Some(1),
            Self::Range(a, b) => {
                let (lo, hi) = ordered(a.get(), b.get());
                Some(u64::from(hi - lo) + 1)
            }
            Self::RangeFrom(_) | Self::All => None,
            Self::Set(items) => items.iter().map(Self::span).sum(),
        }
    }

    /// Expands the set into sorted numbers.
    ///
    /// Returns `None` if the set uses `*` or names more than
    /// [`MAX_EXPANSION`] numbers.
    #[must_use]
    pub fn numbers(&self) -> Option<Vec<u32>> {
        if self.span()? > MAX_EXPANSION {
            return None;
        }
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out.sort_unstable();
        out.dedup();
        Some(out)
    }

    fn collect_into(&self, out: &mut Vec<u32>) {
        match self {
            Self::Single(s) => out.push(s.get()),
            Self::Range(a, b) => {
                let (lo, hi) = ordered(a.get(), b.get());
                out.extend(lo..=hi);
            }
            Self::Set(items) => items.iter().for_each(|s| s.collect_into(out)),
            Self::RangeFrom(_) | Self::All => {}
        }
    }
}

const fn ordered(a: u32, b: u32) -> (u32, u32) {
    if a <= b { (a, b) } else { (b, a) }
}

fn parse_seq_num(s: &str) -> Result<SeqNum> {
    s.parse::<u32>()
        .ok()
        .filter(|_| s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(SeqNum::new)
        .ok_or_else(|| Error::Parse {
            position: 0,
            message: format!("invalid sequence number {s:?}"),
        })
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::All => write!(f, "*"),
            Self::Set(items) => {
                let s: Vec<_> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", s.join(","))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::needless_collect)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    mod sequence_set_tests {
        use super::*;

        #[test]
        fn single_zero_returns_none() {
            assert!(SequenceSet::single(0).is_none());
            assert!(SequenceSet::range(0, 10).is_none());
        }

        #[test]
        fn display() {
            assert_eq!(SequenceSet::single(42).unwrap().to_string(), "42");
            assert_eq!(SequenceSet::range(1, 100).unwrap().to_string(), "1:100");
            assert_eq!(
                SequenceSet::RangeFrom(SeqNum::new(50).unwrap()).to_string(),
                "50:*"
            );
            assert_eq!(SequenceSet::All.to_string(), "*");
            let set = SequenceSet::Set(vec![
                SequenceSet::single(1).unwrap(),
                SequenceSet::range(5, 10).unwrap(),
            ]);
            assert_eq!(set.to_string(), "1,5:10");
        }

        #[test]
        fn parse() {
            assert_eq!(SequenceSet::parse("7").unwrap(), SequenceSet::single(7).unwrap());
            assert_eq!(SequenceSet::parse("*").unwrap(), SequenceSet::All);
            assert_eq!(
                SequenceSet::parse("*:4").unwrap(),
                SequenceSet::RangeFrom(SeqNum::new(4).unwrap())
            );
            assert_eq!(SequenceSet::parse("1:3,5,9:*").unwrap().to_string(), "1:3,5,9:*");
        }

        #[test]
        fn parse_rejects_garbage() {
            assert!(SequenceSet::parse("").is_err());
            assert!(SequenceSet::parse("0").is_err());
            assert!(SequenceSet::parse("1,,2").is_err());
            assert!(SequenceSet::parse("+1").is_err());
            assert!(SequenceSet::parse("a:b").is_err());
        }

        #[test]
        fn contains_with_star() {
            let set = SequenceSet::parse("2:4,10:*").unwrap();
            assert!(!set.contains(1, 12));
            assert!(set.contains(3, 12));
            assert!(set.contains(12, 12));
            assert!(!set.contains(9, 12));
            // 10:* with max 8 means 8:10.
            assert!(set.contains(8, 8));
            assert!(SequenceSet::All.contains(5, 5));
            assert!(!SequenceSet::All.contains(4, 5));
            assert!(!SequenceSet::All.contains(0, 0));
        }

        #[test]
        fn reversed_range() {
            let set = SequenceSet::parse("5:2").unwrap();
            assert!(set.contains(3, 10));
            assert_eq!(set.numbers().unwrap(), vec![2, 3, 4, 5]);
        }

        #[test]
        fn from_numbers_compacts() {
            let set = SequenceSet::from_numbers([5, 1, 2, 3, 9, 3, 0]);
            assert_eq!(set.to_string(), "1:3,5,9");
            assert_eq!(SequenceSet::from_numbers([4]).to_string(), "4");
            assert!(SequenceSet::from_numbers([]).is_empty());
        }

        #[test]
        fn numbers_refuses_star() {
            assert!(SequenceSet::parse("1:*").unwrap().numbers().is_none());
            assert!(!SequenceSet::All.is_empty());
        }

        #[test]
        fn huge_ranges_are_not_expanded() {
            let set = SequenceSet::parse("1:4294967295").unwrap();
            assert_eq!(set.max_static(), Some(u32::MAX));
            assert_eq!(set.span(), Some(u64::from(u32::MAX)));
            assert!(set.numbers().is_none());

            let set = SequenceSet::parse("7,3:5,9:*").unwrap();
            assert_eq!(set.max_static(), Some(9));
            assert_eq!(set.span(), None);
            assert_eq!(SequenceSet::All.max_static(), None);
        }
    }

    proptest! {
        #[test]
        fn from_numbers_preserves_membership(nums in proptest::collection::vec(1u32..200, 0..40)) {
            let set = SequenceSet::from_numbers(nums.iter().copied());
            for n in 1..200 {
                prop_assert_eq!(set.contains(n, 200), nums.contains(&n));
            }
            if !nums.is_empty() {
                let reparsed = SequenceSet::parse(&set.to_string()).unwrap();
                prop_assert_eq!(reparsed.numbers(), set.numbers());
            }
        }
    }
}
