//! IMAP command tag generator.
//!
//! Tags are used to match commands with their responses.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Tag;

/// Tag generator for IMAP commands.
///
/// Generates unique sequential tags in the format "A0001", "A0002", etc.
/// The 64-bit counter never wraps within a connection's lifetime, so a tag
/// is never handed out twice.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU64,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU64::new(1),
            prefix,
        }
    }

    /// Generates the next tag.
    #[must_use]
    pub fn next(&self) -> Tag {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Tag::new(format!("{}{:04}", self.prefix, n))
    }

    /// Returns how many tags were handed out.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed) - 1
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
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

    #[test]
    fn test_tag_generation() {
        let generator = TagGenerator::default();
        assert_eq!(generator.next().as_str(), "A0001");
        assert_eq!(generator.next().as_str(), "A0002");
        assert_eq!(generator.issued(), 2);
    }

    #[test]
    fn test_custom_prefix() {
        let generator = TagGenerator::new('T');
        assert_eq!(generator.next().as_str(), "T0001");
    }

    #[test]
    fn test_uniqueness_and_validity() {
        let generator = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();

        for _ in 0..20000 {
            let tag = generator.next();
            assert!(tag.is_valid());
            assert!(seen.insert(tag), "duplicate tag generated");
        }
    }

    #[test]
    fn test_width_grows_past_padding() {
        let generator = TagGenerator::default();
        generator.counter.store(99_999, Ordering::Relaxed);
        assert_eq!(generator.next().as_str(), "A99999");
        assert_eq!(generator.next().as_str(), "A100000");
    }
}
