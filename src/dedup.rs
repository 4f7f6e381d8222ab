//! Suppression of repeated identical warnings.
//!
//! A warning raised inside a loop would otherwise be logged or forwarded once
//! per iteration. The [`DedupCounter`] acts on the first occurrence of each
//! `(file, line, message)` combination and only counts the rest.

use alloc::borrow::Cow;
use core::fmt;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

/// Identity of a warning: where it was raised and what it said.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    /// Source file.
    pub file: Cow<'static, str>,
    /// Line in `file`.
    pub line: u32,
    /// The rendered message.
    pub message: String,
}

impl DedupKey {
    /// Creates a key.
    pub fn new(file: impl Into<Cow<'static, str>>, line: u32, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.file, self.line, self.message)
    }
}

/// Occurrence counts per [`DedupKey`].
///
/// Counts only ever grow. Nothing is evicted: the counter lives for one
/// process or request, and the number of distinct warnings actually raised in
/// that time is small.
///
/// # Examples
///
/// ```
/// use faultline::dedup::{DedupCounter, DedupKey};
///
/// let mut counter = DedupCounter::new();
/// let key = DedupKey::new("src/index.rs", 12, "Warning: Undefined variable x");
///
/// assert!(counter.should_act(&key));
/// assert!(!counter.should_act(&key));
/// assert_eq!(counter.count(&key), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct DedupCounter {
    counts: HashMap<DedupKey, u64, FxBuildHasher>,
}

impl DedupCounter {
    /// Creates an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an occurrence of `key` and returns whether it was the first.
    pub fn should_act(&mut self, key: &DedupKey) -> bool {
        if let Some(count) = self.counts.get_mut(key) {
            *count += 1;
            return false;
        }
        self.counts.insert(key.clone(), 1);
        true
    }

    /// How many times `key` occurred.
    pub fn count(&self, key: &DedupKey) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Number of distinct keys seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterates over every key with its count, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&DedupKey, u64)> {
        self.counts.iter().map(|(key, count)| (key, *count))
    }

    /// Forgets every count. For hosts that scope deduplication per request.
    pub fn reset(&mut self) {
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_occurrence_only() {
        let mut counter = DedupCounter::new();
        let key = DedupKey::new("src/a.rs", 3, "Notice: x");

        let acted: Vec<bool> = (0..5).map(|_| counter.should_act(&key)).collect();
        assert_eq!(acted, [true, false, false, false, false]);
        assert_eq!(counter.count(&key), 5);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut counter = DedupCounter::new();
        let a = DedupKey::new("src/a.rs", 3, "Notice: x");
        let other_line = DedupKey::new("src/a.rs", 4, "Notice: x");
        let other_message = DedupKey::new("src/a.rs", 3, "Notice: y");

        assert!(counter.should_act(&a));
        assert!(counter.should_act(&other_line));
        assert!(counter.should_act(&other_message));
        assert!(!counter.should_act(&a));
        assert_eq!(counter.len(), 3);
        assert_eq!(counter.count(&DedupKey::new("src/b.rs", 1, "")), 0);
    }

    #[test]
    fn test_reset() {
        let mut counter = DedupCounter::new();
        let key = DedupKey::new("src/a.rs", 3, "Notice: x");
        counter.should_act(&key);
        counter.reset();
        assert!(counter.is_empty());
        assert!(counter.should_act(&key));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(DedupKey::new("src/f.rs", 12, "m").to_string(), "src/f.rs|12|m");
    }
}
