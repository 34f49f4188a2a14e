//! Key arithmetic for prefix operations.

use std::collections::{BTreeMap, BTreeSet};

/// Key separator.
pub const SEPARATOR: char = '/';

/// Joins a prefix and a relative name with exactly one separator.
///
/// An empty prefix (or one made only of separators) yields the name alone.
#[must_use]
pub fn join_prefix(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches(SEPARATOR);
    let name = name.trim_start_matches(SEPARATOR);

    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}{SEPARATOR}{name}")
    }
}

/// Returns the part of a key after its last separator.
#[must_use]
pub fn file_name_from_key(key: &str) -> &str {
    key.rsplit(SEPARATOR).next().unwrap_or(key)
}

/// Returns true for folder placeholder keys such as `logs/2024/`.
#[must_use]
pub fn is_placeholder(key: &str) -> bool {
    key.ends_with(SEPARATOR)
}

/// Key mapping for one prefix-to-prefix transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkTransferPlan {
    /// Prefix the source objects are listed under.
    pub source_prefix: String,
    /// Prefix the objects are written under.
    pub destination_prefix: String,
    /// Source keys to leave alone.
    pub excluded_keys: BTreeSet<String>,
}

impl BulkTransferPlan {
    /// Creates a plan.
    #[must_use]
    pub fn new(
        source_prefix: impl Into<String>,
        destination_prefix: impl Into<String>,
        excluded_keys: BTreeSet<String>,
    ) -> Self {
        Self {
            source_prefix: source_prefix.into(),
            destination_prefix: destination_prefix.into(),
            excluded_keys,
        }
    }

    /// Returns true when objects keep their original keys.
    #[must_use]
    pub fn keeps_original_keys(&self) -> bool {
        self.destination_prefix.trim_matches(SEPARATOR).is_empty()
    }

    /// Computes where a source key lands.
    #[must_use]
    pub fn destination_key(&self, source_key: &str) -> String {
        if self.keeps_original_keys() {
            source_key.to_string()
        } else {
            join_prefix(&self.destination_prefix, file_name_from_key(source_key))
        }
    }

    /// Groups source keys that would land on the same destination key.
    ///
    /// Only destinations claimed by two or more source keys are returned.
    #[must_use]
    pub fn collisions<'a>(&self, source_keys: &'a [String]) -> BTreeMap<String, Vec<&'a str>> {
        let mut by_destination: BTreeMap<String, Vec<&'a str>> = BTreeMap::new();
        for key in source_keys {
            by_destination
                .entry(self.destination_key(key))
                .or_default()
                .push(key.as_str());
        }
        by_destination.retain(|_, sources| sources.len() > 1);
        by_destination
    }

    /// Returns true if the key takes part in the transfer.
    #[must_use]
    pub fn includes(&self, key: &str) -> bool {
        !is_placeholder(key) && !self.excluded_keys.contains(key)
    }
}
