use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::normalize::cancellation_key;

/// Records the operator has cancelled, keyed by normalized `name|date`.
///
/// The set only grows; there is no removal operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CancellationOverlay {
    keys: BTreeSet<String>,
}

impl CancellationOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { keys: keys.into_iter().map(Into::into).collect() }
    }

    /// Marks `(name, date)` as cancelled. Returns `true` if the key was new.
    pub fn add(&mut self, name: &str, date: &str) -> bool {
        self.keys.insert(cancellation_key(name, date))
    }

    pub fn is_cancelled(&self, name: &str, date: &str) -> bool {
        self.contains_key(&cancellation_key(name, date))
    }

    /// Membership test for a key that is already normalized.
    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
