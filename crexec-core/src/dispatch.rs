// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Static key to handler lookup.
//!
//! Built once from a compile-time key list. Every key of that list is
//! guaranteed to resolve; anything else misses.

use std::collections::HashMap;

/// Associative lookup from static string keys to handlers.
#[derive(Debug)]
pub struct KeyedDispatch<H: 'static> {
    /// Keys in declaration order.
    keys: Vec<&'static str>,
    handlers: HashMap<&'static str, &'static H>,
}

impl<H: 'static> KeyedDispatch<H> {
    /// Build the table from a static list of `(key, handler)` entries.
    ///
    /// # Panics
    /// Panics if the list contains the same key twice, which is a programming
    /// error in the static list rather than a runtime condition.
    pub fn from_entries(entries: &'static [(&'static str, H)]) -> Self {
        let mut keys = Vec::with_capacity(entries.len());
        let mut handlers = HashMap::with_capacity(entries.len());

        for (key, handler) in entries {
            let previous = handlers.insert(*key, handler);
            assert!(previous.is_none(), "duplicate dispatch key: {}", key);
            keys.push(*key);
        }

        Self { keys, handlers }
    }

    /// Look up the handler for a key.
    pub fn get(&self, key: &str) -> Option<&'static H> {
        self.handlers.get(key).copied()
    }

    /// Look up a key, returning the static key alongside its handler.
    pub fn resolve(&self, key: &str) -> Option<(&'static str, &'static H)> {
        self.handlers.get_key_value(key).map(|(k, h)| (*k, *h))
    }

    /// Check whether a key is known. No side effects.
    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    /// All keys, in declaration order.
    pub fn keys(&self) -> &[&'static str] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
