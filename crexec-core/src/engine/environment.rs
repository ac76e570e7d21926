// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Engine process environment.
//!
//! A duplicated snapshot of the host environment that grows independently of
//! it. Entries are kept as raw `NAME=VALUE` OS strings so non UTF-8 values
//! survive untouched.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};

use crate::error::ProcessError;

/// Owned `NAME=VALUE` environment vector handed to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentBuilder {
    entries: Vec<OsString>,
}

impl EnvironmentBuilder {
    /// Start from an empty environment.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Duplicate the current process environment.
    pub fn from_current() -> Self {
        Self::from_vars(std::env::vars_os())
    }

    /// Build from name/value pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let entries = vars
            .into_iter()
            .map(|(name, value)| join(name.as_ref(), value.as_ref()))
            .collect();
        Self { entries }
    }

    /// Add `name=value`, overriding an entry already present under `name`.
    pub fn append(&mut self, name: &str, value: impl AsRef<OsStr>) -> Result<(), ProcessError> {
        check_name(name)?;
        let entry = join(OsStr::new(name), value.as_ref());

        match self.position(name) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }

        Ok(())
    }

    /// Merge `token` into the space-separated multi-value variable `name`.
    ///
    /// Existing tokens are kept; `token` is appended only if absent.
    pub fn merge_token(&mut self, name: &str, token: &str) -> Result<(), ProcessError> {
        check_name(name)?;

        let Some(index) = self.position(name) else {
            self.entries.push(join(OsStr::new(name), OsStr::new(token)));
            return Ok(());
        };

        let current = value_of(&self.entries[index]).as_bytes();
        if current
            .split(|b| *b == b' ')
            .any(|existing| existing == token.as_bytes())
        {
            return Ok(());
        }

        let mut merged = Vec::with_capacity(current.len() + 1 + token.len());
        merged.extend_from_slice(current);
        if !current.is_empty() {
            merged.push(b' ');
        }
        merged.extend_from_slice(token.as_bytes());

        self.entries[index] = join(OsStr::new(name), OsStr::from_bytes(&merged));
        Ok(())
    }

    /// Value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&OsStr> {
        self.position(name).map(|index| value_of(&self.entries[index]))
    }

    /// Raw `NAME=VALUE` entries in order.
    pub fn entries(&self) -> &[OsString] {
        &self.entries
    }

    /// Entries split into name and value.
    pub fn pairs(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.entries.iter().map(|entry| split(entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| split(entry).0.as_bytes() == name.as_bytes())
    }
}

fn check_name(name: &str) -> Result<(), ProcessError> {
    if name.is_empty() || name.contains('=') || name.contains('\0') {
        return Err(ProcessError::InvalidEnvName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn join(name: &OsStr, value: &OsStr) -> OsString {
    let mut bytes = Vec::with_capacity(name.len() + 1 + value.len());
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(b'=');
    bytes.extend_from_slice(value.as_bytes());
    OsString::from_vec(bytes)
}

fn split(entry: &OsStr) -> (&OsStr, &OsStr) {
    let bytes = entry.as_bytes();
    match bytes.iter().position(|b| *b == b'=') {
        Some(eq) => (
            OsStr::from_bytes(&bytes[..eq]),
            OsStr::from_bytes(&bytes[eq + 1..]),
        ),
        None => (entry, OsStr::new("")),
    }
}

fn value_of(entry: &OsStr) -> &OsStr {
    split(entry).1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvironmentBuilder {
        EnvironmentBuilder::from_vars(pairs.iter().copied())
    }

    #[test]
    fn test_from_vars_keeps_order() {
        let builder = env(&[("A", "1"), ("B", "x=y")]);
        assert_eq!(builder.entries(), &["A=1", "B=x=y"]);
        assert_eq!(builder.get("B"), Some(OsStr::new("x=y")));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let builder = EnvironmentBuilder::from_current();
        let before = builder.len();
        let mut copy = builder.clone();
        copy.append("CREXEC_TEST_ONLY_VAR", "1").unwrap();
        assert_eq!(builder.len(), before);
        assert!(std::env::var_os("CREXEC_TEST_ONLY_VAR").is_none());
    }

    #[test]
    fn test_append_overrides() {
        let mut builder = env(&[("A", "1")]);
        builder.append("B", "2").unwrap();
        builder.append("A", "3").unwrap();
        assert_eq!(builder.entries(), &["A=3", "B=2"]);
    }

    #[test]
    fn test_append_rejects_bad_names() {
        let mut builder = EnvironmentBuilder::empty();
        assert!(builder.append("", "v").is_err());
        assert!(builder.append("A=B", "v").is_err());
        assert!(builder.is_empty());
    }

    #[test]
    fn test_merge_token_absent_variable() {
        let mut builder = EnvironmentBuilder::empty();
        builder.merge_token("OPTS", "--no-mmap").unwrap();
        assert_eq!(builder.get("OPTS"), Some(OsStr::new("--no-mmap")));
    }

    #[test]
    fn test_merge_token_appends_once() {
        let mut builder = env(&[("OPTS", "--a --b")]);
        builder.merge_token("OPTS", "--c").unwrap();
        builder.merge_token("OPTS", "--c").unwrap();
        builder.merge_token("OPTS", "--a").unwrap();
        assert_eq!(builder.get("OPTS"), Some(OsStr::new("--a --b --c")));
    }

    #[test]
    fn test_merge_token_matches_whole_tokens() {
        let mut builder = env(&[("OPTS", "--no-mmap-page-image-x")]);
        builder.merge_token("OPTS", "--no-mmap-page-image").unwrap();
        assert_eq!(
            builder.get("OPTS"),
            Some(OsStr::new("--no-mmap-page-image-x --no-mmap-page-image"))
        );
    }

    #[test]
    fn test_merge_token_into_empty_value() {
        let mut builder = env(&[("OPTS", "")]);
        builder.merge_token("OPTS", "--x").unwrap();
        assert_eq!(builder.entries(), &["OPTS=--x"]);
    }
}
