// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Following the "Newtype" pattern in Rust to ensure valid state by construction.
//! All types validate their invariants at creation time.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, TagError};

/// Maximum length of a tag, score, constraint or user data name in bytes.
pub const MAX_NAME_LEN: usize = 256;
/// Maximum length of a label value or bitmap in bytes.
pub const MAX_VALUE_LEN: usize = 256;

/// Validated entry name.
/// Non-empty, at most MAX_NAME_LEN bytes, no '=' and no newline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryName(String);

impl EntryName {
    /// Create a new EntryName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, TagError> {
        let name = name.into();

        if name.is_empty() {
            return Err(TagError::EmptyName);
        }

        if name.len() > MAX_NAME_LEN {
            return Err(TagError::TooLong {
                what: "name",
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }

        if let Some(forbidden) = name.chars().find(|c| *c == '=' || *c == '\n') {
            return Err(TagError::ForbiddenCharacter { name, forbidden });
        }

        Ok(Self(name))
    }

    /// Create a name that is also usable as a file name inside an image directory.
    pub fn file_name(name: impl Into<String>) -> Result<Self, TagError> {
        let name = Self::new(name)?;

        if name.0.contains('/') {
            return Err(TagError::ForbiddenCharacter {
                name: name.0,
                forbidden: '/',
            });
        }

        if name.0 == "." || name.0 == ".." {
            return Err(TagError::ForbiddenCharacter {
                name: name.0,
                forbidden: '.',
            });
        }

        Ok(name)
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EntryName> for String {
    fn from(name: EntryName) -> Self {
        name.0
    }
}

/// Check a label value or bitmap against MAX_VALUE_LEN.
pub(crate) fn check_value_len(len: usize) -> Result<(), TagError> {
    if len > MAX_VALUE_LEN {
        return Err(TagError::TooLong {
            what: "value",
            len,
            max: MAX_VALUE_LEN,
        });
    }
    Ok(())
}

/// Validated engine executable location.
/// Must be an absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecPath(PathBuf);

impl ExecPath {
    /// Create a new ExecPath, rejecting relative paths.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();

        if !path.is_absolute() {
            return Err(ConfigError::NotAbsolute {
                key: "exec_location",
                path,
            });
        }

        Ok(Self(path))
    }

    /// Get the inner path.
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ExecPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Opaque integer handed from a checkpoint attempt to the following restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RestoreToken(i32);

impl RestoreToken {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for RestoreToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for RestoreToken {
    fn from(value: i32) -> Self {
        Self(value)
    }
}
