// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for crexec.
//!
//! This module defines explicit enum error types as per coding guidelines.
//! No `Box<dyn Error>`, no `anyhow::Result` - all errors are strongly typed.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the engine shim.
/// All errors are explicit variants - no catch-all or generic handling.
#[derive(Debug, Error)]
pub enum CrexecError {
    // =========================================================================
    // Configuration Errors - Local, Never Fatal to the Caller
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // =========================================================================
    // Recording Errors - Rejected at Record Time, Not at Persist Time
    // =========================================================================
    #[error("Tag error: {0}")]
    Tag(#[from] TagError),

    // =========================================================================
    // Image Persistence Errors
    // =========================================================================
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    // =========================================================================
    // Engine Process Errors - No In-Process Fallback
    // =========================================================================
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Invalid engine state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),
}

/// Configuration errors raised by `configure` and the file loader.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown configuration option: {key}")]
    UnknownKey { key: String },

    #[error("Invalid value for {key}: {value:?} - {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{key} must be an absolute path: {path}")]
    NotAbsolute { key: &'static str, path: PathBuf },

    #[error("Too many free arguments: {count} given, limit is {limit}")]
    TooManyArgs { count: usize, limit: usize },

    #[error("Missing required option: {key}")]
    MissingRequired { key: &'static str },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    Parse { message: String },
}

/// Violations detected when recording a tag, score, constraint or user data entry.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Name {name:?} contains a forbidden character {forbidden:?}")]
    ForbiddenCharacter { name: String, forbidden: char },

    #[error("{what} too long: {len} bytes (max {max})")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Value for {name} contains a newline")]
    NewlineInValue { name: String },

    #[error("{name} is already recorded")]
    Duplicate { name: String },

    #[error("{name} is reserved for the image's own files")]
    Reserved { name: String },

    #[error("image_location must be configured before {operation}")]
    NoImageLocation { operation: &'static str },
}

/// Classification of image persistence failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageErrorKind {
    /// The file does not exist (no such image, or an image predating the feature).
    NotFound,
    /// Permission or other I/O failure.
    NoAccess,
    /// Content violates the strict format or fails a constraint comparison.
    Invalid,
    /// Allocation failure while loading the file.
    Memory,
}

impl ImageErrorKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::NoAccess => "NoAccess",
            Self::Invalid => "Invalid",
            Self::Memory => "Memory",
        }
    }
}

impl fmt::Display for ImageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Persistence errors for files inside an image directory.
#[derive(Debug, Error)]
#[error("{kind}: {path}: {reason}")]
pub struct ImageError {
    pub kind: ImageErrorKind,
    pub path: PathBuf,
    pub reason: String,
}

impl ImageError {
    pub fn new(kind: ImageErrorKind, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::new(ImageErrorKind::Invalid, path, reason)
    }

    /// Classify an I/O error raised while opening or reading an image file.
    pub fn from_io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ImageErrorKind::NotFound,
            std::io::ErrorKind::OutOfMemory => ImageErrorKind::Memory,
            std::io::ErrorKind::InvalidData => ImageErrorKind::Invalid,
            _ => ImageErrorKind::NoAccess,
        };
        Self::new(kind, path, err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ImageErrorKind::NotFound
    }
}

/// Engine process errors.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn engine {path}: {reason}")]
    SpawnFailed { path: PathBuf, reason: String },

    #[error("Engine {action} exited unsuccessfully: {status}")]
    EngineExit {
        action: &'static str,
        status: String,
    },

    #[error("Failed to exec engine {path}: {reason}")]
    ExecFailed { path: PathBuf, reason: String },

    #[error("Restore token handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("Argument or environment entry contains a NUL byte: {entry:?}")]
    NulByte { entry: String },

    #[error("Invalid environment variable name: {name:?}")]
    InvalidEnvName { name: String },
}

/// State transition errors for the engine state machine.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Engine is in terminal state: {state}")]
    TerminalState { state: &'static str },
}

/// Result type alias using CrexecError.
pub type CrexecResult<T> = Result<T, CrexecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::TooManyArgs {
            count: 40,
            limit: 28,
        };
        assert!(err.to_string().contains("28"));
        assert!(err.to_string().contains("40"));
    }

    #[test]
    fn test_error_chain() {
        let config_err = ConfigError::UnknownKey {
            key: "nope".to_string(),
        };
        let err: CrexecError = config_err.into();
        assert!(matches!(err, CrexecError::Config(_)));
    }

    #[test]
    fn test_io_classification() {
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(ImageError::from_io("/x/tags", &missing).is_not_found());

        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(
            ImageError::from_io("/x/tags", &denied).kind,
            ImageErrorKind::NoAccess
        );
    }
}
