// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Crexec Core Library
//!
//! Checkpoint/restore engine shim. Delegates snapshotting to an external
//! engine executable and provides configuration, the restore-token
//! handshake, and image extensions (constraints, score and user data).

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod image;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use config::{Action, ConfigStore};
pub use dispatch::KeyedDispatch;
pub use engine::{Engine, EnvironmentBuilder, OsLauncher, ProcessLauncher, RestoreTokenChannel};
pub use error::{
    ConfigError, CrexecError, CrexecResult, ImageError, ImageErrorKind, ProcessError, TagError,
};
pub use image::{BitmapComparison, ImageConstraints, ImageScore, UserDataStorage};
pub use state::{EngineState, EngineStateMachine};
pub use types::{EntryName, ExecPath, RestoreToken};
