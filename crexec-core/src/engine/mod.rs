// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Engine lifecycle management module.
//!
//! Delegates checkpoint and restore to an external engine executable:
//! `exec_location <checkpoint|restore> image_location [args...]`.
//! Image extensions are persisted before the engine is spawned and
//! validated before the process image is replaced, so a failure in either
//! never reaches the engine.

mod environment;
mod handshake;
mod process;

use std::convert::Infallible;
use std::path::PathBuf;

pub use environment::EnvironmentBuilder;
pub use handshake::{
    queue_token, queue_token_with_signal, restore_signal, RestoreTokenChannel, SignalTokenChannel,
};
pub use process::{OsLauncher, ProcessLauncher};

use crate::config::{Action, ConfigStore};
use crate::error::{ConfigError, CrexecResult, ProcessError, TagError};
use crate::image::{self, ImageConstraints, ImageScore, UserDataStorage};
use crate::state::{EngineState, EngineStateMachine};
use crate::types::RestoreToken;

/// Marker asking the engine to leave the process running after the checkpoint.
pub const LEAVE_RUNNING_ENV: &str = "CRAC_CRIU_LEAVE_RUNNING";
/// Carries the restore token to the engine on restore.
pub const RESTORE_TOKEN_ENV: &str = "CRAC_NEW_ARGS_ID";
/// Space-separated extra options for the engine.
pub const ENGINE_OPTS_ENV: &str = "CRAC_CRIU_OPTS";
/// Engine option disabling direct page mapping on restore.
pub const NO_DIRECT_MAP_OPT: &str = "--no-mmap-page-image";

/// One checkpoint or restore attempt.
///
/// Owns the configuration, the image extension recorders and the backends
/// used to run the engine and receive the restore token.
pub struct Engine {
    config: ConfigStore,
    constraints: ImageConstraints,
    score: ImageScore,
    state: EngineStateMachine,
    launcher: Box<dyn ProcessLauncher>,
    channel: Box<dyn RestoreTokenChannel>,
}

impl Engine {
    /// Create an engine backed by the operating system.
    pub fn new() -> Self {
        Self::with_backends(Box::new(OsLauncher), Box::new(SignalTokenChannel::new()))
    }

    /// Create an engine with custom launch and token backends.
    pub fn with_backends(
        launcher: Box<dyn ProcessLauncher>,
        channel: Box<dyn RestoreTokenChannel>,
    ) -> Self {
        Self {
            config: ConfigStore::new(),
            constraints: ImageConstraints::new(),
            score: ImageScore::new(),
            state: EngineStateMachine::new(),
            launcher,
            channel,
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    pub fn constraints(&self) -> &ImageConstraints {
        &self.constraints
    }

    pub fn constraints_mut(&mut self) -> &mut ImageConstraints {
        &mut self.constraints
    }

    pub fn score(&self) -> &ImageScore {
        &self.score
    }

    pub fn score_mut(&mut self) -> &mut ImageScore {
        &mut self.score
    }

    pub fn state(&self) -> EngineState {
        self.state.state()
    }

    pub fn can_configure(&self, key: &str) -> bool {
        self.config.can_configure(key)
    }

    pub fn configure(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.config.configure(key, value)
    }

    /// Token received by the last checkpoint, or set for the next restore.
    pub fn restore_token(&self) -> Option<RestoreToken> {
        self.config.restore_token()
    }

    pub fn set_restore_token(&mut self, token: RestoreToken) {
        self.config.set_restore_token(token);
    }

    /// Store a user data entry in the configured image.
    pub fn set_user_data(&self, name: &str, data: &[u8]) -> CrexecResult<()> {
        let image_dir = self
            .config
            .image_location()
            .ok_or(TagError::NoImageLocation {
                operation: "set_user_data",
            })?;
        image::set_user_data(image_dir, name, data)
    }

    /// Open a storage handle for user data in the configured image.
    pub fn load_user_data(&self) -> CrexecResult<UserDataStorage> {
        let image_dir = self
            .config
            .image_location()
            .ok_or(TagError::NoImageLocation {
                operation: "load_user_data",
            })?;
        Ok(UserDataStorage::new(image_dir))
    }

    /// Checkpoint through the engine and wait for the restore token.
    ///
    /// Blocks without timeout after the engine exits successfully.
    pub fn checkpoint(&mut self) -> CrexecResult<RestoreToken> {
        match self.checkpoint_steps() {
            Ok(token) => Ok(token),
            Err(e) => {
                self.state.fail();
                tracing::error!(error = %e, "Checkpoint failed");
                Err(e)
            }
        }
    }

    fn checkpoint_steps(&mut self) -> CrexecResult<RestoreToken> {
        let argv = self.config.argv(Action::Checkpoint)?;
        let image_dir = self.image_dir()?;
        self.warn_inapplicable(Action::Checkpoint);

        // Refused attempts must leave the image untouched.
        self.state.transition_to(EngineState::Configured)?;
        self.constraints.persist(&image_dir)?;
        self.score.persist(&image_dir)?;

        let mut env = EnvironmentBuilder::from_current();
        if self.config.keep_running() {
            env.append(LEAVE_RUNNING_ENV, "true")?;
        }

        self.channel.arm()?;
        self.state.transition_to(EngineState::Launched)?;
        let status = self.launcher.spawn_and_wait(&argv, &env)?;
        if !status.success() {
            return Err(ProcessError::EngineExit {
                action: Action::Checkpoint.name(),
                status: status.to_string(),
            }
            .into());
        }

        self.state.transition_to(EngineState::AwaitingToken)?;
        let token = self.channel.wait_token()?;
        let waited = self.state.time_in_current_state();
        self.config.set_restore_token(token);
        self.state.transition_to(EngineState::Completed)?;

        tracing::info!(
            image = %image_dir.display(),
            token = %token,
            waited_ms = waited.as_millis() as u64,
            "Checkpoint completed"
        );
        Ok(token)
    }

    /// Restore by replacing the current process image with the engine.
    ///
    /// Never returns on success. Any returned value is a failure that
    /// happened before (or instead of) the replacement.
    pub fn restore(&mut self) -> CrexecResult<Infallible> {
        match self.restore_steps() {
            Ok(never) => match never {},
            Err(e) => {
                self.state.fail();
                tracing::error!(error = %e, "Restore failed");
                Err(e)
            }
        }
    }

    fn restore_steps(&mut self) -> CrexecResult<Infallible> {
        let argv = self.config.argv(Action::Restore)?;
        let image_dir = self.image_dir()?;
        self.warn_inapplicable(Action::Restore);

        self.state.transition_to(EngineState::Configured)?;
        if self.constraints.has_constraints() {
            self.constraints.validate(&image_dir)?;
        }

        let token = self.config.restore_token().unwrap_or_default();
        let mut env = EnvironmentBuilder::from_current();
        env.append(RESTORE_TOKEN_ENV, token.to_string())?;
        if !self.config.direct_map() {
            env.merge_token(ENGINE_OPTS_ENV, NO_DIRECT_MAP_OPT)?;
        }

        tracing::info!(
            image = %image_dir.display(),
            token = %token,
            "Handing process over to the engine for restore"
        );

        self.state.transition_to(EngineState::Execd)?;
        Err(self.launcher.exec(&argv, &env).into())
    }

    fn image_dir(&self) -> Result<PathBuf, ConfigError> {
        self.config
            .image_location()
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingRequired {
                key: "image_location",
            })
    }

    fn warn_inapplicable(&self, action: Action) {
        for key in self.config.inapplicable_options(action) {
            tracing::warn!(key = %key, action = %action, "Option has no effect on this operation");
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("constraints", &self.constraints)
            .field("score", &self.score)
            .field("state", &self.state.state())
            .finish_non_exhaustive()
    }
}
