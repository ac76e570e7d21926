// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Engine process launching.
//!
//! Checkpoint runs the engine as a child and waits for it. Restore replaces
//! the current process image with the engine, so a successful restore never
//! returns.

use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::time::Instant;

use crate::engine::environment::EnvironmentBuilder;
use crate::error::ProcessError;

/// Runs the external engine executable.
pub trait ProcessLauncher {
    /// Spawn `argv[0]` with `argv` and `env`, and wait for it to exit.
    fn spawn_and_wait(
        &mut self,
        argv: &[OsString],
        env: &EnvironmentBuilder,
    ) -> Result<ExitStatus, ProcessError>;

    /// Replace the current process image with `argv[0]`.
    ///
    /// Only returns if the replacement failed.
    fn exec(&mut self, argv: &[OsString], env: &EnvironmentBuilder) -> ProcessError;
}

/// Launcher backed by the operating system.
#[derive(Debug, Default)]
pub struct OsLauncher;

impl ProcessLauncher for OsLauncher {
    fn spawn_and_wait(
        &mut self,
        argv: &[OsString],
        env: &EnvironmentBuilder,
    ) -> Result<ExitStatus, ProcessError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(ProcessError::SpawnFailed {
                path: PathBuf::new(),
                reason: "empty argument vector".to_string(),
            });
        };

        let start = Instant::now();

        let mut child = Command::new(program)
            .args(args)
            .env_clear()
            .envs(env.pairs())
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                path: PathBuf::from(program),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            pid = child.id(),
            engine = %PathBuf::from(program).display(),
            argc = argv.len(),
            "Spawned engine process"
        );

        let status = child.wait().map_err(|e| ProcessError::SpawnFailed {
            path: PathBuf::from(program),
            reason: format!("Failed to wait for engine: {}", e),
        })?;

        tracing::info!(
            status = %status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Engine process exited"
        );

        Ok(status)
    }

    fn exec(&mut self, argv: &[OsString], env: &EnvironmentBuilder) -> ProcessError {
        let path = argv.first().map(PathBuf::from).unwrap_or_default();

        let c_argv = match to_cstrings(argv.iter()) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let c_env = match to_cstrings(env.entries().iter()) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let Some(c_path) = c_argv.first() else {
            return ProcessError::ExecFailed {
                path,
                reason: "empty argument vector".to_string(),
            };
        };

        tracing::debug!(engine = %path.display(), argc = argv.len(), "Replacing process image");

        match nix::unistd::execve(c_path, &c_argv, &c_env) {
            Ok(never) => match never {},
            Err(errno) => ProcessError::ExecFailed {
                path,
                reason: errno.desc().to_string(),
            },
        }
    }
}

/// Convert OS strings to the NUL-terminated form expected by `execve`.
fn to_cstrings<'a>(
    items: impl Iterator<Item = &'a OsString>,
) -> Result<Vec<CString>, ProcessError> {
    items
        .map(|item| {
            CString::new(item.as_bytes()).map_err(|_| ProcessError::NulByte {
                entry: item.to_string_lossy().into_owned(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_spawn_true() {
        let status = OsLauncher
            .spawn_and_wait(&argv(&["/bin/true", "checkpoint", "/tmp/img"]), &EnvironmentBuilder::empty())
            .unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_spawn_false_reports_status() {
        let status = OsLauncher
            .spawn_and_wait(&argv(&["/bin/false"]), &EnvironmentBuilder::empty())
            .unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_spawn_missing_binary() {
        let result = OsLauncher.spawn_and_wait(
            &argv(&["/nonexistent/engine", "checkpoint"]),
            &EnvironmentBuilder::empty(),
        );
        assert!(matches!(result, Err(ProcessError::SpawnFailed { .. })));
    }

    #[test]
    fn test_spawn_passes_environment() {
        let mut env = EnvironmentBuilder::empty();
        env.append("CREXEC_PROBE", "expected").unwrap();
        let status = OsLauncher
            .spawn_and_wait(
                &argv(&["/bin/sh", "-c", "test \"$CREXEC_PROBE\" = expected"]),
                &env,
            )
            .unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_exec_missing_binary_returns() {
        let err = OsLauncher.exec(
            &argv(&["/nonexistent/engine", "restore", "/tmp/img"]),
            &EnvironmentBuilder::empty(),
        );
        assert!(matches!(err, ProcessError::ExecFailed { .. }));
    }

    #[test]
    fn test_exec_rejects_nul_bytes() {
        let err = OsLauncher.exec(&argv(&["/bin/tr\0ue"]), &EnvironmentBuilder::empty());
        assert!(matches!(err, ProcessError::NulByte { .. }));
    }
}
