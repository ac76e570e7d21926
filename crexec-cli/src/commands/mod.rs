// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

use std::path::Path;

use crexec_core::{ConfigError, Engine};

pub mod checkpoint;
pub mod inspect;
pub mod restore;

/// Errors in command-line arguments.
#[derive(Debug, thiserror::Error)]
pub enum ArgError {
    #[error("Expected KEY=VALUE, got '{0}'")]
    MissingSeparator(String),

    #[error("Invalid score '{value}' for {name}")]
    InvalidScore { name: String, value: String },
}

/// Split `key=value` at the first '='.
pub fn split_pair(pair: &str) -> Result<(&str, &str), ArgError> {
    pair.split_once('=')
        .ok_or_else(|| ArgError::MissingSeparator(pair.to_string()))
}

/// Engine configured from an optional YAML file, then from `-o` pairs.
pub fn build_engine(config: Option<&Path>, options: &[String]) -> Result<Engine, Box<dyn std::error::Error>> {
    let mut engine = Engine::new();

    if let Some(path) = config {
        tracing::info!(file = %path.display(), "Loading engine options");
        engine.config_mut().load_file(path)?;
    }

    for option in options {
        let (key, value) = split_pair(option)?;
        engine.configure(key, value).map_err(|e: ConfigError| {
            tracing::error!(option = %option, "Rejected engine option");
            e
        })?;
    }

    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pair() {
        assert_eq!(split_pair("a=b=c").unwrap(), ("a", "b=c"));
        assert_eq!(split_pair("args=").unwrap(), ("args", ""));
        assert!(split_pair("noequals").is_err());
    }

    #[test]
    fn test_build_engine_applies_file_then_options() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("crexec.yaml");
        std::fs::write(
            &file,
            "exec_location: /usr/sbin/criu\nimage_location: /tmp/a\nkeep_running: true\n",
        )
        .unwrap();

        let engine = build_engine(Some(&file), &["image_location=/tmp/b".to_string()]).unwrap();
        assert_eq!(engine.config().image_location(), Some(Path::new("/tmp/b")));
        assert!(engine.config().keep_running());
    }

    #[test]
    fn test_build_engine_rejects_bad_option() {
        assert!(build_engine(None, &["exec_location=relative".to_string()]).is_err());
        assert!(build_engine(None, &["bogus=1".to_string()]).is_err());
        assert!(build_engine(None, &["novalue".to_string()]).is_err());
    }
}
