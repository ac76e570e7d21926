// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Image score: named numeric metrics stored with a checkpoint.
//!
//! Persisted as `NAME=VALUE` lines in the `score` file. Values use Rust's
//! float formatting, which does not depend on the process locale.

use std::path::Path;

use crate::error::{ImageError, TagError};
use crate::image::{read_image_file, strict_lines, write_lines};
use crate::types::EntryName;

/// Name of the score file inside an image directory.
pub const SCORE_FILE: &str = "score";

/// Recorder for image scores. Setting a name twice keeps the last value.
#[derive(Debug, Default)]
pub struct ImageScore {
    scores: Vec<(EntryName, f64)>,
}

impl ImageScore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_score(&mut self, name: &str, value: f64) -> Result<(), TagError> {
        let name = EntryName::new(name)?;

        match self.scores.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.scores.push((name, value)),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| *v)
    }

    pub fn scores(&self) -> &[(EntryName, f64)] {
        &self.scores
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Write recorded scores to `dir/score`. Nothing is written without scores.
    pub fn persist(&self, dir: &Path) -> Result<(), ImageError> {
        if self.scores.is_empty() {
            return Ok(());
        }

        let path = dir.join(SCORE_FILE);
        write_lines(
            &path,
            self.scores
                .iter()
                .map(|(name, value)| format!("{}={}", name, value)),
        )?;

        tracing::info!(path = %path.display(), count = self.scores.len(), "Persisted image score");
        Ok(())
    }

    /// Read the scores persisted in `dir`.
    pub fn load(dir: &Path) -> Result<Self, ImageError> {
        let path = dir.join(SCORE_FILE);
        let content = read_image_file(&path)?;

        let mut score = Self::new();
        for line in strict_lines(&path, &content) {
            let line = line?;
            let (name, value) = line
                .split_once('=')
                .ok_or_else(|| ImageError::invalid(&path, format!("missing '=': {:?}", line)))?;
            let value: f64 = value.parse().map_err(|e| {
                ImageError::invalid(&path, format!("score {}: {}", name, e))
            })?;
            score
                .set_score(name, value)
                .map_err(|e| ImageError::invalid(&path, e.to_string()))?;
        }
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImageErrorKind;

    #[test]
    fn test_last_value_wins() {
        let mut score = ImageScore::new();
        score.set_score("heap.used", 1.0).unwrap();
        score.set_score("heap.used", 2.5).unwrap();
        assert_eq!(score.scores().len(), 1);
        assert_eq!(score.get("heap.used"), Some(2.5));
    }

    #[test]
    fn test_invalid_names() {
        let mut score = ImageScore::new();
        assert!(score.set_score("", 1.0).is_err());
        assert!(score.set_score("a=b", 1.0).is_err());
        assert!(score.is_empty());
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut score = ImageScore::new();
        score.set_score("classes", 1234.0).unwrap();
        score.set_score("ratio", 0.125).unwrap();
        score.set_score("tiny", -1.5e-12).unwrap();
        score.persist(dir.path()).unwrap();

        let content = std::fs::read_to_string(dir.path().join(SCORE_FILE)).unwrap();
        assert_eq!(content.lines().next(), Some("classes=1234"));

        let loaded = ImageScore::load(dir.path()).unwrap();
        assert_eq!(loaded.get("ratio"), Some(0.125));
        assert_eq!(loaded.get("tiny"), Some(-1.5e-12));
    }

    #[test]
    fn test_empty_score_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        ImageScore::new().persist(dir.path()).unwrap();
        assert!(!dir.path().join(SCORE_FILE).exists());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SCORE_FILE), "x=notanumber\n").unwrap();
        let err = ImageScore::load(dir.path()).unwrap_err();
        assert_eq!(err.kind, ImageErrorKind::Invalid);
    }
}
