// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `crexec checkpoint` command - Checkpoint and wait for the restore token.

use crexec_core::Engine;

use super::{split_pair, ArgError};

pub fn execute(
    mut engine: Engine,
    labels: &[String],
    scores: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    for label in labels {
        let (name, value) = split_pair(label)?;
        engine.constraints_mut().set_label(name, value)?;
    }
    for score in scores {
        let (name, value) = split_pair(score)?;
        let value: f64 = value.parse().map_err(|_| ArgError::InvalidScore {
            name: name.to_string(),
            value: value.to_string(),
        })?;
        engine.score_mut().set_score(name, value)?;
    }

    match engine.checkpoint() {
        Ok(token) => {
            println!("✓ Checkpoint completed");
            println!("  Restore token: {}", token);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Checkpoint failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
