// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `crexec restore` command - Hand this process over to the engine.

use crexec_core::{Engine, RestoreToken};

use super::split_pair;

pub fn execute(
    mut engine: Engine,
    token: Option<i32>,
    required_labels: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(token) = token {
        engine.set_restore_token(RestoreToken::new(token));
    }
    for label in required_labels {
        let (name, value) = split_pair(label)?;
        engine.constraints_mut().require_label(name, value)?;
    }

    // Only returns when the engine could not take over.
    let e = match engine.restore() {
        Ok(never) => match never {},
        Err(e) => e,
    };
    for constraint in engine.constraints().constraints() {
        if constraint.failed {
            eprintln!("  constraint failed: {}", constraint.tag.name);
        }
    }
    eprintln!("✗ Restore failed:");
    eprintln!("  {}", e);
    std::process::exit(1);
}
