// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Crexec CLI
//!
//! Command-line front end for the checkpoint/restore engine shim.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

/// Crexec - checkpoint/restore through an external engine
#[derive(Parser)]
#[command(name = "crexec")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML file with engine options
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Engine option as key=value, applied after the config file
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Checkpoint through the engine and wait for the restore token
    Checkpoint {
        /// Label tag recorded with the image, as name=value
        #[arg(long, value_name = "NAME=VALUE")]
        label: Vec<String>,

        /// Score recorded with the image, as name=value
        #[arg(long, value_name = "NAME=VALUE")]
        score: Vec<String>,
    },

    /// Replace this process with the engine restoring the image
    Restore {
        /// Restore token handed to the engine
        #[arg(short, long)]
        token: Option<i32>,

        /// Label the image must carry, as name=value
        #[arg(long, value_name = "NAME=VALUE")]
        require_label: Vec<String>,
    },

    /// Show tags, scores and user data stored in an image
    Inspect {
        /// Image directory
        image_dir: PathBuf,

        /// Also print this user data entry as hex
        #[arg(long, value_name = "NAME")]
        user_data: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Checkpoint { label, score } => {
            let engine = commands::build_engine(cli.config.as_deref(), &cli.options)?;
            commands::checkpoint::execute(engine, &label, &score)
        }
        Commands::Restore {
            token,
            require_label,
        } => {
            let engine = commands::build_engine(cli.config.as_deref(), &cli.options)?;
            commands::restore::execute(engine, token, &require_label)
        }
        Commands::Inspect {
            image_dir,
            user_data,
        } => commands::inspect::execute(&image_dir, user_data.as_deref()),
    }
}
