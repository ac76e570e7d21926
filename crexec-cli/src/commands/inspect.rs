// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `crexec inspect` command - Show what an image carries.

use std::path::Path;

use crexec_core::image::TagKind;
use crexec_core::{ImageConstraints, ImageScore, UserDataStorage};

pub fn execute(image_dir: &Path, user_data: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(image = %image_dir.display(), "Inspecting image");

    println!("Image: {}", image_dir.display());
    println!();

    match ImageConstraints::load_tags(image_dir) {
        Ok(tags) => {
            println!("Tags ({}):", tags.len());
            for tag in &tags {
                match tag.kind {
                    TagKind::Label => println!(
                        "  - {} = {}",
                        tag.name,
                        String::from_utf8_lossy(&tag.data)
                    ),
                    TagKind::Bitmap => {
                        println!("  - {} = bitmap {}", tag.name, hex::encode(&tag.data))
                    }
                }
            }
        }
        Err(e) if e.is_not_found() => println!("Tags: none"),
        Err(e) => return Err(e.into()),
    }
    println!();

    match ImageScore::load(image_dir) {
        Ok(score) => {
            println!("Scores ({}):", score.scores().len());
            for (name, value) in score.scores() {
                println!("  - {} = {}", name, value);
            }
        }
        Err(e) if e.is_not_found() => println!("Scores: none"),
        Err(e) => return Err(e.into()),
    }

    if let Some(name) = user_data {
        println!();
        let mut storage = UserDataStorage::new(image_dir);
        let data = storage.lookup(name)?;
        println!("User data {} ({} bytes):", name, data.len());
        println!("  {}", hex::encode(data));
    }

    Ok(())
}
