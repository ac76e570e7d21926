// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Image directory extensions.
//!
//! Small line-oriented files persisted next to the engine's own image files:
//! `tags` (image constraints), `score` and one file per user data entry.

mod constraints;
mod score;
mod user_data;

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

pub use constraints::{
    bitmap_matches, BitmapComparison, Constraint, ImageConstraints, Tag, TagKind, TAGS_FILE,
};
pub use score::{ImageScore, SCORE_FILE};
pub use user_data::{set_user_data, UserDataStorage};

use crate::error::{ImageError, ImageErrorKind};

/// Read a whole image file, classifying failures.
pub(crate) fn read_image_file(path: &Path) -> Result<Vec<u8>, ImageError> {
    let mut file = File::open(path).map_err(|e| ImageError::from_io(path, &e))?;

    let len = file
        .metadata()
        .map_err(|e| ImageError::from_io(path, &e))?
        .len();
    let len = usize::try_from(len).map_err(|_| {
        ImageError::new(ImageErrorKind::Memory, path, format!("{} bytes do not fit in memory", len))
    })?;

    let mut content = Vec::new();
    content.try_reserve_exact(len).map_err(|e| {
        ImageError::new(ImageErrorKind::Memory, path, e.to_string())
    })?;
    file.read_to_end(&mut content)
        .map_err(|e| ImageError::from_io(path, &e))?;

    Ok(content)
}

/// Split file content into lines, each of which must end with a newline.
pub(crate) fn strict_lines<'a>(
    path: &'a Path,
    content: &'a [u8],
) -> impl Iterator<Item = Result<&'a str, ImageError>> + 'a {
    content
        .split_inclusive(|b| *b == b'\n')
        .enumerate()
        .map(move |(index, chunk)| {
            let Some(line) = chunk.strip_suffix(b"\n") else {
                return Err(ImageError::invalid(
                    path,
                    format!("line {} is not newline-terminated", index + 1),
                ));
            };
            std::str::from_utf8(line).map_err(|_| {
                ImageError::invalid(path, format!("line {} is not valid UTF-8", index + 1))
            })
        })
}

/// Accept only lower-case hex digits. `hex` also decodes upper case.
pub(crate) fn ensure_lower_hex(path: &Path, digits: &[u8]) -> Result<(), ImageError> {
    match digits
        .iter()
        .position(|b| !matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        Some(index) => Err(ImageError::invalid(
            path,
            format!(
                "invalid hex digit {:?} at offset {}",
                char::from(digits[index]),
                index
            ),
        )),
        None => Ok(()),
    }
}

/// Write `lines` to `path`, one per line, replacing previous content.
pub(crate) fn write_lines<I, S>(path: &Path, lines: I) -> Result<(), ImageError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let file = File::create(path).map_err(|e| ImageError::from_io(path, &e))?;
    let mut writer = BufWriter::new(file);

    for line in lines {
        writer
            .write_all(line.as_ref().as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| ImageError::from_io(path, &e))?;
    }

    writer.flush().map_err(|e| ImageError::from_io(path, &e))
}
