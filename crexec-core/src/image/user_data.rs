// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! User data: opaque named blobs carried across checkpoint/restore.
//!
//! Each entry is a file `<image_location>/<name>` holding the bytes as a
//! lower-case hex string followed by a single newline. Writes are not
//! atomic; a failed write may leave an incomplete file behind.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{CrexecResult, ImageError, ImageErrorKind, TagError};
use crate::image::{ensure_lower_hex, read_image_file, SCORE_FILE, TAGS_FILE};
use crate::types::EntryName;

/// Validate `name` as a user data file name that does not shadow `tags` or `score`.
fn entry_name(name: &str) -> Result<EntryName, TagError> {
    let name = EntryName::file_name(name)?;
    if name.as_str() == TAGS_FILE || name.as_str() == SCORE_FILE {
        return Err(TagError::Reserved {
            name: name.as_str().to_string(),
        });
    }
    Ok(name)
}

/// Write `data` as the user data entry `name` inside `image_dir`.
pub fn set_user_data(image_dir: &Path, name: &str, data: &[u8]) -> CrexecResult<()> {
    let name = entry_name(name)?;
    let path = image_dir.join(name.as_str());

    let result = File::create(&path).and_then(|file| {
        let mut writer = BufWriter::new(file);
        writer.write_all(hex::encode(data).as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    });

    if let Err(e) = result {
        tracing::error!(path = %path.display(), error = %e, "Failed to write user data");
        return Err(ImageError::from_io(&path, &e).into());
    }

    tracing::debug!(name = %name, len = data.len(), "Stored user data");
    Ok(())
}

/// Storage handle for user data loaded from an image.
///
/// Every successful lookup keeps its decoded buffer alive until the handle
/// is dropped, so returned slices (and pointers handed over the plugin ABI)
/// stay valid for the handle's lifetime.
#[derive(Debug)]
pub struct UserDataStorage {
    image_dir: PathBuf,
    chunks: Vec<Box<[u8]>>,
}

impl UserDataStorage {
    /// Create a handle with no loaded chunks.
    pub fn new(image_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
            chunks: Vec::new(),
        }
    }

    /// Number of buffers owned by this handle.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Load and decode the entry `name`.
    ///
    /// A missing entry is an [`ImageErrorKind::NotFound`] image error.
    pub fn lookup(&mut self, name: &str) -> CrexecResult<&[u8]> {
        let name = entry_name(name)?;
        let path = self.image_dir.join(name.as_str());

        let content = read_image_file(&path)?;
        let decoded = decode(&path, &content)?;

        tracing::debug!(name = %name, len = decoded.len(), "Loaded user data");
        self.chunks.push(decoded);
        Ok(self.chunks.last().map(|chunk| &chunk[..]).unwrap_or_default())
    }
}

/// Strictly decode `<hex>\n`.
fn decode(path: &Path, content: &[u8]) -> Result<Box<[u8]>, ImageError> {
    let newline = content
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| ImageError::invalid(path, "missing terminating newline"))?;
    if newline + 1 != content.len() {
        return Err(ImageError::invalid(path, "trailing content after newline"));
    }

    let payload = &content[..newline];
    if payload.len() % 2 != 0 {
        return Err(ImageError::invalid(path, "odd number of hex digits"));
    }
    ensure_lower_hex(path, payload)?;

    let mut decoded = Vec::new();
    decoded
        .try_reserve_exact(payload.len() / 2)
        .map_err(|e| ImageError::new(ImageErrorKind::Memory, path, e.to_string()))?;
    decoded.resize(payload.len() / 2, 0);

    hex::decode_to_slice(payload, &mut decoded)
        .map_err(|e| ImageError::invalid(path, e.to_string()))?;

    Ok(decoded.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrexecError;

    fn image_kind(err: CrexecError) -> ImageErrorKind {
        match err {
            CrexecError::Image(e) => e.kind,
            other => panic!("expected image error, got {:?}", other),
        }
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let data = [0x00, 0x01, 0xAB, 0xFF];
        set_user_data(dir.path(), "foo", &data).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("foo")).unwrap();
        assert_eq!(raw, "0001abff\n");

        let mut storage = UserDataStorage::new(dir.path());
        assert_eq!(storage.lookup("foo").unwrap(), &data);
        assert_eq!(storage.chunk_count(), 1);
    }

    #[test]
    fn test_empty_entry() {
        let dir = tempfile::tempdir().unwrap();
        set_user_data(dir.path(), "empty", &[]).unwrap();
        let mut storage = UserDataStorage::new(dir.path());
        assert!(storage.lookup("empty").unwrap().is_empty());
    }

    #[test]
    fn test_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = UserDataStorage::new(dir.path());
        let err = storage.lookup("missing").unwrap_err();
        assert_eq!(image_kind(err), ImageErrorKind::NotFound);
        assert_eq!(storage.chunk_count(), 0);
    }

    #[test]
    fn test_strict_decoding() {
        let path = Path::new("/img/foo");
        let cases: [&[u8]; 8] = [
            b"abc\n", b"zz\n", b"ab", b"ab\n\n", b"ab\ncd", b"AB CD\n", b"AB\n", b"0aFF\n",
        ];
        for bad in cases {
            let err = decode(path, bad).unwrap_err();
            assert_eq!(err.kind, ImageErrorKind::Invalid, "{:?}", bad);
        }
        assert_eq!(&*decode(path, b"0aff\n").unwrap(), &[0x0A, 0xFF]);
    }

    #[test]
    fn test_names_stay_inside_image() {
        let dir = tempfile::tempdir().unwrap();
        assert!(set_user_data(dir.path(), "../escape", b"x").is_err());
        assert!(set_user_data(dir.path(), "", b"x").is_err());
    }

    #[test]
    fn test_reserved_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TAGS_FILE), "label:arch=x86_64\n").unwrap();

        for name in [TAGS_FILE, SCORE_FILE] {
            let err = set_user_data(dir.path(), name, b"\x01").unwrap_err();
            assert!(
                matches!(err, CrexecError::Tag(TagError::Reserved { .. })),
                "{:?}",
                err
            );

            let mut storage = UserDataStorage::new(dir.path());
            assert!(storage.lookup(name).is_err());
        }

        let tags = std::fs::read_to_string(dir.path().join(TAGS_FILE)).unwrap();
        assert_eq!(tags, "label:arch=x86_64\n");
        assert!(!dir.path().join(SCORE_FILE).exists());
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let err = set_user_data(Path::new("/nonexistent/crexec/img"), "foo", b"x").unwrap_err();
        assert_eq!(image_kind(err), ImageErrorKind::NotFound);
    }
}
