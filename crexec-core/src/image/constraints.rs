// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Image constraints.
//!
//! At checkpoint time named tags describing the environment (labels or
//! bitmaps) are recorded and persisted to the `tags` file. At restore time
//! required constraints are checked against that file before the engine is
//! allowed to replace the process.
//!
//! File format, one tag per line:
//!
//! ```text
//! label:NAME=VALUE
//! bitmap:NAME=<lower-case hex, two characters per byte>
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::{ImageError, TagError};
use crate::image::{ensure_lower_hex, read_image_file, strict_lines, write_lines};
use crate::types::{check_value_len, EntryName};

/// Name of the tag file inside an image directory.
pub const TAGS_FILE: &str = "tags";

/// Shape of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Label,
    Bitmap,
}

impl TagKind {
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Bitmap => "bitmap",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "label" => Some(Self::Label),
            "bitmap" => Some(Self::Bitmap),
            _ => None,
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// How a required bitmap relates to the persisted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum BitmapComparison {
    Equals = 0,
    /// Every bit required must be set in the persisted bitmap.
    Subset = 1,
    /// Every bit persisted must be set in the required bitmap.
    Superset = 2,
}

impl TryFrom<i32> for BitmapComparison {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Equals),
            1 => Ok(Self::Subset),
            2 => Ok(Self::Superset),
            other => Err(other),
        }
    }
}

/// A named label or bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub kind: TagKind,
    pub name: EntryName,
    pub data: Vec<u8>,
}

impl Tag {
    fn label(name: &str, value: &str) -> Result<Self, TagError> {
        let name = EntryName::new(name)?;
        check_value_len(value.len())?;
        if value.contains('\n') {
            return Err(TagError::NewlineInValue { name: name.into() });
        }
        Ok(Self {
            kind: TagKind::Label,
            name,
            data: value.as_bytes().to_vec(),
        })
    }

    fn bitmap(name: &str, data: &[u8]) -> Result<Self, TagError> {
        let name = EntryName::new(name)?;
        check_value_len(data.len())?;
        Ok(Self {
            kind: TagKind::Bitmap,
            name,
            data: data.to_vec(),
        })
    }

    /// Serialized line, without the trailing newline.
    fn to_line(&self) -> String {
        let value = match self.kind {
            TagKind::Label => String::from_utf8_lossy(&self.data).into_owned(),
            TagKind::Bitmap => hex::encode(&self.data),
        };
        format!("{}:{}={}", self.kind.prefix(), self.name, value)
    }

    fn parse_line(path: &Path, line: &str) -> Result<Self, ImageError> {
        let (prefix, rest) = line
            .split_once(':')
            .ok_or_else(|| ImageError::invalid(path, format!("missing tag kind: {:?}", line)))?;
        let kind = TagKind::from_prefix(prefix)
            .ok_or_else(|| ImageError::invalid(path, format!("unknown tag kind: {:?}", prefix)))?;
        let (name, value) = rest
            .split_once('=')
            .ok_or_else(|| ImageError::invalid(path, format!("missing '=': {:?}", line)))?;

        let name = EntryName::new(name).map_err(|e| ImageError::invalid(path, e.to_string()))?;
        let data = match kind {
            TagKind::Label => value.as_bytes().to_vec(),
            TagKind::Bitmap => {
                ensure_lower_hex(path, value.as_bytes())?;
                hex::decode(value).map_err(|e| {
                    ImageError::invalid(path, format!("bitmap {}: {}", name, e))
                })?
            }
        };

        Ok(Self { kind, name, data })
    }
}

/// A required tag checked at restore time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub tag: Tag,
    pub comparison: BitmapComparison,
    pub failed: bool,
}

/// Recorder for tags (checkpoint side) and constraints (restore side).
#[derive(Debug, Default)]
pub struct ImageConstraints {
    tags: Vec<Tag>,
    constraints: Vec<Constraint>,
}

impl ImageConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a label tag.
    pub fn set_label(&mut self, name: &str, value: &str) -> Result<(), TagError> {
        let tag = Tag::label(name, value)?;
        self.record(tag)
    }

    /// Record a bitmap tag.
    pub fn set_bitmap(&mut self, name: &str, data: &[u8]) -> Result<(), TagError> {
        let tag = Tag::bitmap(name, data)?;
        self.record(tag)
    }

    fn record(&mut self, tag: Tag) -> Result<(), TagError> {
        if self.tags.iter().any(|t| t.name == tag.name) {
            return Err(TagError::Duplicate {
                name: tag.name.into(),
            });
        }
        tracing::debug!(kind = %tag.kind, name = %tag.name, "Recorded image tag");
        self.tags.push(tag);
        Ok(())
    }

    /// Require a label with exactly `value`.
    pub fn require_label(&mut self, name: &str, value: &str) -> Result<(), TagError> {
        let tag = Tag::label(name, value)?;
        self.require(tag, BitmapComparison::Equals)
    }

    /// Require a bitmap related to the persisted one by `comparison`.
    pub fn require_bitmap(
        &mut self,
        name: &str,
        data: &[u8],
        comparison: BitmapComparison,
    ) -> Result<(), TagError> {
        let tag = Tag::bitmap(name, data)?;
        self.require(tag, comparison)
    }

    fn require(&mut self, tag: Tag, comparison: BitmapComparison) -> Result<(), TagError> {
        if self.constraints.iter().any(|c| c.tag.name == tag.name) {
            return Err(TagError::Duplicate {
                name: tag.name.into(),
            });
        }
        self.constraints.push(Constraint {
            tag,
            comparison,
            failed: false,
        });
        Ok(())
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn has_constraints(&self) -> bool {
        !self.constraints.is_empty()
    }

    /// Whether the constraint `name` failed the last validation.
    pub fn is_failed(&self, name: &str) -> bool {
        self.constraints
            .iter()
            .any(|c| c.failed && c.tag.name.as_str() == name)
    }

    /// Write recorded tags to `dir/tags`. Nothing is written without tags.
    pub fn persist(&self, dir: &Path) -> Result<(), ImageError> {
        if self.tags.is_empty() {
            return Ok(());
        }

        let path = dir.join(TAGS_FILE);
        write_lines(&path, self.tags.iter().map(Tag::to_line))?;

        tracing::info!(
            path = %path.display(),
            count = self.tags.len(),
            "Persisted image tags"
        );
        Ok(())
    }

    /// Read the tags persisted in `dir`.
    pub fn load_tags(dir: &Path) -> Result<Vec<Tag>, ImageError> {
        let path = dir.join(TAGS_FILE);
        let content = read_image_file(&path)?;

        let mut tags = Vec::new();
        for line in strict_lines(&path, &content) {
            tags.push(Tag::parse_line(&path, line?)?);
        }
        Ok(tags)
    }

    /// Check every constraint against the tags persisted in `dir`.
    ///
    /// All constraints are evaluated so that each failing one is flagged.
    pub fn validate(&mut self, dir: &Path) -> Result<(), ImageError> {
        let path = dir.join(TAGS_FILE);
        let tags = Self::load_tags(dir)?;

        let mut by_name: HashMap<&str, &Tag> = HashMap::with_capacity(tags.len());
        for tag in &tags {
            if by_name.insert(tag.name.as_str(), tag).is_some() {
                return Err(ImageError::invalid(
                    &path,
                    format!("tag {} persisted twice", tag.name),
                ));
            }
        }

        let mut failed = Vec::new();
        for constraint in &mut self.constraints {
            let required = &constraint.tag;
            let verdict = match by_name.get(required.name.as_str()) {
                None => Err("not found"),
                Some(found) if found.kind != required.kind => Err("kind mismatch"),
                Some(found) => match required.kind {
                    TagKind::Label if found.data == required.data => Ok(()),
                    TagKind::Label => Err("label mismatch"),
                    TagKind::Bitmap
                        if bitmap_matches(&required.data, &found.data, constraint.comparison) =>
                    {
                        Ok(())
                    }
                    TagKind::Bitmap => Err("bitmap mismatch"),
                },
            };

            constraint.failed = verdict.is_err();
            if let Err(reason) = verdict {
                tracing::error!(
                    name = %required.name,
                    kind = %required.kind,
                    reason = reason,
                    "Image constraint failed"
                );
                failed.push(format!("{} ({})", required.name, reason));
            }
        }

        if !failed.is_empty() {
            return Err(ImageError::invalid(
                &path,
                format!("constraints failed: {}", failed.join(", ")),
            ));
        }

        tracing::info!(
            path = %path.display(),
            count = self.constraints.len(),
            "Image constraints satisfied"
        );
        Ok(())
    }
}

/// Compare a required bitmap against a persisted one.
///
/// The shorter operand is treated as zero-extended.
pub fn bitmap_matches(required: &[u8], persisted: &[u8], comparison: BitmapComparison) -> bool {
    match comparison {
        BitmapComparison::Equals => {
            let n = required.len().min(persisted.len());
            required[..n] == persisted[..n]
                && all_zero(&required[n..])
                && all_zero(&persisted[n..])
        }
        BitmapComparison::Subset => is_subset(required, persisted),
        BitmapComparison::Superset => is_subset(persisted, required),
    }
}

fn is_subset(a: &[u8], b: &[u8]) -> bool {
    let n = a.len().min(b.len());
    a[..n].iter().zip(b).all(|(x, y)| x & !y == 0) && all_zero(&a[n..])
}

fn all_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| *b == 0)
}
