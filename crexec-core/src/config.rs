// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Engine invocation options.
//!
//! Options arrive as string key/value pairs over the plugin ABI (or from a
//! YAML file through [`ConfigStore::load_file`]) and are dispatched through a
//! static option table. A failed `configure` never mutates the store.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dispatch::KeyedDispatch;
use crate::error::ConfigError;
use crate::types::{ExecPath, RestoreToken};

/// Total slots of the engine argument vector, sentinel included.
pub const ARGV_CAPACITY: usize = 32;
/// Slots reserved for exec location, action and image location.
const RESERVED_SLOTS: usize = 3;
/// Maximum number of free arguments accepted by the `args` option.
pub const MAX_FREE_ARGS: usize = ARGV_CAPACITY - RESERVED_SLOTS - 1;
/// Separator between free arguments in the `args` option.
pub const ARGS_SEPARATOR: char = ' ';

/// Engine action passed as the first engine argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Checkpoint,
    Restore,
}

impl Action {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Checkpoint => "checkpoint",
            Self::Restore => "restore",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Wire type of an option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    String,
}

impl OptionKind {
    const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::String => "string",
        }
    }
}

/// Operations an option has an effect on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    Checkpoint,
    Restore,
    Both,
}

impl Applicability {
    pub fn applies_to(&self, action: Action) -> bool {
        matches!(
            (self, action),
            (Self::Both, _)
                | (Self::Checkpoint, Action::Checkpoint)
                | (Self::Restore, Action::Restore)
        )
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::Checkpoint => "checkpoint",
            Self::Restore => "restore",
            Self::Both => "checkpoint, restore",
        }
    }
}

type Handler = fn(&mut ConfigStore, &str) -> Result<(), ConfigError>;

/// Static description of one configuration option.
pub struct OptionSpec {
    pub kind: OptionKind,
    pub default: Option<&'static str>,
    pub applies: Applicability,
    pub help: &'static str,
    handler: Handler,
}

impl std::fmt::Debug for OptionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionSpec")
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("applies", &self.applies)
            .finish_non_exhaustive()
    }
}

static OPTIONS: [(&str, OptionSpec); 5] = [
    (
        "image_location",
        OptionSpec {
            kind: OptionKind::String,
            default: None,
            applies: Applicability::Both,
            help: "path to the directory holding the checkpoint image",
            handler: set_image_location,
        },
    ),
    (
        "exec_location",
        OptionSpec {
            kind: OptionKind::String,
            default: None,
            applies: Applicability::Both,
            help: "absolute path to the engine executable",
            handler: set_exec_location,
        },
    ),
    (
        "keep_running",
        OptionSpec {
            kind: OptionKind::Bool,
            default: Some("false"),
            applies: Applicability::Checkpoint,
            help: "leave the process running after the checkpoint",
            handler: set_keep_running,
        },
    ),
    (
        "direct_map",
        OptionSpec {
            kind: OptionKind::Bool,
            default: Some("true"),
            applies: Applicability::Restore,
            help: "map image pages directly instead of copying them on restore",
            handler: set_direct_map,
        },
    ),
    (
        "args",
        OptionSpec {
            kind: OptionKind::String,
            default: Some(""),
            applies: Applicability::Both,
            help: "space-separated free arguments appended to the engine command line",
            handler: set_args,
        },
    ),
];

/// Free arguments of the engine argument vector.
///
/// The full vector is `[exec_location, action, image_location, free...]`
/// followed by a sentinel, within [`ARGV_CAPACITY`] slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgVector {
    free: Vec<String>,
}

impl ArgVector {
    /// Split `value` on [`ARGS_SEPARATOR`] into the free slots.
    ///
    /// An empty value clears the free arguments. Consecutive separators keep
    /// the empty argument between them.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        if value.is_empty() {
            return Ok(Self::default());
        }

        let free: Vec<String> = value.split(ARGS_SEPARATOR).map(str::to_string).collect();
        if free.len() > MAX_FREE_ARGS {
            return Err(ConfigError::TooManyArgs {
                count: free.len(),
                limit: MAX_FREE_ARGS,
            });
        }

        Ok(Self { free })
    }

    pub fn free_args(&self) -> &[String] {
        &self.free
    }

    /// Assemble the engine command line for an action.
    pub fn build(&self, exec: &ExecPath, action: Action, image: &Path) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(RESERVED_SLOTS + self.free.len());
        argv.push(exec.as_path().as_os_str().to_owned());
        argv.push(OsString::from(action.name()));
        argv.push(image.as_os_str().to_owned());
        argv.extend(self.free.iter().map(OsString::from));
        argv
    }
}

/// All engine invocation options for one checkpoint or restore attempt.
#[derive(Debug)]
pub struct ConfigStore {
    dispatch: KeyedDispatch<OptionSpec>,
    exec_location: Option<ExecPath>,
    image_location: Option<PathBuf>,
    keep_running: bool,
    direct_map: bool,
    args: ArgVector,
    restore_token: Option<RestoreToken>,
    /// Keys configured at least once, for applicability warnings.
    explicitly_set: BTreeSet<&'static str>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            dispatch: KeyedDispatch::from_entries(&OPTIONS),
            exec_location: None,
            image_location: None,
            keep_running: false,
            direct_map: true,
            args: ArgVector::default(),
            restore_token: None,
            explicitly_set: BTreeSet::new(),
        }
    }

    /// Check whether `key` names a known option. No side effects.
    pub fn can_configure(&self, key: &str) -> bool {
        self.dispatch.contains(key)
    }

    /// Apply one option. Last write wins.
    pub fn configure(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let Some((static_key, spec)) = self.dispatch.resolve(key) else {
            tracing::error!(key = %key, "Unknown configure option");
            return Err(ConfigError::UnknownKey {
                key: key.to_string(),
            });
        };

        if let Err(e) = (spec.handler)(self, value) {
            tracing::error!(key = %key, error = %e, "Rejected configure option");
            return Err(e);
        }

        self.explicitly_set.insert(static_key);
        tracing::debug!(key = %key, value = %value, "Configured option");
        Ok(())
    }

    /// Known option keys in declaration order.
    pub fn keys(&self) -> &[&'static str] {
        self.dispatch.keys()
    }

    pub fn exec_location(&self) -> Option<&ExecPath> {
        self.exec_location.as_ref()
    }

    pub fn image_location(&self) -> Option<&Path> {
        self.image_location.as_deref()
    }

    pub fn keep_running(&self) -> bool {
        self.keep_running
    }

    pub fn direct_map(&self) -> bool {
        self.direct_map
    }

    pub fn free_args(&self) -> &[String] {
        self.args.free_args()
    }

    pub fn restore_token(&self) -> Option<RestoreToken> {
        self.restore_token
    }

    pub fn set_restore_token(&mut self, token: RestoreToken) {
        self.restore_token = Some(token);
    }

    /// Both locations, or the first missing one as an error.
    pub fn require_locations(&self) -> Result<(&ExecPath, &Path), ConfigError> {
        let exec = self
            .exec_location
            .as_ref()
            .ok_or(ConfigError::MissingRequired {
                key: "exec_location",
            })?;
        let image = self
            .image_location
            .as_deref()
            .ok_or(ConfigError::MissingRequired {
                key: "image_location",
            })?;
        Ok((exec, image))
    }

    /// Options that were set explicitly but have no effect on `action`.
    pub fn inapplicable_options(&self, action: Action) -> Vec<&'static str> {
        self.explicitly_set
            .iter()
            .filter(|key| {
                self.dispatch
                    .get(key)
                    .is_some_and(|spec| !spec.applies.applies_to(action))
            })
            .copied()
            .collect()
    }

    /// Engine command line for `action`.
    pub fn argv(&self, action: Action) -> Result<Vec<OsString>, ConfigError> {
        let (exec, image) = self.require_locations()?;
        Ok(self.args.build(exec, action, image))
    }

    /// Human readable description of every option.
    pub fn configuration_doc(&self) -> String {
        let mut doc = String::new();
        for key in self.dispatch.keys() {
            if let Some(spec) = self.dispatch.get(key) {
                let _ = writeln!(
                    doc,
                    "* {}=<{}> (default: {}) - {} [{}]",
                    key,
                    spec.kind.name(),
                    spec.default.unwrap_or("unset"),
                    spec.help,
                    spec.applies.name(),
                );
            }
        }
        doc
    }

    /// Apply options from a YAML file mapping keys to scalar values.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => ConfigError::Parse {
                message: format!("Failed to read {}: {}", path.display(), e),
            },
        })?;

        self.load_string(&content)
    }

    /// Apply options from a YAML string mapping keys to scalar values.
    pub fn load_string(&mut self, content: &str) -> Result<(), ConfigError> {
        if content.trim().is_empty() {
            return Ok(());
        }

        let raw: BTreeMap<String, RawValue> =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
                message: format!("YAML parse error: {}", e),
            })?;

        for (key, value) in raw {
            self.configure(&key, &value.into_wire())?;
        }

        Ok(())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Scalar value as written in a YAML configuration file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    fn into_wire(self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s,
        }
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected \"true\" or \"false\"".to_string(),
        }),
    }
}

fn set_image_location(store: &mut ConfigStore, value: &str) -> Result<(), ConfigError> {
    store.image_location = Some(PathBuf::from(value));
    Ok(())
}

fn set_exec_location(store: &mut ConfigStore, value: &str) -> Result<(), ConfigError> {
    store.exec_location = Some(ExecPath::new(value)?);
    Ok(())
}

fn set_keep_running(store: &mut ConfigStore, value: &str) -> Result<(), ConfigError> {
    store.keep_running = parse_bool("keep_running", value)?;
    Ok(())
}

fn set_direct_map(store: &mut ConfigStore, value: &str) -> Result<(), ConfigError> {
    store.direct_map = parse_bool("direct_map", value)?;
    Ok(())
}

fn set_args(store: &mut ConfigStore, value: &str) -> Result<(), ConfigError> {
    store.args = ArgVector::parse(value)?;
    Ok(())
}
