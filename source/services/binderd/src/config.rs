// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Daemon configuration with built-in defaults
//!
//! Everything runs with the defaults; a TOML file named by the
//! `BINDERD_CONFIG` environment variable overrides them field by field.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable naming an optional config file.
pub const CONFIG_ENV: &str = "BINDERD_CONFIG";

/// Reply payload capacity per handled transaction, in bytes.
///
/// The largest registry reply is one flat object record or one name string;
/// this is the documented fixed size, not a hidden limit.
pub const DEFAULT_REPLY_CAPACITY: usize = 128;

/// Object-reference capacity of the reply message.
pub const DEFAULT_REPLY_OBJECTS: usize = 4;

/// Errors while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The named file could not be read.
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML for this schema.
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Binder device node the daemon opens.
    pub device: PathBuf,
    /// binderfs control node used to allocate the device.
    pub control: PathBuf,
    /// binderfs mount point.
    pub mount_point: PathBuf,
    /// Device name requested from binderfs.
    pub device_name: String,
    /// Size of the driver mapping in bytes.
    pub map_size: usize,
    /// Reply payload capacity in bytes.
    pub reply_capacity: usize,
    /// Reply object-reference capacity.
    pub reply_objects: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/binderfs/cbinder"),
            control: PathBuf::from("/dev/binderfs/binder-control"),
            mount_point: PathBuf::from("/dev/binderfs"),
            device_name: String::from("cbinder"),
            map_size: binder_ipc::DEFAULT_MAP_SIZE,
            reply_capacity: DEFAULT_REPLY_CAPACITY,
            reply_objects: DEFAULT_REPLY_OBJECTS,
        }
    }
}

impl Config {
    /// Loads the file named by [`CONFIG_ENV`], or the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Loads a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}
