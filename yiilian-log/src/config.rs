use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use yiilian_core::common::error::Error;

pub const DEFAULT_MAX_STORE_BYTES: u64 = 1024;
pub const DEFAULT_MAX_INDEX_BYTES: u64 = 1024;
pub const DEFAULT_INITIAL_OFFSET: u64 = 0;

/// Segment limits and the first offset of a brand-new log.
///
/// A zero `max_store_bytes` or `max_index_bytes` means the default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Rotate once the store file reaches this size
    pub max_store_bytes: u64,

    /// Rotate once the index reaches this size, it's also the size mapped for each index
    pub max_index_bytes: u64,

    pub initial_offset: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_store_bytes: DEFAULT_MAX_STORE_BYTES,
            max_index_bytes: DEFAULT_MAX_INDEX_BYTES,
            initial_offset: DEFAULT_INITIAL_OFFSET,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    pub fn from_file<P: AsRef<Path>>(cfg_file: P) -> Result<Self, Error> {
        let cfg = fs::read_to_string(cfg_file.as_ref()).map_err(|error| {
            Error::new_config(
                Some(error.into()),
                Some(format!("read {} failed", cfg_file.as_ref().display())),
            )
        })?;

        Config::from_yaml(&cfg)
    }

    pub fn from_yaml(cfg: &str) -> Result<Self, Error> {
        let config: Config = serde_yaml::from_str(cfg).map_err(|error| {
            Error::new_config(Some(error.into()), Some("parse config failed".to_owned()))
        })?;

        Ok(config.normalized())
    }

    pub fn normalized(mut self) -> Self {
        if self.max_store_bytes == 0 {
            self.max_store_bytes = DEFAULT_MAX_STORE_BYTES;
        }

        if self.max_index_bytes == 0 {
            self.max_index_bytes = DEFAULT_MAX_INDEX_BYTES;
        }

        self
    }
}

#[derive(Clone, Default)]
/// Builder for Config
pub struct ConfigBuilder {
    config: Config,
}

macro_rules! make_builder_method {
    ($prop:ident, $prop_type:ty) => {
        pub fn $prop(mut self, $prop: $prop_type) -> Self {
            self.config.$prop = $prop;
            self
        }
    };
}

impl ConfigBuilder {
    pub fn new() -> ConfigBuilder {
        Self::default()
    }

    make_builder_method!(max_store_bytes, u64);
    make_builder_method!(max_index_bytes, u64);
    make_builder_method!(initial_offset, u64);

    pub fn build(self) -> Config {
        self.config.normalized()
    }
}
