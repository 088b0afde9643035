//! `VmConfig`: the flat set of recognized VM configuration options,
//! loadable from TOML the way `dsl-core`'s config loader reads its own
//! settings file, or built up programmatically.

use linevm_program::Tag;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// VM-wide tunables. `default_module_tag` is the one field with no sane TOML
/// representation (it's the host's `Tag` type) and is always `None` after a
/// TOML load — set it programmatically afterward if the host needs one.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(bound(deserialize = ""))]
pub struct VmConfig<T: Tag> {
    #[serde(default = "defaults::max_active_threads")]
    pub max_active_threads: usize,
    #[serde(default = "defaults::max_thread_space")]
    pub max_thread_space: usize,
    #[serde(default = "defaults::max_call_depth")]
    pub max_call_depth: usize,
    #[serde(default = "defaults::use_thread_priority")]
    pub use_thread_priority: bool,
    #[serde(skip)]
    pub default_module_tag: Option<T>,
}

mod defaults {
    pub fn max_active_threads() -> usize {
        64
    }
    pub fn max_thread_space() -> usize {
        512
    }
    pub fn max_call_depth() -> usize {
        256
    }
    pub fn use_thread_priority() -> bool {
        true
    }
}

impl<T: Tag> Default for VmConfig<T> {
    fn default() -> Self {
        Self {
            max_active_threads: defaults::max_active_threads(),
            max_thread_space: defaults::max_thread_space(),
            max_call_depth: defaults::max_call_depth(),
            use_thread_priority: defaults::use_thread_priority(),
            default_module_tag: None,
        }
    }
}

impl<T: Tag> VmConfig<T> {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
