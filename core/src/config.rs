// Layered configuration: built-in defaults, then a TOML file, then
// DISKSCRUB_* environment variables. CLI flags are applied on top by main.

use crate::{CryptoFill, DriveResult, EraseError, EraseMethod, ErasePlan, FilesystemKind, DEFAULT_PASSES};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "DISKSCRUB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EraseConfig {
    /// Random passes before the zero pass
    pub passes: u32,
    pub zero_pass: bool,
    /// Offsets re-read after the zero pass; 0 disables verification
    pub verify_samples: usize,
    pub filesystem: Option<FilesystemKind>,
    pub log_dir: Option<PathBuf>,
    pub sequential: bool,
    pub allow_solid_state: bool,
    pub method: EraseMethod,
    /// Data written through the mapping when `method` is crypto
    pub crypto_fill: CryptoFill,
}

impl Default for EraseConfig {
    fn default() -> Self {
        Self {
            passes: DEFAULT_PASSES,
            zero_pass: true,
            verify_samples: 64,
            filesystem: None,
            log_dir: Some(PathBuf::from("/var/log/diskscrub")),
            sequential: false,
            allow_solid_state: false,
            method: EraseMethod::Overwrite,
            crypto_fill: CryptoFill::Random,
        }
    }
}

impl EraseConfig {
    /// Load configuration. An explicit path must exist; the per-user default
    /// file is optional.
    pub fn load(explicit: Option<&Path>) -> DriveResult<Self> {
        let mut builder = config::Config::builder();

        match explicit {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(path) = Self::default_path() {
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let loaded: EraseConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| EraseError::Config(e.to_string()))?;

        tracing::debug!(?loaded, "Configuration loaded");
        Ok(loaded)
    }

    /// `config.toml` in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "diskscrub", "diskscrub")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn plan_for(&self, device: &str) -> ErasePlan {
        ErasePlan::new(device, self.passes)
            .with_zero_pass(self.zero_pass)
            .with_solid_state_override(self.allow_solid_state)
            .with_method(self.method, self.crypto_fill)
    }
}
