// Allow uppercase acronyms for industry-standard terms like SSD, GPT, UUID
#![allow(clippy::upper_case_acronyms)]

pub mod config;
pub mod crypto;
pub mod drives;
pub mod erase_engine;
pub mod io;
pub mod orchestrator;
pub mod provisioning;
pub mod ui;
pub mod verification;

// Re-export the engine and orchestrator for convenience
pub use erase_engine::{EraseEngine, EraseOutcome, EraseState};
pub use orchestrator::{DiskOrchestrator, DiskReport, DiskStatus, Schedule, SessionReport};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Block size used for every write of a pass.
pub const BLOCK_SIZE: usize = 4096;

/// Random passes performed when neither config nor CLI says otherwise.
pub const DEFAULT_PASSES: u32 = 5;

#[derive(Error, Debug)]
pub enum EraseError {
    #[error("cannot open {device}: {source}")]
    DeviceOpen {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot determine size of {device}: {source}")]
    SizeQuery {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read rotational attribute of {device}: {detail}")]
    RotationalQuery { device: String, detail: String },

    #[error("write failed on {device} during {pass} at offset {offset}: {source}")]
    Write {
        device: String,
        pass: PassIndex,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed for {device}: {detail}")]
    ExternalTool {
        tool: String,
        device: String,
        detail: String,
    },

    #[error("non-zero data found on {device} at offset {offset} after the zero pass")]
    Verification { device: String, offset: u64 },

    #[error("cannot read back {device} for verification: {source}")]
    VerifyRead {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot prepare the erase key for {device}: {detail}")]
    KeyMaterial { device: String, detail: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient privileges: {0}")]
    Privilege(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EraseError {
    /// Device the error refers to, if any
    pub fn device(&self) -> Option<&str> {
        match self {
            EraseError::DeviceOpen { device, .. }
            | EraseError::SizeQuery { device, .. }
            | EraseError::RotationalQuery { device, .. }
            | EraseError::Write { device, .. }
            | EraseError::ExternalTool { device, .. }
            | EraseError::Verification { device, .. }
            | EraseError::VerifyRead { device, .. }
            | EraseError::KeyMaterial { device, .. } => Some(device),
            EraseError::InvalidInput(_) | EraseError::Privilege(_) | EraseError::Config(_) => None,
        }
    }
}

pub type DriveResult<T> = Result<T, EraseError>;

/// A physical disk resolved by the inspector. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    /// Kernel identifier, e.g. `sda` or `nvme0n1`
    pub id: String,
    pub path: PathBuf,
    pub size: u64,
    pub rotational: bool,
}

/// Data written by one sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassPattern {
    RandomBytes,
    ZeroBytes,
}

/// Position of a sweep within an erase operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassIndex {
    /// 1-based random pass `number` out of `total`
    Random { number: u32, total: u32 },
    Zero,
    /// Random data over the start of the raw device after a crypto erase
    HeaderScrub,
}

impl PassIndex {
    pub fn pattern(&self) -> PassPattern {
        match self {
            PassIndex::Random { .. } | PassIndex::HeaderScrub => PassPattern::RandomBytes,
            PassIndex::Zero => PassPattern::ZeroBytes,
        }
    }
}

impl fmt::Display for PassIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassIndex::Random { number, total } => write!(f, "random pass {}/{}", number, total),
            PassIndex::Zero => write!(f, "zero pass"),
            PassIndex::HeaderScrub => write!(f, "header scrub"),
        }
    }
}

/// How a device is erased
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EraseMethod {
    /// Random passes then a zero pass written straight to the device
    #[default]
    Overwrite,
    /// LUKS container under a throwaway key, filled through the mapping; the
    /// key is destroyed and the header region scrambled afterwards
    Crypto,
}

impl fmt::Display for EraseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EraseMethod::Overwrite => f.write_str("overwrite"),
            EraseMethod::Crypto => f.write_str("crypto"),
        }
    }
}

impl FromStr for EraseMethod {
    type Err = EraseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "overwrite" | "shred" => Ok(EraseMethod::Overwrite),
            "crypto" | "luks" => Ok(EraseMethod::Crypto),
            other => Err(EraseError::InvalidInput(format!(
                "unknown erase method '{}' (expected overwrite or crypto)",
                other
            ))),
        }
    }
}

/// Data written through the encrypted mapping during a crypto erase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CryptoFill {
    #[default]
    Random,
    Zero,
}

impl CryptoFill {
    pub fn pass(&self) -> PassIndex {
        match self {
            CryptoFill::Random => PassIndex::Random {
                number: 1,
                total: 1,
            },
            CryptoFill::Zero => PassIndex::Zero,
        }
    }
}

impl FromStr for CryptoFill {
    type Err = EraseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "random" => Ok(CryptoFill::Random),
            "zero" | "zeros" => Ok(CryptoFill::Zero),
            other => Err(EraseError::InvalidInput(format!(
                "unknown fill '{}' (expected random or zero)",
                other
            ))),
        }
    }
}

/// Configuration of one erase operation, built per device by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasePlan {
    pub device: String,
    pub random_passes: u32,
    pub zero_pass: bool,
    pub block_size: usize,
    /// Overwrite solid-state media anyway instead of skipping them
    pub allow_solid_state: bool,
    pub method: EraseMethod,
    pub crypto_fill: CryptoFill,
}

impl ErasePlan {
    pub fn new(device: impl Into<String>, random_passes: u32) -> Self {
        Self {
            device: device.into(),
            random_passes,
            zero_pass: true,
            block_size: BLOCK_SIZE,
            allow_solid_state: false,
            method: EraseMethod::Overwrite,
            crypto_fill: CryptoFill::Random,
        }
    }

    pub fn with_method(mut self, method: EraseMethod, fill: CryptoFill) -> Self {
        self.method = method;
        self.crypto_fill = fill;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> DriveResult<Self> {
        if block_size == 0 {
            return Err(EraseError::InvalidInput(
                "block size must be greater than zero".to_string(),
            ));
        }
        self.block_size = block_size;
        Ok(self)
    }

    pub fn with_zero_pass(mut self, zero_pass: bool) -> Self {
        self.zero_pass = zero_pass;
        self
    }

    pub fn with_solid_state_override(mut self, allow: bool) -> Self {
        self.allow_solid_state = allow;
        self
    }

    /// Sweeps in execution order
    pub fn sweeps(&self) -> Vec<PassIndex> {
        let mut sweeps: Vec<PassIndex> = (1..=self.random_passes)
            .map(|number| PassIndex::Random {
                number,
                total: self.random_passes,
            })
            .collect();
        if self.zero_pass {
            sweeps.push(PassIndex::Zero);
        }
        sweeps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemKind {
    Ntfs,
    Ext4,
    #[serde(alias = "fat32")]
    Vfat,
}

impl FilesystemKind {
    pub const ALL: [FilesystemKind; 3] = [
        FilesystemKind::Ntfs,
        FilesystemKind::Ext4,
        FilesystemKind::Vfat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilesystemKind::Ntfs => "ntfs",
            FilesystemKind::Ext4 => "ext4",
            FilesystemKind::Vfat => "vfat",
        }
    }
}

impl fmt::Display for FilesystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilesystemKind {
    type Err = EraseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ntfs" => Ok(FilesystemKind::Ntfs),
            "ext4" => Ok(FilesystemKind::Ext4),
            "vfat" | "fat32" => Ok(FilesystemKind::Vfat),
            other => Err(EraseError::InvalidInput(format!(
                "unsupported filesystem '{}' (expected ntfs, ext4 or vfat)",
                other
            ))),
        }
    }
}

/// Unit of work for one orchestrator worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub device: String,
    pub filesystem: FilesystemKind,
}

impl DiskInfo {
    pub fn new(device: impl Into<String>, filesystem: FilesystemKind) -> Self {
        Self {
            device: device.into(),
            filesystem,
        }
    }
}
