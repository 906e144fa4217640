// Crypto erase - LUKS container under a throwaway key
//
// The device is formatted as a LUKS volume keyed by a random key file, opened,
// and filled end to end through the mapping so every sector holds ciphertext.
// The mapping is then closed, the key file overwritten and removed, and the
// start of the raw device (where the LUKS header and key slots live) is
// overwritten with random data.

use super::{log_state, round_millis, EraseEngine, EraseOutcome, EraseState, SweepRecord};
use crate::crypto::EntropySource;
use crate::io::PassWriter;
use crate::provisioning::run_checked;
use crate::{BlockDevice, DriveResult, EraseError, ErasePlan, PassIndex};
use std::io::{Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

/// Size of the generated key file in bytes
pub const KEY_LEN: usize = 4096;

/// Bytes of the raw device scrambled after the mapping is closed
pub const HEADER_SCRUB_LEN: u64 = 10 * 1024 * 1024;

const CRYPTSETUP: &str = "cryptsetup";

/// Device-mapper name used while the container is open
pub fn mapping_name(id: &str) -> String {
    format!("diskscrub_{}", id)
}

/// Where a crypto erase stopped
struct CryptoFailure {
    pass: Option<PassIndex>,
    offset: u64,
    error: EraseError,
}

impl From<EraseError> for CryptoFailure {
    fn from(error: EraseError) -> Self {
        Self {
            pass: None,
            offset: 0,
            error,
        }
    }
}

/// Random key on disk for the lifetime of one erase.
///
/// The file is created 0600 by `tempfile`; it is zeroed and removed by
/// `destroy`, or on drop if the erase bails out early.
struct KeyFile {
    file: Option<NamedTempFile>,
}

impl KeyFile {
    fn generate(device: &str, entropy: &mut dyn EntropySource) -> DriveResult<Self> {
        let key_error = |detail: String| EraseError::KeyMaterial {
            device: device.to_string(),
            detail,
        };

        let mut key = vec![0u8; KEY_LEN];
        entropy
            .fill_bytes(&mut key)
            .map_err(|e| key_error(format!("random source {} failed: {}", entropy.name(), e)))?;

        let mut file = tempfile::Builder::new()
            .prefix("diskscrub-key-")
            .tempfile()
            .map_err(|e| key_error(e.to_string()))?;
        let written = file
            .write_all(&key)
            .and_then(|_| file.as_file().sync_all());
        key.fill(0);
        written.map_err(|e| key_error(e.to_string()))?;

        Ok(Self { file: Some(file) })
    }

    fn path_arg(&self) -> String {
        self.file
            .as_ref()
            .map(|f| f.path().display().to_string())
            .unwrap_or_default()
    }

    fn destroy(mut self) -> std::io::Result<()> {
        self.shred()
    }

    fn shred(&mut self) -> std::io::Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };

        let mut handle = file.as_file();
        handle.seek(SeekFrom::Start(0))?;
        handle.write_all(&[0u8; KEY_LEN])?;
        handle.sync_all()?;
        file.close()
    }
}

impl Drop for KeyFile {
    fn drop(&mut self) {
        if let Err(e) = self.shred() {
            tracing::warn!(error = %e, "Could not overwrite erase key file");
        }
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl EraseEngine {
    pub(super) fn crypto_erase(&mut self, device: BlockDevice, plan: &ErasePlan) -> EraseOutcome {
        log_state(&device.id, EraseState::CryptoErase);
        if !device.rotational {
            tracing::info!(device = %device.id, "Solid-state device, erasing through an encrypted mapping");
        }

        match self.run_crypto_erase(&device, plan) {
            Ok(sweeps) => {
                tracing::info!(device = %device.id, fill = ?plan.crypto_fill, "Crypto erase complete, key destroyed");
                log_state(&device.id, EraseState::Done);
                EraseOutcome::Done { device, sweeps }
            }
            Err(failure) => self.fail(&device.id, failure.pass, failure.offset, failure.error),
        }
    }

    fn run_crypto_erase(
        &mut self,
        device: &BlockDevice,
        plan: &ErasePlan,
    ) -> Result<Vec<SweepRecord>, CryptoFailure> {
        let mut writer = PassWriter::new(plan.block_size)?;
        let key = KeyFile::generate(&device.id, self.entropy.as_mut())?;

        let device_arg = device.path.display().to_string();
        let key_arg = key.path_arg();
        let mapping = mapping_name(&device.id);

        run_checked(
            self.runner.as_ref(),
            CRYPTSETUP,
            &device.id,
            &args(&["-q", "--batch-mode", "luksFormat", device_arg.as_str(), key_arg.as_str()]),
        )?;
        tracing::info!(device = %device.id, "LUKS container created");

        run_checked(
            self.runner.as_ref(),
            CRYPTSETUP,
            &device.id,
            &args(&["open", "--key-file", key_arg.as_str(), device_arg.as_str(), mapping.as_str()]),
        )?;

        let filled = self.fill_mapping(device, &mapping, plan.crypto_fill.pass(), &mut writer);
        let closed = run_checked(
            self.runner.as_ref(),
            CRYPTSETUP,
            &device.id,
            &args(&["close", mapping.as_str()]),
        );

        let fill_record = match filled {
            Ok(record) => record,
            Err(failure) => {
                if let Err(e) = closed {
                    tracing::warn!(device = %device.id, mapping = %mapping, error = %e, "Mapping left open");
                }
                return Err(failure);
            }
        };
        closed?;

        key.destroy().map_err(|e| EraseError::KeyMaterial {
            device: device.id.clone(),
            detail: format!("cannot destroy key file: {}", e),
        })?;

        let header = BlockDevice {
            size: device.size.min(HEADER_SCRUB_LEN),
            ..device.clone()
        };
        let header_record = self.sweep(&header, PassIndex::HeaderScrub, &mut writer, &device.id)?;

        Ok(vec![fill_record, header_record])
    }

    /// Write `pass` over the whole opened mapping
    fn fill_mapping(
        &mut self,
        device: &BlockDevice,
        mapping: &str,
        pass: PassIndex,
        writer: &mut PassWriter,
    ) -> Result<SweepRecord, CryptoFailure> {
        let id = format!("mapper/{}", mapping);
        let size = self
            .inspector
            .device_size(&id)
            .map_err(|error| CryptoFailure {
                pass: Some(pass),
                offset: 0,
                error,
            })?;

        let mapped = BlockDevice {
            path: self.inspector.layout().device_path(&id),
            id,
            size,
            rotational: device.rotational,
        };
        self.sweep(&mapped, pass, writer, &device.id)
    }

    /// One sweep over `target` on a fresh handle; errors name `disk`
    fn sweep(
        &mut self,
        target: &BlockDevice,
        pass: PassIndex,
        writer: &mut PassWriter,
        disk: &str,
    ) -> Result<SweepRecord, CryptoFailure> {
        tracing::info!(device = %disk, target = %target.path.display(), %pass, size = target.size, "Starting sweep");

        let mut handle = self.opener.open(target).map_err(|source| CryptoFailure {
            pass: Some(pass),
            offset: 0,
            error: EraseError::DeviceOpen {
                device: target.id.clone(),
                source,
            },
        })?;

        let bar = self.progress.pass_bar(disk, pass, target.size);
        let result = writer.write_pass(handle.as_mut(), target, pass, self.entropy.as_mut(), &bar);

        let record = SweepRecord {
            pass,
            bytes_written: result.bytes_written,
            chunks: result.chunks,
            elapsed: result.elapsed,
        };

        if let Some(error) = result.into_error(disk) {
            bar.abandon();
            return Err(CryptoFailure {
                pass: Some(pass),
                offset: record.bytes_written,
                error,
            });
        }

        tracing::info!(
            device = %disk,
            %pass,
            bytes = record.bytes_written,
            elapsed = %humantime::format_duration(round_millis(record.elapsed)),
            "Sweep complete"
        );
        Ok(record)
    }
}
