// Erase Engine - multi-pass overwrite of one device
//
// Inspects the device, gates on rotational class, then runs the random
// sweeps and the final zero sweep over a single open handle. Any failure ends
// the operation; later sweeps are never attempted. Plans asking for the crypto
// method are handed to `crypto_erase` right after inspection.

mod crypto_erase;

pub use crypto_erase::{mapping_name, HEADER_SCRUB_LEN, KEY_LEN};

use crate::crypto::{EntropySource, MonitoredSource};
use crate::drives::DeviceInspector;
use crate::io::{DeviceHandle, DeviceOpener, ExclusiveOpener, PassWriter};
use crate::provisioning::{CommandRunner, SystemCommandRunner};
use crate::ui::ProgressReporter;
use crate::verification::SampleVerifier;
use crate::{BlockDevice, EraseError, EraseMethod, ErasePlan, PassIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Advisory attached to skipped solid-state devices
pub const SOLID_STATE_ADVISORY: &str = "solid-state media remaps logical sectors, so an overwrite \
does not reach every cell; use the vendor secure-erase command instead \
(`hdparm --security-erase` for SATA, `nvme format --ses=1` for NVMe) \
or rerun with `--method crypto`";

/// Where an erase operation currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EraseState {
    Inspecting,
    RandomPasses,
    SkipWithWarning,
    ZeroPass,
    CryptoErase,
    Done,
    Skipped,
    Failed,
}

impl fmt::Display for EraseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EraseState::Inspecting => "inspecting",
            EraseState::RandomPasses => "random passes",
            EraseState::SkipWithWarning => "skip with warning",
            EraseState::ZeroPass => "zero pass",
            EraseState::CryptoErase => "crypto erase",
            EraseState::Done => "done",
            EraseState::Skipped => "skipped",
            EraseState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A completed sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepRecord {
    pub pass: PassIndex,
    pub bytes_written: u64,
    pub chunks: u64,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

/// Terminal result of [`EraseEngine::erase`]
#[derive(Debug)]
pub enum EraseOutcome {
    Done {
        device: BlockDevice,
        sweeps: Vec<SweepRecord>,
    },
    Skipped {
        device: BlockDevice,
        advisory: String,
    },
    /// `pass` is `None` when no sweep had started (inspection or open failed)
    Failed {
        pass: Option<PassIndex>,
        offset: u64,
        error: EraseError,
    },
}

impl EraseOutcome {
    pub fn state(&self) -> EraseState {
        match self {
            EraseOutcome::Done { .. } => EraseState::Done,
            EraseOutcome::Skipped { .. } => EraseState::Skipped,
            EraseOutcome::Failed { .. } => EraseState::Failed,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, EraseOutcome::Failed { .. })
    }

    fn failed(pass: Option<PassIndex>, offset: u64, error: EraseError) -> Self {
        EraseOutcome::Failed {
            pass,
            offset,
            error,
        }
    }
}

pub struct EraseEngine {
    inspector: DeviceInspector,
    opener: Arc<dyn DeviceOpener>,
    runner: Arc<dyn CommandRunner>,
    entropy: Box<dyn EntropySource>,
    verify_samples: usize,
    progress: ProgressReporter,
}

impl EraseEngine {
    /// Engine with exclusive device access, the monitored system RNG, no
    /// verification and no progress output
    pub fn new(inspector: DeviceInspector) -> Self {
        Self {
            inspector,
            opener: Arc::new(ExclusiveOpener),
            runner: Arc::new(SystemCommandRunner),
            entropy: Box::new(MonitoredSource::system()),
            verify_samples: 0,
            progress: ProgressReporter::hidden(),
        }
    }

    pub fn with_opener(mut self, opener: Arc<dyn DeviceOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Runner for `cryptsetup`, used only by the crypto method
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_entropy(mut self, entropy: Box<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    /// Re-read `samples` windows after the zero pass; 0 disables
    pub fn with_verification(mut self, samples: usize) -> Self {
        self.verify_samples = samples;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Run the plan against its device.
    ///
    /// Never panics on device errors; every failure is reported as
    /// [`EraseOutcome::Failed`] with the sweep and offset it happened at.
    pub fn erase(&mut self, plan: &ErasePlan) -> EraseOutcome {
        log_state(&plan.device, EraseState::Inspecting);

        let device = match self.inspector.inspect(&plan.device) {
            Ok(device) => device,
            Err(error) => return self.fail(&plan.device, None, 0, error),
        };

        if plan.method == EraseMethod::Crypto {
            return self.crypto_erase(device, plan);
        }

        if !device.rotational {
            if !plan.allow_solid_state {
                log_state(&device.id, EraseState::SkipWithWarning);
                tracing::warn!(device = %device.id, "Solid-state device, not overwriting: {}", SOLID_STATE_ADVISORY);
                log_state(&device.id, EraseState::Skipped);
                return EraseOutcome::Skipped {
                    device,
                    advisory: SOLID_STATE_ADVISORY.to_string(),
                };
            }
            tracing::warn!(
                device = %device.id,
                "Solid-state device, overwriting anyway as requested; remapped sectors may keep old data"
            );
        }

        let mut writer = match PassWriter::new(plan.block_size) {
            Ok(writer) => writer,
            Err(error) => return self.fail(&device.id, None, 0, error),
        };

        let mut handle = match self.opener.open(&device) {
            Ok(handle) => handle,
            Err(source) => {
                let error = EraseError::DeviceOpen {
                    device: device.id.clone(),
                    source,
                };
                return self.fail(&device.id, None, 0, error);
            }
        };

        let mut sweeps = Vec::new();
        for pass in plan.sweeps() {
            let state = match pass {
                PassIndex::Random { .. } | PassIndex::HeaderScrub => EraseState::RandomPasses,
                PassIndex::Zero => EraseState::ZeroPass,
            };
            tracing::info!(device = %device.id, state = %state, %pass, size = device.size, "Starting sweep");

            let bar = self.progress.pass_bar(&device.id, pass, device.size);
            let result = writer.write_pass(
                handle.as_mut(),
                &device,
                pass,
                self.entropy.as_mut(),
                &bar,
            );

            let record = SweepRecord {
                pass,
                bytes_written: result.bytes_written,
                chunks: result.chunks,
                elapsed: result.elapsed,
            };

            if let Some(error) = result.into_error(&device.id) {
                bar.abandon();
                return self.fail(&device.id, Some(pass), record.bytes_written, error);
            }

            tracing::info!(
                device = %device.id,
                %pass,
                bytes = record.bytes_written,
                chunks = record.chunks,
                elapsed = %humantime::format_duration(round_millis(record.elapsed)),
                "Sweep complete"
            );
            sweeps.push(record);
        }

        if plan.zero_pass && self.verify_samples > 0 {
            if let Err((offset, error)) = self.verify(handle.as_mut(), &device, plan.block_size) {
                return self.fail(&device.id, Some(PassIndex::Zero), offset, error);
            }
        }

        log_state(&device.id, EraseState::Done);
        EraseOutcome::Done { device, sweeps }
    }

    fn verify(
        &self,
        handle: &mut dyn DeviceHandle,
        device: &BlockDevice,
        window: usize,
    ) -> Result<(), (u64, EraseError)> {
        let verifier = SampleVerifier::new(self.verify_samples, window);
        let mut rng = StdRng::from_entropy();

        let report = verifier
            .verify_zeroed(handle, device.size, &mut rng)
            .map_err(|source| {
                (
                    0,
                    EraseError::VerifyRead {
                        device: device.id.clone(),
                        source,
                    },
                )
            })?;

        match report.first_nonzero {
            Some(offset) => Err((
                offset,
                EraseError::Verification {
                    device: device.id.clone(),
                    offset,
                },
            )),
            None => {
                tracing::info!(
                    device = %device.id,
                    samples = report.samples_checked,
                    bytes = report.bytes_checked,
                    "Zero pass verified"
                );
                Ok(())
            }
        }
    }

    fn fail(
        &self,
        device: &str,
        pass: Option<PassIndex>,
        offset: u64,
        error: EraseError,
    ) -> EraseOutcome {
        match pass {
            Some(pass) => {
                tracing::error!(device = %device, state = %EraseState::Failed, %pass, offset, error = %error, "Erase failed")
            }
            None => {
                tracing::error!(device = %device, state = %EraseState::Failed, error = %error, "Erase failed")
            }
        }
        EraseOutcome::failed(pass, offset, error)
    }
}

fn log_state(device: &str, state: EraseState) {
    tracing::debug!(device = %device, state = %state, "Erase state");
}

fn round_millis(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
