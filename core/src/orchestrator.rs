// Disk Orchestrator - runs erase, partition and format for every selected disk
//
// Each disk gets its own worker on the blocking pool. A worker owns its
// DiskInfo, plan and engine; the disk tools are shared read-only. One disk's
// failure never stops another, and every worker is joined before the session
// report is built.

use crate::erase_engine::{EraseEngine, EraseOutcome, EraseState, SweepRecord};
use crate::provisioning::DiskTools;
use crate::{DiskInfo, ErasePlan, FilesystemKind, PassIndex};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Log target for the per-disk audit trail
pub const AUDIT_TARGET: &str = "diskscrub::audit";

/// Builds the engine for one disk; called on the worker thread
pub type EngineFactory = Arc<dyn Fn(&DiskInfo) -> EraseEngine + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schedule {
    /// All disks at once
    Concurrent,
    /// One disk after another
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskStatus {
    /// Overwritten, partitioned and formatted
    Completed,
    /// Solid-state disk left un-overwritten, then partitioned and formatted
    EraseSkipped,
    Failed,
}

/// Last pipeline stage a disk entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Erase,
    Partition,
    Format,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EraseSummary {
    pub state: EraseState,
    pub size: Option<u64>,
    pub rotational: Option<bool>,
    pub sweeps: Vec<SweepRecord>,
    pub failed_pass: Option<PassIndex>,
    pub failed_offset: Option<u64>,
}

impl From<&EraseOutcome> for EraseSummary {
    fn from(outcome: &EraseOutcome) -> Self {
        let mut summary = EraseSummary {
            state: outcome.state(),
            size: None,
            rotational: None,
            sweeps: Vec::new(),
            failed_pass: None,
            failed_offset: None,
        };

        match outcome {
            EraseOutcome::Done { device, sweeps } => {
                summary.size = Some(device.size);
                summary.rotational = Some(device.rotational);
                summary.sweeps = sweeps.clone();
            }
            EraseOutcome::Skipped { device, .. } => {
                summary.size = Some(device.size);
                summary.rotational = Some(device.rotational);
            }
            EraseOutcome::Failed { pass, offset, .. } => {
                summary.failed_pass = *pass;
                summary.failed_offset = Some(*offset);
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskReport {
    pub device: String,
    pub stable_id: String,
    pub filesystem: FilesystemKind,
    pub status: DiskStatus,
    pub stage: PipelineStage,
    pub erase: Option<EraseSummary>,
    pub advisory: Option<String>,
    pub previous_uuid: Option<String>,
    pub new_uuid: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DiskReport {
    fn started(disk: &DiskInfo, stable_id: String) -> Self {
        let now = Utc::now();
        Self {
            device: disk.device.clone(),
            stable_id,
            filesystem: disk.filesystem,
            status: DiskStatus::Failed,
            stage: PipelineStage::Erase,
            erase: None,
            advisory: None,
            previous_uuid: None,
            new_uuid: None,
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    /// Report for a worker that died without producing one
    fn worker_lost(disk: &DiskInfo, reason: String) -> Self {
        let mut report = Self::started(disk, crate::drives::unknown_identifier(&disk.device));
        report.error = Some(reason);
        report
    }

    fn fail(mut self, stage: PipelineStage, error: impl ToString) -> Self {
        self.status = DiskStatus::Failed;
        self.stage = stage;
        self.error = Some(error.to_string());
        self.finished_at = Utc::now();
        self
    }

    pub fn succeeded(&self) -> bool {
        self.status != DiskStatus::Failed
    }

    pub fn duration(&self) -> std::time::Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub disks: Vec<DiskReport>,
}

impl SessionReport {
    pub fn all_succeeded(&self) -> bool {
        self.disks.iter().all(DiskReport::succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.disks.iter().filter(|d| !d.succeeded()).count()
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self).map_err(std::io::Error::other)
    }
}

#[derive(Clone)]
pub struct DiskOrchestrator {
    engines: EngineFactory,
    tools: Arc<dyn DiskTools>,
    template: ErasePlan,
}

impl DiskOrchestrator {
    /// `template` supplies passes, block size and overrides; its device is
    /// replaced per disk.
    pub fn new(engines: EngineFactory, tools: Arc<dyn DiskTools>, template: ErasePlan) -> Self {
        Self {
            engines,
            tools,
            template,
        }
    }

    pub async fn run(&self, disks: Vec<DiskInfo>, schedule: Schedule) -> SessionReport {
        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%session_id, disks = disks.len(), ?schedule, "Session started");

        let disks = match schedule {
            Schedule::Concurrent => {
                let workers = disks.into_iter().map(|disk| self.spawn_worker(disk));
                join_all(workers).await
            }
            Schedule::Sequential => {
                let mut reports = Vec::with_capacity(disks.len());
                for disk in disks {
                    reports.push(self.spawn_worker(disk).await);
                }
                reports
            }
        };

        let report = SessionReport {
            session_id,
            started_at,
            finished_at: Utc::now(),
            disks,
        };
        tracing::info!(
            %session_id,
            failed = report.failed_count(),
            "Session finished"
        );
        report
    }

    /// Run one disk on the blocking pool and wait for its report
    async fn spawn_worker(&self, disk: DiskInfo) -> DiskReport {
        let engines = Arc::clone(&self.engines);
        let tools = Arc::clone(&self.tools);
        let plan = ErasePlan {
            device: disk.device.clone(),
            ..self.template.clone()
        };
        let owned = disk.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let engine = (*engines)(&owned);
            process_disk(&owned, &plan, engine, tools.as_ref())
        });

        match handle.await {
            Ok(report) => report,
            Err(e) => {
                let reason = if e.is_panic() {
                    "worker panicked".to_string()
                } else {
                    format!("worker cancelled: {}", e)
                };
                tracing::error!(device = %disk.device, "{}", reason);
                DiskReport::worker_lost(&disk, reason)
            }
        }
    }
}

/// Erase, partition and format one disk
pub fn process_disk(
    disk: &DiskInfo,
    plan: &ErasePlan,
    mut engine: EraseEngine,
    tools: &dyn DiskTools,
) -> DiskReport {
    let span = tracing::info_span!("disk", device = %disk.device);
    let _entered = span.enter();

    let stable_id = tools.identify(&disk.device);
    let mut report = DiskReport::started(disk, stable_id);
    report.previous_uuid = tools.partition_uuid(&disk.device);

    tracing::info!(
        target: AUDIT_TARGET,
        device = %disk.device,
        stable_id = %report.stable_id,
        previous_uuid = report.previous_uuid.as_deref().unwrap_or("none"),
        method = %plan.method,
        passes = plan.random_passes,
        "Erase started"
    );

    let outcome = engine.erase(plan);
    report.erase = Some(EraseSummary::from(&outcome));

    match outcome {
        EraseOutcome::Failed { error, .. } => {
            tracing::error!(target: AUDIT_TARGET, device = %disk.device, stable_id = %report.stable_id, error = %error, "Erase failed");
            return report.fail(PipelineStage::Erase, error);
        }
        EraseOutcome::Skipped { advisory, .. } => {
            tracing::warn!(target: AUDIT_TARGET, device = %disk.device, stable_id = %report.stable_id, "Erase skipped for solid-state media");
            report.status = DiskStatus::EraseSkipped;
            report.advisory = Some(advisory);
        }
        EraseOutcome::Done { sweeps, .. } => {
            tracing::info!(target: AUDIT_TARGET, device = %disk.device, stable_id = %report.stable_id, sweeps = sweeps.len(), "Erase complete");
            report.status = DiskStatus::Completed;
        }
    }

    report.stage = PipelineStage::Partition;
    if let Err(e) = tools.partition(&disk.device) {
        tracing::error!(device = %disk.device, error = %e, "Partitioning failed");
        return report.fail(PipelineStage::Partition, e);
    }

    report.stage = PipelineStage::Format;
    if let Err(e) = tools.format(&disk.device, disk.filesystem) {
        tracing::error!(device = %disk.device, error = %e, "Formatting failed");
        return report.fail(PipelineStage::Format, e);
    }

    report.new_uuid = tools.partition_uuid(&disk.device);
    report.stage = PipelineStage::Finished;
    report.finished_at = Utc::now();

    tracing::info!(
        target: AUDIT_TARGET,
        device = %disk.device,
        stable_id = %report.stable_id,
        filesystem = %disk.filesystem,
        "UUID {} => {}",
        report.previous_uuid.as_deref().unwrap_or("none"),
        report.new_uuid.as_deref().unwrap_or("none"),
    );

    report
}
