// Disk Tools - partitioning, formatting, listing and identification through
// parted, mkfs.*, lsblk, udevadm and blkid.

use super::command::{run_checked, CommandRunner, SystemCommandRunner, ToolOutput};
use crate::drives::detection::should_skip_device;
use crate::drives::{parse_udev_identifier, unknown_identifier, DeviceLayout};
use crate::{DriveResult, EraseError, FilesystemKind};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long `format` waits for the kernel to create the partition node
pub const PARTITION_NODE_TIMEOUT: Duration = Duration::from_secs(10);

const PARTITION_NODE_POLL: Duration = Duration::from_millis(250);

/// Operations on a disk that are delegated to external programs
#[cfg_attr(test, mockall::automock)]
pub trait DiskTools: Send + Sync {
    /// Write a fresh GPT label with one partition spanning the disk
    fn partition(&self, device: &str) -> DriveResult<()>;

    /// Create a filesystem on the first partition
    fn format(&self, device: &str, kind: FilesystemKind) -> DriveResult<()>;

    /// Stable identifier (WWN, serial or model); never fails
    fn identify(&self, device: &str) -> String;

    /// UUID of the first partition, if it has one
    fn partition_uuid(&self, device: &str) -> Option<String>;

    /// Raw disk listing text
    fn list_disks(&self) -> DriveResult<String>;
}

/// One row of the disk listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskEntry {
    pub name: String,
    pub size: String,
    pub kind: String,
    pub model: String,
}

/// Parse `lsblk -d -n -o NAME,SIZE,TYPE,MODEL` output. Virtual devices are
/// dropped; missing columns are left empty.
pub fn parse_disk_list(output: &str) -> Vec<DiskEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?.to_string();
            if should_skip_device(&name) {
                return None;
            }
            let size = fields.next().unwrap_or_default().to_string();
            let kind = fields.next().unwrap_or_default().to_string();
            let model = fields.collect::<Vec<_>>().join(" ");
            Some(DiskEntry {
                name,
                size,
                kind,
                model,
            })
        })
        .collect()
}

pub struct SystemDiskTools {
    runner: Arc<dyn CommandRunner>,
    layout: DeviceLayout,
    node_timeout: Duration,
}

impl Default for SystemDiskTools {
    fn default() -> Self {
        Self::new(Arc::new(SystemCommandRunner), DeviceLayout::default())
    }
}

impl SystemDiskTools {
    pub fn new(runner: Arc<dyn CommandRunner>, layout: DeviceLayout) -> Self {
        Self {
            runner,
            layout,
            node_timeout: PARTITION_NODE_TIMEOUT,
        }
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    fn device_arg(&self, device: &str) -> String {
        self.layout.device_path(device).display().to_string()
    }

    fn run_tool(&self, tool: &str, device: &str, args: Vec<String>) -> DriveResult<ToolOutput> {
        run_checked(self.runner.as_ref(), tool, device, &args)
    }

    /// Poll until the first partition node exists
    fn wait_for_partition(&self, device: &str) -> DriveResult<PathBuf> {
        let node = self.layout.partition_path(device);
        let deadline = Instant::now() + self.node_timeout;

        loop {
            if node.exists() {
                return Ok(node);
            }
            if Instant::now() >= deadline {
                return Err(EraseError::ExternalTool {
                    tool: "udev".to_string(),
                    device: device.to_string(),
                    detail: format!(
                        "partition node {} did not appear within {}",
                        node.display(),
                        humantime::format_duration(self.node_timeout)
                    ),
                });
            }
            std::thread::sleep(PARTITION_NODE_POLL.min(self.node_timeout));
        }
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl DiskTools for SystemDiskTools {
    fn partition(&self, device: &str) -> DriveResult<()> {
        let path = self.device_arg(device);

        self.run_tool("parted", device, args(&[&path, "--script", "mklabel", "gpt"]))?;
        self.run_tool(
            "parted",
            device,
            args(&[&path, "--script", "mkpart", "primary", "0%", "100%"]),
        )?;

        tracing::info!(device = %device, "Partition table created");
        Ok(())
    }

    fn format(&self, device: &str, kind: FilesystemKind) -> DriveResult<()> {
        let node = self.wait_for_partition(device)?;
        let partition = node.display().to_string();

        let (tool, tool_args) = match kind {
            FilesystemKind::Ntfs => ("mkfs.ntfs", args(&["-f", &partition])),
            FilesystemKind::Ext4 => ("mkfs.ext4", args(&["-F", &partition])),
            FilesystemKind::Vfat => ("mkfs.vfat", args(&["-F", "32", &partition])),
        };

        self.run_tool(tool, device, tool_args)?;
        tracing::info!(device = %device, partition = %partition, filesystem = %kind, "Partition formatted");
        Ok(())
    }

    fn identify(&self, device: &str) -> String {
        let query = args(&[
            "info",
            "--query=property",
            &format!("--name={}", self.device_arg(device)),
        ]);

        match self.run_tool("udevadm", device, query) {
            Ok(output) => parse_udev_identifier(&output.stdout, device),
            Err(e) => {
                tracing::warn!(device = %device, error = %e, "Cannot read udev properties");
                unknown_identifier(device)
            }
        }
    }

    fn partition_uuid(&self, device: &str) -> Option<String> {
        let partition = self.layout.partition_path(device).display().to_string();

        // blkid exits 2 when the partition has no recognisable filesystem
        let output = self
            .run_tool("blkid", device, args(&["-s", "UUID", "-o", "value", &partition]))
            .ok()?;
        let uuid = output.stdout.trim();
        (!uuid.is_empty()).then(|| uuid.to_string())
    }

    fn list_disks(&self) -> DriveResult<String> {
        let detailed = self.run_tool(
            "lsblk",
            "all",
            args(&["-d", "-n", "-o", "NAME,SIZE,TYPE,MODEL"]),
        )?;
        if !detailed.stdout.trim().is_empty() {
            return Ok(detailed.stdout.trim_end().to_string());
        }

        let names = self.run_tool("lsblk", "all", args(&["-d", "-n", "-o", "NAME"]))?;
        if names.stdout.trim().is_empty() {
            tracing::info!("No disks detected; check permissions");
        }
        Ok(names.stdout.trim_end().to_string())
    }
}
