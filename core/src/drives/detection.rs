use crate::{BlockDevice, DriveResult, EraseError};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Mount points whose backing disk must never be erased
const SYSTEM_MOUNT_POINTS: [&str; 3] = ["/", "/boot", "/boot/efi"];

/// Mount point prefixes used by live-boot media, matched on whole components
const LIVE_MOUNT_ROOTS: [&str; 4] = ["/run/live", "/lib/live", "/live", "/cdrom"];

/// Where the kernel exposes device nodes and metadata.
///
/// Kept as a value so the inspector can run against a fixture tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLayout {
    pub dev_dir: PathBuf,
    pub sys_block_dir: PathBuf,
    pub proc_mounts: PathBuf,
}

impl Default for DeviceLayout {
    fn default() -> Self {
        Self {
            dev_dir: PathBuf::from("/dev"),
            sys_block_dir: PathBuf::from("/sys/block"),
            proc_mounts: PathBuf::from("/proc/mounts"),
        }
    }
}

impl DeviceLayout {
    /// Layout mirroring `/dev`, `/sys/block` and `/proc/mounts` under `root`
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            dev_dir: root.join("dev"),
            sys_block_dir: root.join("sys").join("block"),
            proc_mounts: root.join("proc").join("mounts"),
        }
    }

    pub fn device_path(&self, id: &str) -> PathBuf {
        self.dev_dir.join(id)
    }

    pub fn rotational_path(&self, id: &str) -> PathBuf {
        self.sys_block_dir.join(id).join("queue").join("rotational")
    }

    /// Node of the first partition: `sda1`, `nvme0n1p1`, `mmcblk0p1`
    pub fn partition_path(&self, id: &str) -> PathBuf {
        self.dev_dir.join(partition_name(id))
    }
}

pub fn partition_name(id: &str) -> String {
    if id.chars().last().is_some_and(|c| c.is_ascii_digit()) {
        format!("{}p1", id)
    } else {
        format!("{}1", id)
    }
}

/// Resolves size and rotational class of block devices
#[derive(Debug, Clone, Default)]
pub struct DeviceInspector {
    layout: DeviceLayout,
}

impl DeviceInspector {
    pub fn new(layout: DeviceLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DeviceLayout {
        &self.layout
    }

    /// Resolve a device once for an erase operation.
    ///
    /// An unreadable rotational attribute is not fatal: the device is treated
    /// as rotational so it still gets overwritten.
    pub fn inspect(&self, id: &str) -> DriveResult<BlockDevice> {
        let id = normalize_device_id(id)?;
        let size = self.device_size(&id)?;

        let rotational = match self.is_rotational(&id) {
            Ok(rotational) => rotational,
            Err(e) => {
                tracing::warn!(device = %id, error = %e, "Rotational class unknown, treating as rotational");
                true
            }
        };

        tracing::debug!(device = %id, size, rotational, "Device inspected");

        Ok(BlockDevice {
            path: self.layout.device_path(&id),
            id,
            size,
            rotational,
        })
    }

    /// Size in bytes, measured by seeking to the end of the device node
    pub fn device_size(&self, id: &str) -> DriveResult<u64> {
        let path = self.layout.device_path(id);
        let mut file = File::open(&path).map_err(|source| EraseError::DeviceOpen {
            device: id.to_string(),
            source,
        })?;

        file.seek(SeekFrom::End(0))
            .map_err(|source| EraseError::SizeQuery {
                device: id.to_string(),
                source,
            })
    }

    /// `true` for spinning disks, read from `queue/rotational`
    pub fn is_rotational(&self, id: &str) -> DriveResult<bool> {
        let path = self.layout.rotational_path(id);
        let raw = fs::read_to_string(&path).map_err(|e| EraseError::RotationalQuery {
            device: id.to_string(),
            detail: format!("{}: {}", path.display(), e),
        })?;

        let value: i64 = raw.trim().parse().map_err(|_| EraseError::RotationalQuery {
            device: id.to_string(),
            detail: format!("unexpected content {:?} in {}", raw.trim(), path.display()),
        })?;

        Ok(value != 0)
    }

    /// Whether the disk backs the running system (root, boot or live medium).
    ///
    /// A partition name is checked against its parent disk.
    pub fn is_system_disk(&self, id: &str) -> std::io::Result<bool> {
        let mounts = fs::read_to_string(&self.layout.proc_mounts)?;
        Ok(system_disks_from_mounts(&mounts).contains(&base_disk(id)))
    }

    /// Mount points of any partition of the disk
    pub fn mount_points(&self, id: &str) -> std::io::Result<Vec<String>> {
        let disk = base_disk(id);
        let mounts = fs::read_to_string(&self.layout.proc_mounts)?;
        Ok(parse_mounts(&mounts)
            .filter(|(name, _)| *name == disk)
            .map(|(_, mount_point)| mount_point.to_string())
            .collect())
    }
}

/// Accept `sda` or `/dev/sda`; reject anything that is not a plain kernel name
pub fn normalize_device_id(raw: &str) -> DriveResult<String> {
    let id = raw.trim();
    let id = id.strip_prefix("/dev/").unwrap_or(id);

    if id.is_empty() {
        return Err(EraseError::InvalidInput("empty device identifier".to_string()));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(EraseError::InvalidInput(format!(
            "'{}' is not a valid device identifier",
            raw.trim()
        )));
    }

    Ok(id.to_string())
}

/// Check if device is a virtual or optical device that must not be selected
pub(crate) fn should_skip_device(device_name: &str) -> bool {
    device_name.starts_with("loop")
        || device_name.starts_with("ram")
        || device_name.starts_with("dm-")
        || device_name.starts_with("sr")
        || device_name.starts_with("zram")
}

/// Strip the partition suffix: `sda1` → `sda`, `nvme0n1p2` → `nvme0n1`
pub fn base_disk(name: &str) -> String {
    static PARTITIONED: OnceLock<Regex> = OnceLock::new();
    static PLAIN: OnceLock<Regex> = OnceLock::new();

    let partitioned = PARTITIONED.get_or_init(|| {
        Regex::new(r"^((?:nvme\d+n\d+)|(?:mmcblk\d+)|(?:md\d+)|(?:nbd\d+))(?:p\d+)?$")
            .expect("static regex")
    });
    if let Some(caps) = partitioned.captures(name) {
        return caps[1].to_string();
    }

    let plain = PLAIN.get_or_init(|| Regex::new(r"^([a-z]+?)\d*$").expect("static regex"));
    match plain.captures(name) {
        Some(caps) => caps[1].to_string(),
        None => name.to_string(),
    }
}

/// `sda1`, `nvme0n1p2`: a partition rather than a whole disk
pub fn is_partition(name: &str) -> bool {
    base_disk(name) != name
}

fn is_live_mount(mount_point: &str) -> bool {
    LIVE_MOUNT_ROOTS.iter().any(|root| {
        mount_point
            .strip_prefix(root)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// `(base disk, mount point)` for every `/dev/…` entry of a mounts table
fn parse_mounts<'a>(mounts: &'a str) -> impl Iterator<Item = (String, &'a str)> + 'a {
    mounts.lines().filter_map(|line| {
        let mut parts = line.split_whitespace();
        let source = parts.next()?;
        let mount_point = parts.next()?;
        let name = source.strip_prefix("/dev/")?;
        // LVM and dm targets do not map back to a single disk by name
        if name.starts_with("mapper/") || name.starts_with("dm-") {
            return None;
        }
        Some((base_disk(name), mount_point))
    })
}

pub(crate) fn system_disks_from_mounts(mounts: &str) -> BTreeSet<String> {
    parse_mounts(mounts)
        .filter(|(_, mount_point)| {
            SYSTEM_MOUNT_POINTS.contains(mount_point) || is_live_mount(mount_point)
        })
        .map(|(disk, _)| disk)
        .collect()
}
