/// Mock drive infrastructure for testing
///
/// Builds a directory tree shaped like `/dev` and `/sys/block` so the real
/// inspector and engine run against regular files.
use diskscrub::drives::DeviceLayout;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Initial content of every mock drive, so untouched bytes are recognisable
pub const FILL_BYTE: u8 = 0xA5;

/// Simulated drive classes
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(dead_code)]
pub enum MockDriveType {
    /// `queue/rotational` = 1
    Hdd,
    /// `queue/rotational` = 0
    Ssd,
    /// No rotational attribute at all
    Unknown,
}

/// A fixture root holding any number of mock drives
pub struct MockDrives {
    _root: TempDir,
    pub layout: DeviceLayout,
}

#[allow(dead_code)]
impl MockDrives {
    pub fn new() -> std::io::Result<Self> {
        let root = TempDir::new()?;
        let layout = DeviceLayout::rooted_at(root.path());
        fs::create_dir_all(&layout.dev_dir)?;
        fs::create_dir_all(&layout.sys_block_dir)?;
        Ok(Self {
            _root: root,
            layout,
        })
    }

    /// Add a drive of `size` bytes filled with [`FILL_BYTE`]
    pub fn add(&self, id: &str, size: usize, drive_type: MockDriveType) -> std::io::Result<PathBuf> {
        let path = self.layout.device_path(id);
        fs::write(&path, vec![FILL_BYTE; size])?;

        let rotational = match drive_type {
            MockDriveType::Hdd => Some("1\n"),
            MockDriveType::Ssd => Some("0\n"),
            MockDriveType::Unknown => None,
        };
        if let Some(value) = rotational {
            let attr = self.layout.rotational_path(id);
            if let Some(parent) = attr.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(attr, value)?;
        }

        Ok(path)
    }

    pub fn add_hdd(&self, id: &str, size: usize) -> std::io::Result<PathBuf> {
        self.add(id, size, MockDriveType::Hdd)
    }

    pub fn add_ssd(&self, id: &str, size: usize) -> std::io::Result<PathBuf> {
        self.add(id, size, MockDriveType::Ssd)
    }

    pub fn path(&self, id: &str) -> PathBuf {
        self.layout.device_path(id)
    }

    pub fn read(&self, id: &str) -> std::io::Result<Vec<u8>> {
        fs::read(self.path(id))
    }

    /// Replace the drive's content, e.g. to reset it between runs
    pub fn reset(&self, id: &str, size: usize) -> std::io::Result<()> {
        fs::write(self.path(id), vec![FILL_BYTE; size])
    }

    pub fn root(&self) -> &Path {
        self._root.path()
    }
}
