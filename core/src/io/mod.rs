pub mod pass_writer;

#[cfg(test)]
mod tests;

// Re-exports
pub use pass_writer::{PassResult, PassWriter};

use crate::BlockDevice;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};

/// An opened block device: one handle shared by every pass of an erase.
pub trait DeviceHandle: Read + Write + Seek + Send {
    /// Flush written data through to the device
    fn sync_data(&mut self) -> std::io::Result<()>;
}

impl DeviceHandle for File {
    fn sync_data(&mut self) -> std::io::Result<()> {
        File::sync_data(self)
    }
}

/// Opens devices for writing. Swappable so the engine can be driven against
/// instrumented handles.
pub trait DeviceOpener: Send + Sync {
    fn open(&self, device: &BlockDevice) -> std::io::Result<Box<dyn DeviceHandle>>;
}

/// Opens the device node read/write with `O_EXCL`, which on Linux refuses
/// block devices that are mounted or otherwise held open exclusively.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExclusiveOpener;

impl DeviceOpener for ExclusiveOpener {
    fn open(&self, device: &BlockDevice) -> std::io::Result<Box<dyn DeviceHandle>> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);

        #[cfg(target_os = "linux")]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_EXCL);
        }

        let file = options.open(&device.path)?;
        Ok(Box::new(file))
    }
}
