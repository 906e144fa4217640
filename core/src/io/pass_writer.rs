// Pass Writer - one full sweep of random or zero data over a device
//
// Writes strictly sequentially from offset 0 in `block_size` chunks. The last
// chunk is truncated to what remains, so nothing is written past the end of
// the device. Accounting is per byte: the reported count is what the device
// accepted, and anything short of the full size is a failed pass.

use super::DeviceHandle;
use crate::crypto::EntropySource;
use crate::{BlockDevice, DriveResult, EraseError, PassIndex, PassPattern};
use indicatif::ProgressBar;
use std::io::{ErrorKind, SeekFrom};
use std::time::{Duration, Instant};

/// Outcome of one sweep
#[derive(Debug)]
pub struct PassResult {
    pub pass: PassIndex,
    pub device_size: u64,
    /// Bytes accepted by the device; on failure, the offset reached
    pub bytes_written: u64,
    /// Completed chunks (a chunk interrupted by an error is not counted)
    pub chunks: u64,
    pub error: Option<std::io::Error>,
    pub elapsed: Duration,
}

impl PassResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.bytes_written == self.device_size
    }

    /// Convert a failed pass into the error reported for the device
    pub fn into_error(self, device: &str) -> Option<EraseError> {
        if self.succeeded() {
            return None;
        }

        let source = self.error.unwrap_or_else(|| {
            std::io::Error::new(
                ErrorKind::WriteZero,
                format!(
                    "short pass: {} of {} bytes",
                    self.bytes_written, self.device_size
                ),
            )
        });

        Some(EraseError::Write {
            device: device.to_string(),
            pass: self.pass,
            offset: self.bytes_written,
            source,
        })
    }
}

pub struct PassWriter {
    block_size: usize,
    buffer: Vec<u8>,
}

impl PassWriter {
    pub fn new(block_size: usize) -> DriveResult<Self> {
        if block_size == 0 {
            return Err(EraseError::InvalidInput(
                "block size must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            block_size,
            buffer: vec![0u8; block_size],
        })
    }

    /// Sweep the whole device once with the pattern of `pass`.
    ///
    /// Aborts on the first error; the result then carries the offset reached.
    pub fn write_pass(
        &mut self,
        handle: &mut dyn DeviceHandle,
        device: &BlockDevice,
        pass: PassIndex,
        rng: &mut dyn EntropySource,
        progress: &ProgressBar,
    ) -> PassResult {
        let start = Instant::now();
        let size = device.size;
        let pattern = pass.pattern();

        let mut offset = 0u64;
        let mut chunks = 0u64;

        let finish = |offset: u64, chunks: u64, error: Option<std::io::Error>| PassResult {
            pass,
            device_size: size,
            bytes_written: offset,
            chunks,
            error,
            elapsed: start.elapsed(),
        };

        if let Err(e) = handle.seek(SeekFrom::Start(0)) {
            return finish(0, 0, Some(e));
        }

        if pattern == PassPattern::ZeroBytes {
            // Filled once; the zero buffer is never mutated during the sweep
            self.buffer.fill(0x00);
        }

        while offset < size {
            let len = (size - offset).min(self.block_size as u64) as usize;
            let chunk = &mut self.buffer[..len];

            if pattern == PassPattern::RandomBytes {
                if let Err(e) = rng.fill_bytes(chunk) {
                    let error = std::io::Error::other(format!(
                        "random source {} failed: {}",
                        rng.name(),
                        e
                    ));
                    return finish(offset, chunks, Some(error));
                }
            }

            let mut done = 0usize;
            while done < len {
                match handle.write(&chunk[done..]) {
                    Ok(0) => {
                        let error = std::io::Error::new(
                            ErrorKind::WriteZero,
                            "device accepted no bytes",
                        );
                        return finish(offset, chunks, Some(error));
                    }
                    Ok(n) => {
                        done += n;
                        offset += n as u64;
                        progress.inc(n as u64);
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return finish(offset, chunks, Some(e)),
                }
            }

            chunks += 1;
        }

        if let Err(e) = handle.flush().and_then(|_| handle.sync_data()) {
            tracing::error!(device = %device.id, %pass, error = %e, "Sync after pass failed");
            return finish(offset, chunks, Some(e));
        }

        progress.finish();
        finish(offset, chunks, None)
    }
}
