/// Common test helper functions: content checks, deterministic entropy,
/// instrumented device handles and a scripted disk tool set.
use diskscrub::crypto::EntropySource;
use diskscrub::io::{DeviceHandle, DeviceOpener};
use diskscrub::provisioning::DiskTools;
use diskscrub::{BlockDevice, DriveResult, EraseError, FilesystemKind};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Verify that a file contains only zeros
#[allow(dead_code)]
pub fn verify_all_zeros(path: &Path) -> std::io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = vec![0u8; 4096];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        if buffer[..bytes_read].iter().any(|&b| b != 0) {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Shannon entropy in bits per byte
#[allow(dead_code)]
pub fn calculate_entropy(data: &[u8]) -> f64 {
    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }

    let length = data.len() as f64;
    counts
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let probability = count as f64 / length;
            -probability * probability.log2()
        })
        .sum()
}

/// Reproducible entropy source; the same seed yields the same pass data
pub struct SeededEntropy(StdRng);

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    /// Seed derived from a device name
    #[allow(dead_code)]
    pub fn for_device(device: &str) -> Self {
        let seed = device
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |hash, b| {
                (hash ^ b as u64).wrapping_mul(0x0100_0000_01b3)
            });
        Self::new(seed)
    }
}

impl EntropySource for SeededEntropy {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> anyhow::Result<()> {
        self.0.fill_bytes(dest);
        Ok(())
    }

    fn name(&self) -> &str {
        "seeded"
    }
}

/// One write call seen by a [`RecordingHandle`]
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    /// 1-based sweep number
    pub sweep: usize,
    pub offset: u64,
    pub len: usize,
    pub all_zero: bool,
}

/// Write failure injected at `offset` during sweep `sweep`
#[derive(Debug, Clone, Copy)]
pub struct FailurePoint {
    pub sweep: usize,
    pub offset: u64,
}

/// File-backed handle that records writes; a seek to offset 0 starts a sweep
pub struct RecordingHandle {
    file: File,
    log: Arc<Mutex<Vec<WriteRecord>>>,
    sweep: usize,
    pending_sweep: bool,
    failure: Option<FailurePoint>,
}

impl Read for RecordingHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for RecordingHandle {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        if pos == SeekFrom::Start(0) {
            self.pending_sweep = true;
        }
        self.file.seek(pos)
    }
}

impl Write for RecordingHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.pending_sweep {
            self.sweep += 1;
            self.pending_sweep = false;
        }

        let offset = self.file.stream_position()?;
        let mut len = buf.len();
        if let Some(failure) = self.failure {
            if failure.sweep == self.sweep && offset + len as u64 > failure.offset {
                if offset >= failure.offset {
                    return Err(std::io::Error::other("simulated media error"));
                }
                len = (failure.offset - offset) as usize;
            }
        }

        let written = self.file.write(&buf[..len])?;
        self.log.lock().unwrap().push(WriteRecord {
            sweep: self.sweep,
            offset,
            len: written,
            all_zero: buf[..written].iter().all(|&b| b == 0),
        });
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl DeviceHandle for RecordingHandle {
    fn sync_data(&mut self) -> std::io::Result<()> {
        self.file.sync_data()
    }
}

#[derive(Default)]
pub struct RecordingOpener {
    pub log: Arc<Mutex<Vec<WriteRecord>>>,
    pub failure: Option<FailurePoint>,
}

#[allow(dead_code)]
impl RecordingOpener {
    pub fn failing_at(sweep: usize, offset: u64) -> Self {
        Self {
            failure: Some(FailurePoint { sweep, offset }),
            ..Default::default()
        }
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.log.lock().unwrap().clone()
    }

    /// Write lengths grouped by sweep
    pub fn sweeps(&self) -> Vec<Vec<usize>> {
        let mut sweeps: Vec<Vec<usize>> = Vec::new();
        for record in self.writes() {
            if sweeps.len() < record.sweep {
                sweeps.resize(record.sweep, Vec::new());
            }
            sweeps[record.sweep - 1].push(record.len);
        }
        sweeps
    }
}

impl DeviceOpener for RecordingOpener {
    fn open(&self, device: &BlockDevice) -> std::io::Result<Box<dyn DeviceHandle>> {
        let file = OpenOptions::new().read(true).write(true).open(&device.path)?;
        Ok(Box::new(RecordingHandle {
            file,
            log: Arc::clone(&self.log),
            sweep: 0,
            pending_sweep: false,
            failure: self.failure,
        }))
    }
}

/// Disk tools that succeed without touching anything and record each call
#[derive(Default)]
#[allow(dead_code)]
pub struct FakeDiskTools {
    pub calls: Mutex<Vec<String>>,
    /// Devices whose partitioning fails
    pub failing_partitions: Vec<String>,
}

#[allow(dead_code)]
impl FakeDiskTools {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DiskTools for FakeDiskTools {
    fn partition(&self, device: &str) -> DriveResult<()> {
        self.record(format!("partition {}", device));
        if self.failing_partitions.iter().any(|d| d == device) {
            return Err(EraseError::ExternalTool {
                tool: "parted".to_string(),
                device: device.to_string(),
                detail: "exit status 1".to_string(),
            });
        }
        Ok(())
    }

    fn format(&self, device: &str, kind: FilesystemKind) -> DriveResult<()> {
        self.record(format!("format {} {}", device, kind));
        Ok(())
    }

    fn identify(&self, device: &str) -> String {
        format!("SERIAL_{}", device)
    }

    fn partition_uuid(&self, _device: &str) -> Option<String> {
        None
    }

    fn list_disks(&self) -> DriveResult<String> {
        Ok(String::new())
    }
}
