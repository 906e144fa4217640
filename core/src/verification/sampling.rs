// Post-wipe sampling: re-read windows at random offsets and check that the
// zero pass actually reached the media. The first and last window are always
// part of the sample.

use rand::{Rng, RngCore};
use std::io::{Read, Seek, SeekFrom};

/// Summary of a sampled read-back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleReport {
    pub samples_checked: usize,
    pub bytes_checked: u64,
    /// Device offset of the first non-zero byte seen, if any
    pub first_nonzero: Option<u64>,
}

impl SampleReport {
    pub fn all_zero(&self) -> bool {
        self.first_nonzero.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SampleVerifier {
    samples: usize,
    window: usize,
}

impl SampleVerifier {
    pub fn new(samples: usize, window: usize) -> Self {
        Self {
            samples,
            window: window.max(1),
        }
    }

    /// Offsets to read: start and end of the device, then random positions
    pub fn sample_offsets(&self, size: u64, rng: &mut dyn RngCore) -> Vec<u64> {
        if size == 0 || self.samples == 0 {
            return Vec::new();
        }

        let last_start = size.saturating_sub(self.window as u64);
        let mut offsets = vec![0];
        if last_start > 0 && self.samples > 1 {
            offsets.push(last_start);
        }
        while offsets.len() < self.samples {
            offsets.push(rng.gen_range(0..=last_start));
        }
        offsets
    }

    pub fn verify_zeroed<R>(
        &self,
        handle: &mut R,
        size: u64,
        rng: &mut dyn RngCore,
    ) -> std::io::Result<SampleReport>
    where
        R: Read + Seek + ?Sized,
    {
        let mut buffer = vec![0u8; self.window];
        let mut report = SampleReport {
            samples_checked: 0,
            bytes_checked: 0,
            first_nonzero: None,
        };

        for offset in self.sample_offsets(size, rng) {
            let len = (size - offset).min(self.window as u64) as usize;
            handle.seek(SeekFrom::Start(offset))?;
            handle.read_exact(&mut buffer[..len])?;

            report.samples_checked += 1;
            report.bytes_checked += len as u64;

            if let Some(pos) = buffer[..len].iter().position(|&b| b != 0x00) {
                report.first_nonzero = Some(offset + pos as u64);
                break;
            }
        }

        Ok(report)
    }
}
