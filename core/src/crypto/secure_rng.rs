use anyhow::{anyhow, Result};
use ring::rand::{SecureRandom, SystemRandom};

/// Source of bytes for random passes.
///
/// Each erase worker owns its own source; nothing here is process-global.
pub trait EntropySource: Send {
    /// Fill buffer with random bytes
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()>;
    /// Get source name for logging
    fn name(&self) -> &str;
}

/// Ring-based system random (getrandom / OS CSPRNG)
pub struct SystemEntropy {
    rng: SystemRandom,
}

impl Default for SystemEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemEntropy {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl EntropySource for SystemEntropy {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        self.rng
            .fill(dest)
            .map_err(|_| anyhow!("ring SystemRandom failed"))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "SystemEntropy"
    }
}

/// FIPS 140-2 style continuous test: consecutive blocks must not repeat.
pub struct ContinuousTest {
    last_block: Option<[u8; 16]>,
    failure_count: u64,
}

impl Default for ContinuousTest {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinuousTest {
    pub fn new() -> Self {
        Self {
            last_block: None,
            failure_count: 0,
        }
    }

    /// Returns false when the leading 16 bytes equal those of the previous block
    pub fn test(&mut self, data: &[u8]) -> bool {
        // Blocks shorter than 16 bytes carry too little to compare
        if data.len() < 16 {
            return true;
        }

        let mut head = [0u8; 16];
        head.copy_from_slice(&data[..16]);

        if self.last_block == Some(head) {
            self.failure_count += 1;
            return false;
        }

        self.last_block = Some(head);
        true
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }
}

/// Wraps a source and rejects output that fails the continuous test
pub struct MonitoredSource<S> {
    inner: S,
    continuous_test: ContinuousTest,
}

impl<S: EntropySource> MonitoredSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            continuous_test: ContinuousTest::new(),
        }
    }
}

impl MonitoredSource<SystemEntropy> {
    pub fn system() -> Self {
        Self::new(SystemEntropy::new())
    }
}

impl<S: EntropySource> EntropySource for MonitoredSource<S> {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        self.inner.fill_bytes(dest)?;

        if !self.continuous_test.test(dest) {
            tracing::error!(
                source = self.inner.name(),
                failures = self.continuous_test.failure_count(),
                "Continuous RNG test failed: repeated output block"
            );
            return Err(anyhow!(
                "{} produced a repeated block (continuous test failed)",
                self.inner.name()
            ));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
