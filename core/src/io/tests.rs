#[cfg(test)]
mod tests {
    use crate::crypto::EntropySource;
    use crate::io::{DeviceHandle, PassWriter};
    use crate::{BlockDevice, EraseError, PassIndex};
    use indicatif::ProgressBar;
    use proptest::prelude::*;
    use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom, Write};
    use std::path::PathBuf;

    /// In-memory device that records the size of every write call
    struct MemoryDevice {
        data: Cursor<Vec<u8>>,
        writes: Vec<usize>,
        /// Largest number of bytes accepted per write call
        max_write: usize,
        /// Fail with EIO once this offset is reached
        fail_at: Option<u64>,
        /// Return `Interrupted` this many times before accepting data
        interrupts: usize,
        fail_sync: bool,
        synced: bool,
    }

    impl MemoryDevice {
        fn new(size: usize) -> Self {
            Self {
                data: Cursor::new(vec![0xEE; size]),
                writes: Vec::new(),
                max_write: usize::MAX,
                fail_at: None,
                interrupts: 0,
                fail_sync: false,
                synced: false,
            }
        }

        fn contents(&self) -> &[u8] {
            self.data.get_ref()
        }
    }

    impl Read for MemoryDevice {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl Seek for MemoryDevice {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.data.seek(pos)
        }
    }

    impl Write for MemoryDevice {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.interrupts > 0 {
                self.interrupts -= 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            let position = self.data.position();
            let mut len = buf.len().min(self.max_write);
            if let Some(limit) = self.fail_at {
                if position >= limit {
                    return Err(std::io::Error::other("EIO"));
                }
                len = len.min((limit - position) as usize);
            }
            self.writes.push(len);
            self.data.write(&buf[..len])
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl DeviceHandle for MemoryDevice {
        fn sync_data(&mut self) -> std::io::Result<()> {
            if self.fail_sync {
                return Err(std::io::Error::other("fsync failed"));
            }
            self.synced = true;
            Ok(())
        }
    }

    /// Deterministic non-zero byte stream
    struct CountingEntropy(u8);

    impl EntropySource for CountingEntropy {
        fn fill_bytes(&mut self, dest: &mut [u8]) -> anyhow::Result<()> {
            for byte in dest.iter_mut() {
                self.0 = self.0.wrapping_add(1).max(1);
                *byte = self.0;
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    /// Panics if a zero pass asks for random data
    struct UnusedEntropy;

    impl EntropySource for UnusedEntropy {
        fn fill_bytes(&mut self, _dest: &mut [u8]) -> anyhow::Result<()> {
            panic!("zero pass must not draw random bytes");
        }

        fn name(&self) -> &str {
            "unused"
        }
    }

    fn block_device(size: u64) -> BlockDevice {
        BlockDevice {
            id: "mem0".to_string(),
            path: PathBuf::from("/dev/mem0"),
            size,
            rotational: true,
        }
    }

    const FIRST: PassIndex = PassIndex::Random {
        number: 1,
        total: 1,
    };

    #[test]
    fn test_random_pass_chunks_and_accounting() {
        let mut device = MemoryDevice::new(10_000);
        let mut writer = PassWriter::new(4096).unwrap();

        let result = writer.write_pass(
            &mut device,
            &block_device(10_000),
            FIRST,
            &mut CountingEntropy(0),
            &ProgressBar::hidden(),
        );

        assert!(result.succeeded());
        assert_eq!(result.bytes_written, 10_000);
        assert_eq!(result.chunks, 3);
        assert_eq!(device.writes, vec![4096, 4096, 1808]);
        assert!(device.contents().iter().all(|&b| b != 0));
        assert!(device.synced);
    }

    #[test]
    fn test_zero_pass_writes_zeros_without_entropy() {
        let mut device = MemoryDevice::new(9000);
        let mut writer = PassWriter::new(4096).unwrap();

        // A random pass first leaves random data in the buffer
        writer.write_pass(
            &mut device,
            &block_device(9000),
            FIRST,
            &mut CountingEntropy(0),
            &ProgressBar::hidden(),
        );
        let result = writer.write_pass(
            &mut device,
            &block_device(9000),
            PassIndex::Zero,
            &mut UnusedEntropy,
            &ProgressBar::hidden(),
        );

        assert!(result.succeeded());
        assert!(device.contents().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pass_starts_at_offset_zero() {
        let mut device = MemoryDevice::new(100);
        device.seek(SeekFrom::Start(60)).unwrap();
        let mut writer = PassWriter::new(64).unwrap();

        let result = writer.write_pass(
            &mut device,
            &block_device(100),
            PassIndex::Zero,
            &mut UnusedEntropy,
            &ProgressBar::hidden(),
        );

        assert!(result.succeeded());
        assert_eq!(device.writes, vec![64, 36]);
        assert!(device.contents().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_nothing_written_past_device_size() {
        // Backing store larger than the resolved size
        let mut device = MemoryDevice::new(8192);
        let mut writer = PassWriter::new(4096).unwrap();

        writer.write_pass(
            &mut device,
            &block_device(5000),
            PassIndex::Zero,
            &mut UnusedEntropy,
            &ProgressBar::hidden(),
        );

        assert!(device.contents()[..5000].iter().all(|&b| b == 0));
        assert!(device.contents()[5000..].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_partial_writes_are_counted() {
        let mut device = MemoryDevice::new(4096);
        device.max_write = 1000;
        let mut writer = PassWriter::new(4096).unwrap();

        let result = writer.write_pass(
            &mut device,
            &block_device(4096),
            PassIndex::Zero,
            &mut UnusedEntropy,
            &ProgressBar::hidden(),
        );

        assert!(result.succeeded());
        assert_eq!(result.chunks, 1);
        assert_eq!(device.writes, vec![1000, 1000, 1000, 1000, 96]);
    }

    #[test]
    fn test_interrupted_write_is_reissued() {
        let mut device = MemoryDevice::new(4096);
        device.interrupts = 2;
        let mut writer = PassWriter::new(4096).unwrap();

        let result = writer.write_pass(
            &mut device,
            &block_device(4096),
            PassIndex::Zero,
            &mut UnusedEntropy,
            &ProgressBar::hidden(),
        );

        assert!(result.succeeded());
        assert_eq!(device.writes, vec![4096]);
    }

    #[test]
    fn test_write_error_stops_at_offset() {
        let mut device = MemoryDevice::new(10_000);
        device.fail_at = Some(6000);
        let mut writer = PassWriter::new(4096).unwrap();

        let result = writer.write_pass(
            &mut device,
            &block_device(10_000),
            FIRST,
            &mut CountingEntropy(0),
            &ProgressBar::hidden(),
        );

        assert!(!result.succeeded());
        assert_eq!(result.bytes_written, 6000);
        assert_eq!(result.chunks, 1);
        assert!(!device.synced);

        match result.into_error("mem0") {
            Some(EraseError::Write {
                device,
                pass,
                offset,
                ..
            }) => {
                assert_eq!(device, "mem0");
                assert_eq!(pass, FIRST);
                assert_eq!(offset, 6000);
            }
            other => panic!("expected write error, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_sync_fails_pass() {
        let mut device = MemoryDevice::new(4096);
        device.fail_sync = true;
        let mut writer = PassWriter::new(4096).unwrap();

        let result = writer.write_pass(
            &mut device,
            &block_device(4096),
            PassIndex::Zero,
            &mut UnusedEntropy,
            &ProgressBar::hidden(),
        );

        assert!(!result.succeeded());
        assert_eq!(result.bytes_written, 4096);
        assert!(result.into_error("mem0").is_some());
    }

    #[test]
    fn test_empty_device_is_trivially_complete() {
        let mut device = MemoryDevice::new(0);
        let mut writer = PassWriter::new(4096).unwrap();

        let result = writer.write_pass(
            &mut device,
            &block_device(0),
            FIRST,
            &mut CountingEntropy(0),
            &ProgressBar::hidden(),
        );

        assert!(result.succeeded());
        assert_eq!(result.chunks, 0);
        assert!(device.writes.is_empty());
    }

    #[test]
    fn test_progress_counts_bytes() {
        let mut device = MemoryDevice::new(10_000);
        let mut writer = PassWriter::new(4096).unwrap();
        let bar = ProgressBar::hidden();
        bar.set_length(10_000);

        writer.write_pass(
            &mut device,
            &block_device(10_000),
            PassIndex::Zero,
            &mut UnusedEntropy,
            &bar,
        );

        assert_eq!(bar.position(), 10_000);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(matches!(
            PassWriter::new(0),
            Err(EraseError::InvalidInput(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_pass_writes_exact_chunks(size in 0u64..40_000, block in 1usize..9000) {
            let mut device = MemoryDevice::new(size as usize);
            let mut writer = PassWriter::new(block).unwrap();

            let result = writer.write_pass(
                &mut device,
                &block_device(size),
                PassIndex::Zero,
                &mut UnusedEntropy,
                &ProgressBar::hidden(),
            );

            let block = block as u64;
            let expected_chunks = size.div_ceil(block);
            prop_assert!(result.succeeded());
            prop_assert_eq!(result.bytes_written, size);
            prop_assert_eq!(result.chunks, expected_chunks);
            prop_assert_eq!(device.writes.len() as u64, expected_chunks);

            if let Some(&last) = device.writes.last() {
                let expected_last = if size % block == 0 { block } else { size % block };
                prop_assert_eq!(last as u64, expected_last);
            }
        }
    }
}
