use super::detection::{base_disk, is_partition, normalize_device_id, should_skip_device};
use crate::{DriveResult, EraseError};

/// Parse a comma-separated device list such as `sda, /dev/sdb`.
///
/// Duplicates are rejected rather than collapsed: two workers must never be
/// handed the same disk.
pub fn parse_device_list(input: &str) -> DriveResult<Vec<String>> {
    let mut devices = Vec::new();

    for raw in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id = normalize_device_id(raw)?;

        if should_skip_device(&id) {
            return Err(EraseError::InvalidInput(format!(
                "'{}' is a virtual or optical device",
                id
            )));
        }

        if is_partition(&id) {
            return Err(EraseError::InvalidInput(format!(
                "'{}' is a partition; name the whole disk ({})",
                id,
                base_disk(&id)
            )));
        }

        if devices.contains(&id) {
            return Err(EraseError::InvalidInput(format!(
                "device '{}' listed more than once",
                id
            )));
        }

        devices.push(id);
    }

    if devices.is_empty() {
        return Err(EraseError::InvalidInput("no devices selected".to_string()));
    }

    Ok(devices)
}
