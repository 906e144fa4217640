/// Stable disk naming from `udevadm info --query=property` output.
///
/// Preference: WWN, short serial, model plus kernel name, then a placeholder.
pub fn parse_udev_identifier(udev_properties: &str, device: &str) -> String {
    let property = |key: &str| {
        udev_properties.lines().find_map(|line| {
            let (k, v) = line.trim().split_once('=')?;
            let v = v.trim();
            (k == key && !v.is_empty()).then(|| v.to_string())
        })
    };

    if let Some(wwn) = property("ID_WWN") {
        return wwn;
    }
    if let Some(serial) = property("ID_SERIAL_SHORT") {
        return serial;
    }
    if let Some(model) = property("ID_MODEL") {
        return format!("{}_{}", model, device);
    }

    unknown_identifier(device)
}

pub fn unknown_identifier(device: &str) -> String {
    format!("UNKNOWN_{}", device)
}
