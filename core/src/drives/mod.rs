// Drive inspection and selection
//
// - detection.rs: size, rotational class and system-disk checks
// - selection.rs: parsing user-supplied device lists
// - identity.rs: stable identifiers from udev properties

pub mod detection;
pub mod identity;
pub mod selection;


pub use detection::{base_disk, normalize_device_id, partition_name, DeviceInspector, DeviceLayout};
pub use identity::{parse_udev_identifier, unknown_identifier};
pub use selection::parse_device_list;
