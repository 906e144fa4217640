pub mod command;
pub mod tools;


pub use command::{run_checked, CommandRunner, SystemCommandRunner, ToolOutput};
pub use tools::{parse_disk_list, DiskEntry, DiskTools, SystemDiskTools};

#[cfg(test)]
pub use tools::MockDiskTools;
