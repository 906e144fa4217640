pub mod logging;
pub mod progress;


pub use logging::init_tracing;
pub use progress::{human_bytes, ProgressReporter};
