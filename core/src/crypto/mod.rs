pub mod secure_rng;


// Re-export
pub use secure_rng::{ContinuousTest, EntropySource, MonitoredSource, SystemEntropy};
