pub mod sampling;

pub use sampling::{SampleReport, SampleVerifier};
