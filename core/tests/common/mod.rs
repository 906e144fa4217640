/// Common test utilities and mock infrastructure
///
/// This module provides shared functionality for integration tests including:
/// - Fixture device trees (device nodes plus sysfs attributes)
/// - Instrumented device handles and deterministic entropy
/// - Content checks
pub mod mock_drive;
pub mod test_helpers;
