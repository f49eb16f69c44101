//! Stable exit codes for the `workflow-driver` CLI.

/// The workflow completed with a result.
pub const OK: i32 = 0;
/// Usage, configuration or protocol error.
pub const INVALID: i32 = 1;
/// The workflow completed with a business error.
pub const FAILED: i32 = 2;
/// Events ran out while the workflow was still blocked.
pub const SUSPENDED: i32 = 3;
