//! Stable exit codes for the wizard binary.

/// The operator quit, or a listing completed.
pub const OK: i32 = 0;
/// Startup failed: invalid configuration or property registry, or an
/// unexpected error while saving the session.
pub const INVALID: i32 = 1;
/// Ctrl-C outside a stack poll.
pub const INTERRUPTED: i32 = 130;
