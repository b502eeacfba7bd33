//! Architectural Enforcement Integration Tests
//!
//! Source scans that keep the arena crates honest:
//! - No sleep() calls outside tests; waiting is done on I/O or intervals
//! - No blocking file, network or HTTP I/O in async code
//! - WebSocket-only crates stay optional and behind the `websocket` feature
//!
//! The checks live under `tests/`; this library only shares the workspace
//! root with them.

use std::path::PathBuf;

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: [&str; 2] = ["arena/core/src", "arena/cli/src"];

/// Absolute path of the workspace root
#[must_use]
pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Index of the first line of a file's `#[cfg(test)]` module, if any
///
/// Everything from there on is test code.
#[must_use]
pub fn test_module_start(lines: &[&str]) -> Option<usize> {
    lines.iter().position(|line| line.trim() == "#[cfg(test)]")
}
