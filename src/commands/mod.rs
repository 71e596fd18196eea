//! CLI command implementations for herakles-sysmon.
//!
//! - `check`: system validation
//! - `snapshot`: one sampling pass printed to stdout
//! - `kill`: process termination

pub mod check;
pub mod kill;
pub mod snapshot;

pub use check::command_check;
pub use kill::command_kill;
pub use snapshot::command_snapshot;
