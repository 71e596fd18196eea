//! Kill command implementation.

use anyhow::{bail, Context, Result};
use std::io;
use tracing::info;

/// Sends SIGTERM, or SIGKILL when `force` is set.
pub fn command_kill(pid: u32, force: bool) -> Result<()> {
    let target = match i32::try_from(pid) {
        Ok(p) if p > 0 => p,
        _ => bail!("invalid pid {}", pid),
    };
    let (signal, name) = if force {
        (libc::SIGKILL, "SIGKILL")
    } else {
        (libc::SIGTERM, "SIGTERM")
    };

    // SAFETY: kill(2) takes plain integers; a positive pid targets one process.
    let rc = unsafe { libc::kill(target, signal) };
    if rc != 0 {
        return Err(io::Error::last_os_error())
            .with_context(|| format!("Failed to send {} to process {}", name, pid));
    }

    info!("Sent {} to process {}", name, pid);
    println!("✅ Sent {} to process {}", name, pid);
    Ok(())
}
