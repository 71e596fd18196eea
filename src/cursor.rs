//! Opaque cursor tokens.
//!
//! A cursor carries the raw counters of a previous sample so the next call
//! can compute a rate without any server-side session. Tokens are JSON
//! encoded as unpadded URL-safe base64, so they can be passed as query
//! parameters or headers untouched.

use ahash::AHashMap as HashMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::Result;
use crate::provider::CpuTicks;

/// Prior CPU reading for one process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessCursorEntry {
    pub pid: u32,
    /// Cumulative CPU seconds at capture time.
    pub ticks: f64,
    /// Unix millis; 0 means unset.
    pub timestamp: i64,
}

/// Raw rx/tx bytes for one interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetCounters {
    pub bytes_recv: u64,
    pub bytes_sent: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkRateCursor {
    pub timestamp: i64,
    pub iostats: BTreeMap<String, NetCounters>,
}

/// Raw read/write bytes for one block device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskRateCursor {
    pub timestamp: i64,
    pub iostats: BTreeMap<String, DiskCounters>,
}

/// Host CPU tick counters, aggregate and per core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuCursor {
    pub timestamp: i64,
    pub total: CpuTicks,
    pub cores: Vec<CpuTicks>,
}

pub fn encode<T: Serialize>(state: &T) -> Result<String> {
    let json = serde_json::to_vec(state)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

pub fn decode<T: DeserializeOwned>(token: &str) -> Result<T> {
    let json = URL_SAFE_NO_PAD.decode(token.trim())?;
    Ok(serde_json::from_slice(&json)?)
}

/// Decodes `token`, treating absence or any decode failure as a cold start.
pub fn decode_or_default<T: DeserializeOwned + Default>(token: Option<&str>) -> T {
    match token {
        None => T::default(),
        Some(t) if t.trim().is_empty() => T::default(),
        Some(t) => decode(t).unwrap_or_else(|e| {
            debug!("Ignoring unusable cursor: {}", e);
            T::default()
        }),
    }
}

/// Decodes a process cursor into a PID lookup table.
pub fn decode_process_cursor(token: Option<&str>) -> HashMap<u32, ProcessCursorEntry> {
    let entries: Vec<ProcessCursorEntry> = decode_or_default(token);
    entries.into_iter().map(|e| (e.pid, e)).collect()
}
