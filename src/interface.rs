//! Network interface filtering and primary interface selection.

use ahash::AHashMap as HashMap;

use crate::models::NetworkRateInfo;
use crate::provider::InterfaceMeta;

const LOOPBACK: &str = "lo";

const IGNORED_PREFIXES: &[&str] = &["docker", "br-", "veth", "bridge"];

const PRIMARY_PREFIXES: &[&str] = &[
    "en", "eth", "wlan", "wlp", "wlo", "eno", "enp", "ens", "utun",
];

fn is_ignored(name: &str) -> bool {
    name == LOOPBACK || IGNORED_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn is_primary(name: &str) -> bool {
    PRIMARY_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Whether counters for `name` should be reported at all.
///
/// `lo` is always rejected. When metadata for the interface is known it must
/// be up and not flagged as loopback.
pub fn is_usable_interface(name: &str, index: &HashMap<String, InterfaceMeta>) -> bool {
    if name == LOOPBACK {
        return false;
    }
    match index.get(name) {
        Some(meta) => meta.up && !meta.loopback,
        None => true,
    }
}

/// Builds the name lookup used by [`is_usable_interface`].
pub fn interface_index(interfaces: Vec<InterfaceMeta>) -> HashMap<String, InterfaceMeta> {
    interfaces.into_iter().map(|i| (i.name.clone(), i)).collect()
}

fn busiest<'a>(pool: &[&'a NetworkRateInfo]) -> Option<&'a NetworkRateInfo> {
    let mut best: Option<&'a NetworkRateInfo> = None;
    for &iface in pool {
        best = match best {
            None => Some(iface),
            Some(b) => {
                let (rate, b_rate) = (iface.current_rate(), b.current_rate());
                if rate > b_rate || (rate == b_rate && iface.lifetime_total() > b.lifetime_total())
                {
                    Some(iface)
                } else {
                    Some(b)
                }
            }
        };
    }
    best
}

fn largest_total<'a>(pool: &[&'a NetworkRateInfo]) -> Option<&'a NetworkRateInfo> {
    let mut best: Option<&'a NetworkRateInfo> = None;
    for &iface in pool {
        if best.map_or(true, |b| iface.lifetime_total() > b.lifetime_total()) {
            best = Some(iface);
        }
    }
    best
}

/// Picks the interface to headline.
///
/// Virtual interfaces are skipped when anything else exists, physical
/// naming conventions are preferred, and the busiest interface wins. When
/// everything is idle the one with the largest lifetime traffic is chosen,
/// unless only virtual interfaces exist: then the first non-`lo` one wins.
pub fn select_primary_interface(interfaces: &[NetworkRateInfo]) -> Option<&NetworkRateInfo> {
    if interfaces.is_empty() {
        return None;
    }

    let candidates: Vec<&NetworkRateInfo> =
        interfaces.iter().filter(|i| !is_ignored(&i.interface)).collect();

    let mut pool: Vec<&NetworkRateInfo> = if candidates.is_empty() {
        interfaces.iter().collect()
    } else {
        candidates.clone()
    };

    let primary: Vec<&NetworkRateInfo> = pool
        .iter()
        .copied()
        .filter(|i| is_primary(&i.interface))
        .collect();
    if !primary.is_empty() {
        pool = primary;
    }

    if let Some(best) = busiest(&pool) {
        if best.current_rate() > 0.0 {
            return Some(best);
        }
    }

    if candidates.is_empty() {
        return interfaces
            .iter()
            .find(|i| i.interface != LOOPBACK)
            .or_else(|| interfaces.first());
    }

    largest_total(&pool)
}
