//! Fingerprinting primitives.
//!
//! Two call sites in fleetctl need a stable, collision-resistant digest over
//! an ordered sequence of strings:
//! - `ClusterMachine.InputsVersion`, the fingerprint of the ordered patch
//!   list a `ClusterMachine` was generated from.
//! - `MachineSetStatus.config_hash`, the hash of all member config-status
//!   digests in ascending machine-id order.
//!
//! Both just need a deterministic hex digest over concatenated bytes; this
//! module wraps `sha2` once so call sites don't each reimplement the
//! hex-encoding boilerplate.

use sha2::{Digest, Sha256};

/// Hashes the concatenation of `parts` (in the order given) and returns the
/// lowercase hex digest. Callers are responsible for ordering `parts`
/// deterministically — this function does not sort.
pub fn fingerprint<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        // 0x1e (record separator) keeps "ab","c" from hashing the same as
        // "a","bc".
        hasher.update([0x1e]);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
