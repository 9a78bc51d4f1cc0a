//! File leases (§3): a short deterministic fingerprint over `(mtime_ms,
//! size)`, recomputed on every read. Callers that want optimistic
//! concurrency on an edit carry the lease back; implementations that omit
//! leases entirely must still provide path confinement and size-limit
//! checks, which live in [`crate::tools::file_edit`].

use sha1::Digest;
use sha1::Sha1;

/// Computes the 6-hex-digit lease for a file's `(mtime_ms, size)` pair.
///
/// The hash is a stable function of its inputs: the same `(mtime_ms, size)`
/// always yields the same lease, on any runtime.
pub fn compute_lease(mtime_ms: i64, size: u64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(mtime_ms.to_be_bytes());
    hasher.update(size.to_be_bytes());
    let digest = hasher.finalize();
    // 6 hex digits is 24 bits; three bytes of the digest is plenty of
    // collision resistance for a same-session staleness check.
    format!("{:02x}{:02x}{:02x}", digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_yield_same_lease() {
        assert_eq!(compute_lease(123, 456), compute_lease(123, 456));
    }

    #[test]
    fn different_inputs_yield_different_leases() {
        assert_ne!(compute_lease(123, 456), compute_lease(123, 457));
    }

    #[test]
    fn lease_is_six_lowercase_hex_digits() {
        let lease = compute_lease(1_700_000_000_000, 42);
        assert_eq!(lease.len(), 6);
        assert!(lease.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
