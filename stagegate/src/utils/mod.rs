//! Small helpers for identifiers, timestamps and fingerprints.

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generates a new run identifier.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}

/// Returns the current time as an RFC3339 string with microsecond precision.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Stable fingerprint of a seed input, used to tie checkpoints to their seed.
///
/// Leading and trailing whitespace is ignored.
#[must_use]
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    let result = hasher.finalize();
    format!("sha256:{}", hex::encode(&result[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_run_id_is_v4() {
        assert_eq!(generate_run_id().get_version_num(), 4);
        assert_ne!(generate_run_id(), generate_run_id());
    }

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn test_fingerprint_stable() {
        let a = fingerprint("A spring launch for Lumen lamps");
        let b = fingerprint("  A spring launch for Lumen lamps\n");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
        assert_eq!(a.len(), "sha256:".len() + 32);
        assert_ne!(a, fingerprint("A different brief"));
    }
}
