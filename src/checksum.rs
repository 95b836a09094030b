use log::{debug, warn};
use sha2::{Digest, Sha256};

use crate::error::{DistributionError, Result};
use crate::settings::ChecksumPolicy;

/// Lowercase hex SHA-256 of a buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Verify a downloaded payload against the manifest-declared checksum.
///
/// Without a declared checksum the payload is accepted with a warning under
/// [`ChecksumPolicy::VerifyWhenPresent`] and rejected under [`ChecksumPolicy::Required`].
pub fn verify_payload(
    bytes: &[u8],
    expected: Option<&str>,
    policy: ChecksumPolicy,
    endpoint: &str,
) -> Result<()> {
    let expected = expected.map(str::trim).filter(|value| !value.is_empty());
    let Some(expected) = expected else {
        return match policy {
            ChecksumPolicy::VerifyWhenPresent => {
                warn!("checksum: manifest for {endpoint} has no sha256; skipping verification");
                Ok(())
            }
            ChecksumPolicy::Required => Err(DistributionError::Integrity {
                endpoint: endpoint.to_owned(),
                expected: "<missing>".into(),
                actual: sha256_hex(bytes),
            }),
        };
    };

    let actual = sha256_hex(bytes);
    if actual != expected.to_ascii_lowercase() {
        return Err(DistributionError::Integrity {
            endpoint: endpoint.to_owned(),
            expected: expected.to_owned(),
            actual,
        });
    }
    debug!("checksum: verified {endpoint}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn hashes_known_value() {
        assert_eq!(sha256_hex(b"hello"), HELLO_SHA256);
    }

    #[test]
    fn accepts_matching_checksum_in_any_case() {
        let upper = HELLO_SHA256.to_ascii_uppercase();
        assert!(verify_payload(b"hello", Some(&upper), ChecksumPolicy::Required, "x").is_ok());
    }

    #[test]
    fn rejects_mismatch() {
        let err = verify_payload(b"hullo", Some(HELLO_SHA256), ChecksumPolicy::VerifyWhenPresent, "x")
            .unwrap_err();
        assert!(matches!(err, DistributionError::Integrity { .. }));
    }

    #[test]
    fn missing_checksum_follows_policy() {
        assert!(verify_payload(b"hello", None, ChecksumPolicy::VerifyWhenPresent, "x").is_ok());
        assert!(verify_payload(b"hello", Some("  "), ChecksumPolicy::VerifyWhenPresent, "x").is_ok());
        assert!(verify_payload(b"hello", None, ChecksumPolicy::Required, "x").is_err());
    }
}
