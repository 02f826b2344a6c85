//! SHA-256 helpers for run signatures and dependency digests.

use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// Digest of a dependency set; independent of declaration order.
#[must_use]
pub fn dependency_digest<S: AsRef<str>>(dependencies: &[S]) -> String {
    let mut names: Vec<&str> = dependencies.iter().map(AsRef::as_ref).collect();
    names.sort_unstable();
    names.dedup();
    sha256_hex(names.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_dependency_digest_ignores_order_and_duplicates() {
        assert_eq!(dependency_digest(&["b", "a"]), dependency_digest(&["a", "b", "a"]));
        assert_ne!(dependency_digest(&["a"]), dependency_digest(&["a", "b"]));
        assert_eq!(dependency_digest::<&str>(&[]), sha256_hex(""));
    }
}
