//! Content digests for chunk deduplication.
//!
//! Two algorithms, both 128-bit and rendered as 32-char lowercase hex:
//! XXH3 (fast, non-cryptographic, the default) and MD5 (fallback). The
//! digests key deduplication only — collision resistance matters, integrity
//! guarantees do not.

use md5::{Digest, Md5};
use serde::Deserialize;
use xxhash_rust::xxh3::xxh3_128;

/// Digest algorithm selector, configured under `[hashing]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgo {
    Xxh3,
    Md5,
}

/// Hash the UTF-8 bytes of `text` into a 32-character hex digest.
pub fn hash_text(text: &str, algo: HashAlgo) -> String {
    match algo {
        HashAlgo::Xxh3 => format!("{:032x}", xxh3_128(text.as_bytes())),
        HashAlgo::Md5 => {
            let mut hasher = Md5::new();
            hasher.update(text.as_bytes());
            hex::encode(hasher.finalize())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_are_deterministic_per_algorithm() {
        for algo in [HashAlgo::Xxh3, HashAlgo::Md5] {
            let a = hash_text("some chunk text", algo);
            let b = hash_text("some chunk text", algo);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn digests_are_32_hex_chars() {
        for algo in [HashAlgo::Xxh3, HashAlgo::Md5] {
            let d = hash_text("x", algo);
            assert_eq!(d.len(), 32);
            assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn different_text_changes_the_digest() {
        assert_ne!(
            hash_text("alpha", HashAlgo::Xxh3),
            hash_text("beta", HashAlgo::Xxh3)
        );
    }

    #[test]
    fn md5_matches_known_vector() {
        // md5("abc") is a published test vector
        assert_eq!(
            hash_text("abc", HashAlgo::Md5),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn unicode_input_hashes_its_utf8_bytes() {
        let a = hash_text("naïve", HashAlgo::Xxh3);
        let b = hash_text("naïve", HashAlgo::Xxh3);
        assert_eq!(a, b);
        assert_ne!(a, hash_text("naive", HashAlgo::Xxh3));
    }
}
