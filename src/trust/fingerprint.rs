//! SSH public key fingerprints.
//!
//! `sshd` logs the key it accepted as either the legacy colon-hex MD5 form
//! (`aa:bb:...:ff`, 16 octets, 47 characters) or the modern
//! `SHA256:<base64>` form. `ssh-key` only knows the modern one, so the
//! legacy digest is computed here over the raw key blob.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};
use ssh_key::{HashAlg, PublicKey};

const SHA256_PREFIX: &str = "SHA256:";

/// Legacy colon-hex MD5 fingerprint of a decoded key blob.
pub fn legacy_fingerprint(raw: &[u8]) -> String {
    Md5::digest(raw)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Whether `fingerprint` (in either form) identifies `key`, whose encoded
/// blob is `raw`.
///
/// Comparison is on the full string; a prefix never matches.
pub fn matches(key: &PublicKey, raw: &[u8], fingerprint: &str) -> bool {
    if fingerprint.starts_with(SHA256_PREFIX) {
        key.fingerprint(HashAlg::Sha256).to_string() == fingerprint
    } else {
        legacy_fingerprint(raw) == fingerprint
    }
}

/// Encode raw key bytes the way `authorized_keys` stores them.
pub fn encode_blob(raw: &[u8]) -> String {
    STANDARD.encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::authorized_keys::tests::fake_key_blob;

    fn sample_key() -> (PublicKey, Vec<u8>) {
        let raw = fake_key_blob(7);
        (PublicKey::from_bytes(&raw).unwrap(), raw)
    }

    #[test]
    fn md5_of_empty_input() {
        assert_eq!(
            legacy_fingerprint(b""),
            "d4:1d:8c:d9:8f:00:b2:04:e9:80:09:98:ec:f8:42:7e"
        );
    }

    #[test]
    fn legacy_format_is_colon_separated_lowercase_hex() {
        let (_, raw) = sample_key();
        let fp = legacy_fingerprint(&raw);
        assert_eq!(fp.len(), 47);
        assert_eq!(fp.split(':').count(), 16);
        assert!(
            fp.chars()
                .all(|c| c == ':' || c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn hashing_is_deterministic() {
        let (_, raw) = sample_key();
        let first = legacy_fingerprint(&raw);
        for _ in 0..5 {
            assert_eq!(legacy_fingerprint(&raw), first);
        }
    }

    #[test]
    fn matches_both_forms_and_rejects_prefixes() {
        let (key, raw) = sample_key();
        let legacy = legacy_fingerprint(&raw);
        let modern = key.fingerprint(HashAlg::Sha256).to_string();

        assert!(modern.starts_with(SHA256_PREFIX));
        assert!(matches(&key, &raw, &legacy));
        assert!(matches(&key, &raw, &modern));
        assert!(!matches(&key, &raw, &legacy[..legacy.len() - 3]));
        assert!(!matches(&key, &raw, &modern[..modern.len() - 1]));
        assert!(!matches(&key, &raw, ""));
    }

    #[test]
    fn other_key_does_not_match() {
        let (key, raw) = sample_key();
        let other = fake_key_blob(8);
        assert!(!matches(&key, &raw, &legacy_fingerprint(&other)));
    }

    #[test]
    fn blob_encoding_keeps_padding() {
        assert_eq!(encode_blob(&[1]), "AQ==");
        assert_eq!(encode_blob(&[1, 2]), "AQI=");
    }
}
