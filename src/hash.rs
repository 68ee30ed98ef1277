// src/hash.rs
//! Single hashing capability used by the IFR chain (`spec.md` §4.5, §9:
//! "isolate SHA-256 behind a single capability that takes a slice and
//! returns a 32-byte array"). No other module imports `sha2` directly.

use sha2::{Digest, Sha256};

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    buf
}

/// SHA-256 over multiple slices, as if they had been concatenated, without
/// actually allocating the concatenation. Used to build `chain_hash` from
/// `prev_chain_hash ‖ ifr_hash ‖ seal ‖ nonce ‖ model_digest ‖ policy_digest`.
pub fn sha256_chain(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    let out = hasher.finalize();
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_digest() {
        // SHA-256("") is a well-known constant.
        let expected: [u8; 32] = [
            0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f,
            0xb9, 0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b,
            0x78, 0x52, 0xb8, 0x55,
        ];
        assert_eq!(sha256(&[]), expected);
    }

    #[test]
    fn chain_matches_manual_concatenation() {
        let a = b"hello ";
        let b = b"world";
        let mut concat = alloc::vec::Vec::new();
        concat.extend_from_slice(a);
        concat.extend_from_slice(b);
        assert_eq!(sha256_chain(&[a, b]), sha256(&concat));
    }

    #[test]
    fn single_byte_flip_changes_digest() {
        let a = sha256(b"zenedge");
        let b = sha256(b"zenedgd");
        assert_ne!(a, b);
    }
}
