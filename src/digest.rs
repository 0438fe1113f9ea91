//! A content-addressing digest for no-parse mode (`spec.md` §4.6).
//!
//! `spec.md` asks for "a 128-bit digest (MD5-equivalent)" so a front end can
//! tell whether a rendered page changed. Nothing in the example pack pulls
//! in an MD5/SHA implementation, and vendoring one ourselves would be
//! exactly the kind of fabricated dependency this exercise forbids, so this
//! is a plain, non-cryptographic 128-bit digest: two independent 64-bit
//! FNV-1a passes over the same bytes with different seeds, concatenated.
//! It is adequate for change detection; it is not a cryptographic hash and
//! must not be presented as one.

const FNV_PRIME: u64 = 0x100_0000_01b3;
const SEED_A: u64 = 0xcbf2_9ce4_8422_2325;
const SEED_B: u64 = 0x9e37_79b9_7f4a_7c15;

fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    let mut hash = seed;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Returns a 128-bit digest of `text`, rendered as 32 lowercase hex digits.
pub fn digest_hex(text: &str) -> String {
    let bytes = text.as_bytes();
    let a = fnv1a(bytes, SEED_A);
    let b = fnv1a(bytes, SEED_B);
    format!("{a:016x}{b:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_deterministic() {
        assert_eq!(digest_hex("hello"), digest_hex("hello"));
    }

    #[test]
    fn differs_for_different_input() {
        assert_ne!(digest_hex("hello"), digest_hex("world"));
    }

    #[test]
    fn is_32_hex_chars() {
        let d = digest_hex("x");
        assert_eq!(d.len(), 32);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
