//! Unique run identifiers.

use rand::Rng;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Length of a generated id.
pub const UNIQUE_ID_LEN: usize = 6;

/// Generate a short base-62 id from `rng`.
///
/// Deterministic for a given rng state, so seeded runs name their
/// environments reproducibly.
pub fn generate_unique_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..UNIQUE_ID_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// `<prefix>-<id>`.
pub fn environment_name(prefix: &str, id: &str) -> String {
    format!("{}-{}", prefix, id)
}
