//! Deterministic color assignment
//!
//! The same key always maps to the same palette entry, across runs and
//! machines, so catalog services and categories keep stable colors.

use sha2::{Digest, Sha256};

/// Fixed display palette
pub const PALETTE: &[&str] = &[
    "#e99537", "#4da568", "#6471eb", "#db5a54", "#df4e92", "#c44fe9", "#eb5429", "#61c9ea",
    "#805dee", "#6ad28a", "#f0b429", "#3d9ad6",
];

/// Color for a key (slug, category name, ...)
pub fn color_for(key: &str) -> &'static str {
    let digest = Sha256::digest(key.trim().to_lowercase().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let index = u64::from_be_bytes(head) % PALETTE.len() as u64;
    PALETTE[index as usize]
}

/// Hex digest of a key, used for import deduplication hashes
pub fn hash_hex(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
