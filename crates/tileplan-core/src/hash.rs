//! Stable hashing helpers for plan-cache keys and the deterministic
//! start-tile dithering hash.

use blake3::Hasher;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }

    /// Fold this hash into a span of `width` tiles, plus a direction flag
    /// taken from the low bit. Used to pick a dithered start tile that is
    /// orthogonal to plan selection.
    pub fn fold_into_span(&self, width: u64) -> (u64, bool) {
        if width == 0 {
            return (0, false);
        }
        let low = u64::from_le_bytes(self.0[0..8].try_into().unwrap());
        let ascending = (low & 1) == 0;
        (low % width, ascending)
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    Hash256(h.finalize().into())
}

/// Hash any serde-serialisable value deterministically via its canonical
/// JSON encoding. Used to build plan-cache keys and the dithering seed from
/// a pass-oblivious subset of an operator's canonical parameters.
pub fn hash_serde<T: Serialize>(v: &T) -> crate::error::Result<Hash256> {
    let bytes = serde_json::to_vec(v)?;
    Ok(hash_bytes(&bytes))
}
