//! MD5 helpers shared by the piece verifier and the journal signature.
//!
//! Every digest in the persisted artifacts is canonical lowercase hex.

use md5::{Digest, Md5};

/// Finalize an MD5 hasher into canonical lowercase hex.
pub fn hex_digest(hasher: Md5) -> String {
    hex::encode(hasher.finalize())
}

/// MD5 of a byte slice as lowercase hex.
pub fn md5_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex_digest(hasher)
}

/// Signature over a piece journal: MD5 of the concatenation of the per-piece
/// hex digests in journal order. An empty journal signs to the empty-input MD5.
pub fn piece_md5_sign<'a, I>(piece_md5s: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Md5::new();
    for md5 in piece_md5s {
        hasher.update(md5.as_bytes());
    }
    hex_digest(hasher)
}
