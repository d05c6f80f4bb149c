//! Streaming verification of one piece against its journal entry.

use std::fmt;
use std::io::Read;

use md5::{Digest, Md5};

use crate::digest;
use crate::storage::PieceMetaRecord;

/// Why a piece failed verification.
#[derive(Debug)]
pub enum PieceError {
    /// The stream ended before `piece_len` bytes arrived.
    ShortRead { expected: u32, got: usize },
    /// The stream itself failed.
    Io(std::io::Error),
    /// The piece's bytes do not hash to the journal entry's digest.
    DigestMismatch {
        piece_num: i32,
        expected: String,
        got: String,
    },
}

impl fmt::Display for PieceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PieceError::ShortRead { expected, got } => {
                write!(f, "short read: expected {} bytes, got {}", expected, got)
            }
            PieceError::Io(e) => write!(f, "read piece content: {}", e),
            PieceError::DigestMismatch {
                piece_num,
                expected,
                got,
            } => write!(
                f,
                "piece {} digest is inconsistent: expected {}, got {}",
                piece_num, expected, got
            ),
        }
    }
}

impl std::error::Error for PieceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PieceError::Io(e) => Some(e),
            PieceError::ShortRead { .. } | PieceError::DigestMismatch { .. } => None,
        }
    }
}

/// Read exactly `record.piece_len` bytes from `reader` and check the piece
/// digest. The bytes are folded into `file_hasher` only after the digest
/// matched, so the running whole-file hash never advances past the verified
/// prefix.
pub fn verify_piece<R: Read>(
    reader: &mut R,
    record: &PieceMetaRecord,
    file_hasher: &mut Md5,
) -> Result<(), PieceError> {
    let mut buf = vec![0u8; record.piece_len as usize];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(PieceError::ShortRead {
                    expected: record.piece_len,
                    got: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PieceError::Io(e)),
        }
    }
    let got = digest::md5_bytes(&buf);
    if got != record.md5 {
        return Err(PieceError::DigestMismatch {
            piece_num: record.piece_num,
            expected: record.md5.clone(),
            got,
        });
    }
    file_hasher.update(&buf);
    Ok(())
}
