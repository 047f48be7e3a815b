//! Content fingerprints used by the move detector and overwrite decisions.
//!
//! Two schemes share one output type. The fast scheme is FNV-1a-64 over the
//! whole file for small files and over the first and last 128 KiB for large
//! ones; it exists to make bulk comparisons cheap, not to resist collisions.
//! The strong scheme is SHA-256 over the full content. An unreadable or
//! empty file has no fingerprint at all, and "no fingerprint" never compares
//! equal to anything, including another missing fingerprint.

use eyre::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Which fingerprint scheme a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashMode {
    /// FNV-1a-64 partial hash.
    #[default]
    Fast,
    /// SHA-256 over the full file.
    Strong,
}

/// Files at or below this size are hashed whole in fast mode.
const FAST_WHOLE_LIMIT: u64 = 256 * 1024;
/// Head and tail window size for the fast partial hash.
const FAST_WINDOW: usize = 128 * 1024;
/// Read chunk size for the strong streaming hash.
const STRONG_CHUNK: usize = 64 * 1024;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// A content-derived identifier. Equal fingerprints are treated as equal
/// content for move detection.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Fingerprint(Box<[u8]>);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex form, used only for logging.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 2);
        for b in self.0.iter() {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }
}

/// Fingerprint a file's content under the given scheme.
///
/// Returns `None` when no fingerprint exists: the file is empty, unreadable,
/// or hashing failed. Callers must never treat two `None`s as a match.
pub fn file_fingerprint(path: &Path, mode: HashMode) -> Option<Fingerprint> {
    let result = match mode {
        HashMode::Fast => fast_fingerprint(path),
        HashMode::Strong => strong_fingerprint(path),
    };
    match result {
        Ok(fp) => fp,
        Err(err) => {
            log::debug!("fingerprint unavailable for {}: {err:#}", path.display());
            None
        }
    }
}

fn fnv1a(mut state: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        state ^= u64::from(b);
        state = state.wrapping_mul(FNV_PRIME);
    }
    state
}

/// FNV-1a-64 over the whole content, or over head ‖ tail for large files.
fn fast_fingerprint(path: &Path) -> Result<Option<Fingerprint>> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(None);
    }

    let mut state = FNV_OFFSET;
    if len <= FAST_WHOLE_LIMIT {
        let mut buf = Vec::with_capacity(len as usize);
        file.read_to_end(&mut buf)?;
        state = fnv1a(state, &buf);
    } else {
        let mut window = vec![0u8; FAST_WINDOW];
        file.read_exact(&mut window)?;
        state = fnv1a(state, &window);
        file.seek(SeekFrom::End(-(FAST_WINDOW as i64)))?;
        file.read_exact(&mut window)?;
        state = fnv1a(state, &window);
    }

    Ok(Some(Fingerprint(state.to_be_bytes().into())))
}

/// SHA-256 over the full content, streamed in 64 KiB chunks.
fn strong_fingerprint(path: &Path) -> Result<Option<Fingerprint>> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; STRONG_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    Ok(Some(Fingerprint(digest.as_slice().into())))
}
