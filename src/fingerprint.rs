//! Content fingerprinting.
//!
//! The fingerprint covers every byte of the file and nothing else, so a file
//! rewritten with identical bytes keeps its fingerprint while an in-place
//! edit that preserves size and mtime still changes it.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

use crate::models::ContentFingerprint;

/// Hashes the full content of the file at `path`.
pub fn fingerprint(path: &Path) -> io::Result<ContentFingerprint> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(ContentFingerprint(hasher.finalize().into()))
}
