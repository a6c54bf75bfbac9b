//! SHA-256 checksum manifests.
//!
//! Release pipelines publish digests in `sha256sum` format
//! (`<hash>  <file>`, optionally `*<file>` for binary mode), or as a
//! sidecar holding just the hash.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn is_sha256(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Find the digest for `file_name` in a checksum manifest.
pub fn find_in_manifest(manifest: &str, file_name: &str) -> Option<String> {
    let text = manifest.trim();
    if is_sha256(text) {
        return Some(text.to_ascii_lowercase());
    }

    text.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let hash = parts.next()?;
        let name = parts.next()?.trim_start_matches('*');
        let name = name.rsplit('/').next().unwrap_or(name);
        (is_sha256(hash) && name == file_name).then(|| hash.to_ascii_lowercase())
    })
}

/// Verify `bytes` against the manifest entry for `file_name`.
///
/// Returns the verified digest.
pub fn verify(bytes: &[u8], manifest: &str, file_name: &str, manifest_url: &str) -> Result<String> {
    let expected = find_in_manifest(manifest, file_name).ok_or_else(|| Error::ChecksumMissing {
        file: file_name.to_string(),
        manifest: manifest_url.to_string(),
    })?;
    let actual = sha256_hex(bytes);
    if actual != expected {
        return Err(Error::ChecksumMismatch {
            file: file_name.to_string(),
            expected,
            actual,
        });
    }
    Ok(actual)
}
