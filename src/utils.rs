//! Small ambient helpers shared across the engine: atomic JSON persistence,
//! content hashing, and path canonicalization. Mirrors the teacher's
//! `utils.rs` role in `cache.rs`/`lib.rs`.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{IoResultExt, Result};

/// Reads and deserializes a JSON file.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read(path).with_path(path)?;
    serde_json::from_slice(&content)
        .map_err(|e| crate::error::BuildEngineError::invalid_state(format!("{}: {e}", path.display())))
}

/// Serializes `value` to JSON and writes it atomically: the payload is
/// written to a sibling temp file first, then renamed into place, so a
/// process crash mid-write never leaves a half-written cache file behind.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).with_path(parent)?;

    let mut tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("cache")
    ));
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| crate::error::BuildEngineError::invalid_state(e.to_string()))?;
    std::fs::write(&tmp_path, &body).with_path(&tmp_path)?;
    std::fs::rename(&tmp_path, path).with_path(path)?;
    tmp_path.clear();
    Ok(())
}

/// Canonicalizes a path without the `\\?\` UNC prefix Windows' own
/// `std::fs::canonicalize` adds (`dunce` behaves like the platform's
/// canonicalize everywhere else).
pub fn canonicalize(path: &Path) -> Result<PathBuf> {
    dunce::canonicalize(path).with_path(path)
}

/// Hex-encoded SHA-256 digest of `bytes`. The single hashing primitive used
/// for both resource integrity hashes (§3) and the build signature (§3/§10).
pub fn hash_bytes(bytes: &[u8]) -> String {
    use sha2::Digest;
    let digest = sha2::Sha256::digest(bytes);
    hex::encode(digest)
}

/// Hashes the canonical (map-sorted-key) JSON serialization of `value`.
/// `serde_json`'s `Map` is a `BTreeMap` by default, so key order is already
/// deterministic without a `preserve_order` feature.
pub fn hash_json<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| crate::error::BuildEngineError::invalid_state(e.to_string()))?;
    Ok(hash_bytes(&bytes))
}

/// Normalizes a path to POSIX-style forward slashes, as VFS paths are
/// required to be (§4.1).
pub fn to_posix(path: &Path) -> String {
    path_slash::PathExt::to_slash_lossy(path).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trips_through_atomic_write() {
        let dir = std::env::temp_dir().join(format!("layerbuild-utils-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("value.json");

        write_json_file(&path, &vec![1, 2, 3]).unwrap();
        let read: Vec<i32> = read_json_file(&path).unwrap();
        assert_eq!(read, vec![1, 2, 3]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn hash_bytes_is_stable() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }
}
