//! On-disk format of the code-object cache.
//!
//! Layout: 8-byte magic, format version, bincode-encoded entry table,
//! SHA-256 trailer over everything before it. Writes go to a temp file in
//! the same directory followed by an atomic rename, so readers never see
//! a torn file. Any mismatch in magic, version or checksum, or a bincode
//! decode failure, reports corruption and the caller disables the cache.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{CacheEntry, CacheError, CacheKey};

/// Cache file magic number.
pub const CACHE_MAGIC: &[u8; 8] = b"RUNFFTC\x01";

/// Current cache format version.
pub const CACHE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreBody {
    entries: Vec<(CacheKey, CacheEntry)>,
}

/// Encode the entry table into the self-contained blob format.
pub fn encode(entries: Vec<(CacheKey, CacheEntry)>) -> Result<Vec<u8>, CacheError> {
    let body = bincode::serialize(&StoreBody { entries })
        .map_err(|e| CacheError::Encode(e.to_string()))?;
    let mut out = Vec::with_capacity(8 + 4 + body.len() + 32);
    out.extend_from_slice(CACHE_MAGIC);
    out.extend_from_slice(&CACHE_VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    let digest = Sha256::digest(&out);
    out.extend_from_slice(&digest);
    Ok(out)
}

/// Decode a blob produced by [`encode`], validating every layer.
pub fn decode(bytes: &[u8]) -> Result<Vec<(CacheKey, CacheEntry)>, CacheError> {
    if bytes.len() < 8 + 4 + 32 {
        return Err(CacheError::Corrupted {
            reason: "file too short".into(),
        });
    }
    let (content, trailer) = bytes.split_at(bytes.len() - 32);
    let digest = Sha256::digest(content);
    if digest.as_slice() != trailer {
        return Err(CacheError::Corrupted {
            reason: "checksum mismatch".into(),
        });
    }
    if &content[..8] != CACHE_MAGIC {
        return Err(CacheError::Corrupted {
            reason: "bad magic number".into(),
        });
    }
    let version = u32::from_le_bytes(content[8..12].try_into().unwrap_or_default());
    if version != CACHE_VERSION {
        return Err(CacheError::Corrupted {
            reason: format!("unsupported cache version {version}"),
        });
    }
    let body: StoreBody = bincode::deserialize(&content[12..])
        .map_err(|e| CacheError::Corrupted {
            reason: format!("entry table decode failed: {e}"),
        })?;
    Ok(body.entries)
}

/// Load the cache file; a missing file is an empty cache.
pub fn read_store(path: &Path) -> Result<Vec<(CacheKey, CacheEntry)>, CacheError> {
    match fs::read(path) {
        Ok(bytes) => decode(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(CacheError::Io(e.to_string())),
    }
}

/// Persist the entry table transactionally: temp file, then rename.
pub fn write_store(path: &Path, entries: Vec<(CacheKey, CacheEntry)>) -> Result<(), CacheError> {
    let bytes = encode(entries)?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| CacheError::Io(e.to_string()))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes).map_err(|e| CacheError::Io(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| CacheError::Io(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey {
            kernel_name: name.to_string(),
            gpu_arch: "gfx90a".to_string(),
            toolchain_version: 500,
            generator_sum: [7u8; 32],
        }
    }

    fn entry(code: &[u8]) -> CacheEntry {
        CacheEntry {
            code: code.to_vec(),
            crc32: crc32fast::hash(code),
            timestamp: 11,
            last_used: 0,
        }
    }

    #[test]
    fn encode_decode_round_trips() {
        let entries = vec![(key("a"), entry(b"code-a")), (key("b"), entry(b"code-b"))];
        let bytes = encode(entries.clone()).unwrap();
        assert_eq!(&bytes[..8], CACHE_MAGIC);
        let back = decode(&bytes).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].0, entries[0].0);
        assert_eq!(back[1].1.code, b"code-b");
    }

    #[test]
    fn flipped_bit_reports_corruption() {
        let mut bytes = encode(vec![(key("a"), entry(b"code"))]).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 1;
        assert!(matches!(
            decode(&bytes),
            Err(CacheError::Corrupted { .. })
        ));
    }

    #[test]
    fn short_or_foreign_files_report_corruption() {
        assert!(decode(b"tiny").is_err());
        let mut other = Vec::new();
        other.extend_from_slice(b"NOTMAGIC");
        other.extend_from_slice(&1u32.to_le_bytes());
        other.extend_from_slice(&[0u8; 40]);
        // Fix up the checksum so only the magic is wrong.
        let content_len = other.len() - 32;
        let digest = Sha256::digest(&other[..content_len]);
        let len = other.len();
        other[len - 32..].copy_from_slice(&digest);
        assert!(matches!(
            decode(&other),
            Err(CacheError::Corrupted { reason }) if reason.contains("magic")
        ));
    }
}
