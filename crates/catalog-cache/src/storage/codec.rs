//! Entry list codec.
//!
//! Entries are postcard-encoded and then zstd-compressed. The compressed
//! length is what the store budgets against, so `encode` reports it exactly.

use std::io::Write;
use std::thread::available_parallelism;

use crate::error::{CatalogError, Result};
use crate::types::CatalogEntry;

/// Zstd level used for cached payloads.
pub const CODEC_COMPRESSION_LEVEL: i32 = 6;

/// Raw payloads above this size are compressed with zstd worker threads.
const MULTITHREAD_THRESHOLD_BYTES: usize = 4 * 1024 * 1024;

/// An encoded entry list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEntries {
    bytes: Vec<u8>,
}

impl EncodedEntries {
    /// Exact number of bytes that will be persisted.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Encodes `entries` into a compact, compressed byte payload.
pub fn encode(entries: &[CatalogEntry]) -> Result<EncodedEntries> {
    let raw = postcard::to_stdvec(&entries).map_err(|error| {
        CatalogError::Internal(format!("failed to encode entries with postcard: {error}"))
    })?;

    let mut encoder = zstd::Encoder::new(Vec::with_capacity(raw.len() / 4), CODEC_COMPRESSION_LEVEL)
        .map_err(|error| {
            CatalogError::Internal(format!("failed to create zstd encoder: {error}"))
        })?;

    if raw.len() >= MULTITHREAD_THRESHOLD_BYTES {
        let threads = available_parallelism().map(|x| x.get() as u32).unwrap_or(4);
        encoder.multithread(threads).map_err(|error| {
            CatalogError::Internal(format!("failed to enable multi-threaded zstd: {error}"))
        })?;
    }

    encoder.write_all(&raw)?;
    let bytes = encoder.finish()?;
    Ok(EncodedEntries { bytes })
}

/// Decodes a payload produced by [`encode`].
///
/// Malformed input yields `CacheCorrupt`, which callers treat as a cache miss.
pub fn decode(bytes: &[u8]) -> Result<Vec<CatalogEntry>> {
    let raw = zstd::stream::decode_all(bytes)
        .map_err(|error| CatalogError::CacheCorrupt(format!("decompress failed: {error}")))?;
    postcard::from_bytes(&raw)
        .map_err(|error| CatalogError::CacheCorrupt(format!("decode failed: {error}")))
}
