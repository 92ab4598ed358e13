//! Persisted envelope and chunk records.

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Where the entries of a cached catalog live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeLayout {
    /// The encoded entry list is stored in the envelope itself.
    Inline { entries: Vec<u8>, entry_count: u64 },
    /// The envelope is a manifest; entries live in chunks `0..chunk_count`.
    Chunked { chunk_count: u32, total_count: u64 },
}

/// Top-level persisted record.
///
/// `schema_version` is serialized first so a reader can reject foreign
/// layouts before touching the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub schema_version: u32,
    /// Unix millis at which the catalog was written.
    pub timestamp: i64,
    pub layout: EnvelopeLayout,
}

impl CacheEnvelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_stdvec(self).map_err(|error| {
            CatalogError::Internal(format!("failed to encode cache envelope: {error}"))
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        postcard::from_bytes(bytes)
            .map_err(|error| CatalogError::CacheCorrupt(format!("envelope decode failed: {error}")))
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.layout, EnvelopeLayout::Chunked { .. })
    }

    pub fn chunk_count(&self) -> u32 {
        match self.layout {
            EnvelopeLayout::Inline { .. } => 0,
            EnvelopeLayout::Chunked { chunk_count, .. } => chunk_count,
        }
    }

    /// Number of entries the envelope claims to hold.
    pub fn entry_count(&self) -> u64 {
        match self.layout {
            EnvelopeLayout::Inline { entry_count, .. } => entry_count,
            EnvelopeLayout::Chunked { total_count, .. } => total_count,
        }
    }
}

/// One ordered slice of a chunked catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_index: u32,
    /// Must equal the manifest's timestamp; a mismatch means the chunk
    /// belongs to another write.
    pub timestamp: i64,
    pub entries: Vec<u8>,
}

impl Chunk {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_stdvec(self)
            .map_err(|error| CatalogError::Internal(format!("failed to encode chunk: {error}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        postcard::from_bytes(bytes)
            .map_err(|error| CatalogError::CacheCorrupt(format!("chunk decode failed: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_reports_layout() {
        let inline = CacheEnvelope {
            schema_version: 3,
            timestamp: 10,
            layout: EnvelopeLayout::Inline {
                entries: vec![1, 2, 3],
                entry_count: 2,
            },
        };
        assert!(!inline.is_chunked());
        assert_eq!(inline.chunk_count(), 0);
        assert_eq!(inline.entry_count(), 2);

        let chunked = CacheEnvelope {
            schema_version: 3,
            timestamp: 10,
            layout: EnvelopeLayout::Chunked {
                chunk_count: 4,
                total_count: 900,
            },
        };
        let decoded = CacheEnvelope::from_bytes(&chunked.to_bytes().expect("encode"))
            .expect("decode");
        assert_eq!(decoded, chunked);
        assert!(decoded.is_chunked());
        assert_eq!(decoded.chunk_count(), 4);
    }

    #[test]
    fn garbage_envelope_is_corrupt() {
        let result = CacheEnvelope::from_bytes(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(CatalogError::CacheCorrupt(_))));
    }
}
