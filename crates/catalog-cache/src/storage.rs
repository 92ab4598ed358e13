//! Storage layer for the catalog cache.
//!
//! This module provides:
//! - The entry codec (postcard + zstd) with exact size reporting
//! - Bounded key-value partitions (in-memory and file-backed)
//! - The persisted envelope and chunk records
//! - `CacheStore`, which lays a catalog out inline or across chunks

mod codec;
mod envelope;
mod partition;
mod store;

pub use codec::{decode, encode, EncodedEntries, CODEC_COMPRESSION_LEVEL};
pub use envelope::{CacheEnvelope, Chunk, EnvelopeLayout};
pub use partition::{FilePartition, MemoryPartition, SharedPartition, StoragePartition};
pub use store::{CacheStore, CachedCatalog, WriteOutcome};
