//! Cache store - envelope/chunk read and write operations.
//!
//! A catalog whose encoded size fits the inline budget is written as a single
//! envelope. Larger catalogs are split into the fewest chunks that each fit
//! the per-chunk budget; the chunks are written first and the envelope
//! (manifest) last, so readers never see a manifest without its chunks. Any
//! failure part-way through rolls the whole write back with `clear()`.

use std::sync::Arc;
use std::time::Instant;

use crate::clock::{elapsed_millis, Clock};
use crate::config::CacheConfig;
use crate::error::{CatalogError, Result};
use crate::types::{CacheStats, CatalogEntry};

use super::codec::{decode, encode, EncodedEntries};
use super::envelope::{CacheEnvelope, Chunk, EnvelopeLayout};
use super::partition::SharedPartition;

/// A validated catalog read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCatalog {
    /// Unix millis at which the catalog was written.
    pub timestamp: i64,
    /// `Some` when the catalog was stored in chunks.
    pub chunk_count: Option<u32>,
    pub entries: Vec<CatalogEntry>,
}

/// How a successful write laid the catalog out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inline { size: usize },
    Chunked { chunk_count: u32, size: usize },
}

pub struct CacheStore {
    config: CacheConfig,
    primary: SharedPartition,
    overflow: Option<SharedPartition>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.config)
            .field("primary", &self.primary.name())
            .field("overflow", &self.overflow.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

impl CacheStore {
    pub fn new(
        config: CacheConfig,
        primary: SharedPartition,
        overflow: Option<SharedPartition>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            primary,
            overflow,
            clock,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn partitions(&self) -> impl Iterator<Item = &SharedPartition> {
        std::iter::once(&self.primary).chain(self.overflow.iter())
    }

    // -----------------------------------------------------------------------
    // Read operations
    // -----------------------------------------------------------------------

    /// Loads the cached catalog if it is present and valid.
    ///
    /// Anything other than a plain miss (corrupt, expired, stale schema,
    /// missing chunk) also deletes what is stored.
    pub fn read_envelope(&self) -> Option<CachedCatalog> {
        let started = Instant::now();
        match self.try_read() {
            Ok(cached) => {
                log::debug!(
                    "catalog cache hit ({} entries, chunks={:?}, load_ms={})",
                    cached.entries.len(),
                    cached.chunk_count,
                    started.elapsed().as_millis()
                );
                Some(cached)
            }
            Err(CatalogError::CacheAbsent) => {
                log::debug!("catalog cache absent");
                None
            }
            Err(error) => {
                log::debug!("catalog cache invalid, discarding: {error}");
                if let Err(clear_error) = self.clear() {
                    log::warn!("failed to clear invalid catalog cache: {clear_error}");
                }
                None
            }
        }
    }

    /// Reads and validates the cache, reporting why it is unusable.
    pub fn try_read(&self) -> Result<CachedCatalog> {
        let bytes = self
            .read_key(&self.config.envelope_key())?
            .ok_or(CatalogError::CacheAbsent)?;
        let envelope = CacheEnvelope::from_bytes(&bytes)?;
        self.validate_envelope(&envelope)?;

        let (entries, chunk_count) = match envelope.layout {
            EnvelopeLayout::Inline {
                entries,
                entry_count,
            } => {
                let entries = decode(&entries)?;
                if entries.len() as u64 != entry_count {
                    return Err(CatalogError::CacheCorrupt(format!(
                        "inline entry count {} != manifest {entry_count}",
                        entries.len()
                    )));
                }
                (entries, None)
            }
            EnvelopeLayout::Chunked {
                chunk_count,
                total_count,
            } => (
                self.read_chunks(envelope.timestamp, chunk_count, total_count)?,
                Some(chunk_count),
            ),
        };

        if let Some(first) = entries.first() {
            if !first.has_required_fields() {
                return Err(CatalogError::CacheSchemaStale(
                    "first cached entry is missing required fields".to_string(),
                ));
            }
        }

        Ok(CachedCatalog {
            timestamp: envelope.timestamp,
            chunk_count,
            entries,
        })
    }

    fn validate_envelope(&self, envelope: &CacheEnvelope) -> Result<()> {
        if envelope.schema_version != self.config.schema_version {
            return Err(CatalogError::CacheSchemaStale(format!(
                "schema version {} != {}",
                envelope.schema_version, self.config.schema_version
            )));
        }

        let age_ms = elapsed_millis(self.clock.now_millis(), envelope.timestamp);
        let ttl_ms = self.config.ttl_ms();
        if age_ms >= ttl_ms {
            return Err(CatalogError::CacheExpired { age_ms, ttl_ms });
        }

        if envelope.chunk_count() > self.config.max_chunks {
            return Err(CatalogError::CacheCorrupt(format!(
                "manifest lists {} chunks, cap is {}",
                envelope.chunk_count(),
                self.config.max_chunks
            )));
        }
        Ok(())
    }

    fn read_chunks(
        &self,
        timestamp: i64,
        chunk_count: u32,
        total_count: u64,
    ) -> Result<Vec<CatalogEntry>> {
        let mut entries = Vec::new();
        for index in 0..chunk_count {
            let bytes = self
                .read_key(&self.config.chunk_key(index))?
                .ok_or(CatalogError::ChunkMissing { index })?;
            let chunk = Chunk::from_bytes(&bytes)?;
            if chunk.chunk_index != index || chunk.timestamp != timestamp {
                return Err(CatalogError::CacheCorrupt(format!(
                    "chunk {index} belongs to another write (index {}, timestamp {})",
                    chunk.chunk_index, chunk.timestamp
                )));
            }
            entries.extend(decode(&chunk.entries)?);
        }

        if entries.len() as u64 != total_count {
            return Err(CatalogError::CacheCorrupt(format!(
                "reassembled {} entries, manifest lists {total_count}",
                entries.len()
            )));
        }
        Ok(entries)
    }

    fn read_key(&self, key: &str) -> Result<Option<Vec<u8>>> {
        for partition in self.partitions() {
            if let Some(bytes) = partition.get(key)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Write operations
    // -----------------------------------------------------------------------

    /// Persists `entries`, replacing any previous cache.
    ///
    /// The whole catalog is encoded once to choose between the inline and
    /// chunked layouts. A chunked write encodes each planned slice separately,
    /// and those slice bytes are exactly what gets stored.
    ///
    /// Returns `CapacityExceeded` without touching storage when the catalog
    /// cannot be split into `max_chunks` chunks. A partition failure part-way
    /// through leaves the store empty.
    pub fn write_entries(&self, entries: &[CatalogEntry]) -> Result<WriteOutcome> {
        let started = Instant::now();
        let encoded = encode(entries)?;
        let size = encoded.size();
        let timestamp = self.clock.now_millis();

        if size <= self.config.inline_budget || entries.is_empty() {
            self.clear()?;
            let envelope = CacheEnvelope {
                schema_version: self.config.schema_version,
                timestamp,
                layout: EnvelopeLayout::Inline {
                    entries: encoded.into_bytes(),
                    entry_count: entries.len() as u64,
                },
            };
            self.write_or_rollback(&self.config.envelope_key(), &envelope.to_bytes()?)?;
            log::info!(
                "wrote catalog cache inline ({} entries, {size} bytes, write_ms={})",
                entries.len(),
                started.elapsed().as_millis()
            );
            return Ok(WriteOutcome::Inline { size });
        }

        let chunks = self.plan_chunks(entries, size)?;
        let chunk_count = chunks.len() as u32;

        self.clear()?;
        for (index, payload) in chunks.into_iter().enumerate() {
            let chunk = Chunk {
                chunk_index: index as u32,
                timestamp,
                entries: payload.into_bytes(),
            };
            self.write_or_rollback(&self.config.chunk_key(index as u32), &chunk.to_bytes()?)?;
        }

        let envelope = CacheEnvelope {
            schema_version: self.config.schema_version,
            timestamp,
            layout: EnvelopeLayout::Chunked {
                chunk_count,
                total_count: entries.len() as u64,
            },
        };
        self.write_or_rollback(&self.config.envelope_key(), &envelope.to_bytes()?)?;

        log::info!(
            "wrote catalog cache in {chunk_count} chunks ({} entries, {size} bytes, write_ms={})",
            entries.len(),
            started.elapsed().as_millis()
        );
        Ok(WriteOutcome::Chunked { chunk_count, size })
    }

    /// Splits `entries` into the fewest equal slices whose encodings all fit
    /// `max_chunk_size`, starting from the count the total size implies.
    fn plan_chunks(&self, entries: &[CatalogEntry], size: usize) -> Result<Vec<EncodedEntries>> {
        let max_chunks = self.config.max_chunks;
        let mut count = size.div_ceil(self.config.max_chunk_size).max(1);

        loop {
            if count > max_chunks as usize || count > entries.len() {
                return Err(CatalogError::CapacityExceeded {
                    required: count,
                    max: max_chunks,
                });
            }

            let per_chunk = entries.len().div_ceil(count);
            let encoded = entries
                .chunks(per_chunk)
                .map(encode)
                .collect::<Result<Vec<_>>>()?;

            if encoded
                .iter()
                .all(|chunk| chunk.size() <= self.config.max_chunk_size)
            {
                return Ok(encoded);
            }
            count += 1;
        }
    }

    fn write_or_rollback(&self, key: &str, bytes: &[u8]) -> Result<()> {
        match self.write_key(key, bytes) {
            Ok(()) => Ok(()),
            Err(error) => {
                log::warn!("catalog cache write of {key} failed, rolling back: {error}");
                if let Err(clear_error) = self.clear() {
                    log::warn!("catalog cache rollback failed: {clear_error}");
                }
                Err(error)
            }
        }
    }

    /// Writes to the primary partition, spilling to overflow when it is full.
    fn write_key(&self, key: &str, bytes: &[u8]) -> Result<()> {
        match self.primary.set(key, bytes) {
            Ok(()) => Ok(()),
            Err(error) if error.is_quota_exceeded() => match &self.overflow {
                Some(overflow) => {
                    log::debug!(
                        "partition {} full, writing {key} to {}",
                        self.primary.name(),
                        overflow.name()
                    );
                    overflow.set(key, bytes)
                }
                None => Err(error),
            },
            Err(error) => Err(error),
        }
    }

    /// Deletes the envelope and every possible chunk key from all partitions.
    ///
    /// Keeps going after a failed delete and returns the first error.
    pub fn clear(&self) -> Result<()> {
        let mut keys = Vec::with_capacity(self.config.max_chunks as usize + 1);
        keys.push(self.config.envelope_key());
        keys.extend((0..self.config.max_chunks).map(|index| self.config.chunk_key(index)));

        let mut first_error = None;
        for partition in self.partitions() {
            for key in &keys {
                if let Err(error) = partition.remove(key) {
                    first_error.get_or_insert(error);
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Summarizes the stored envelope without loading chunk payloads.
    pub fn stats(&self) -> CacheStats {
        let bytes = match self.read_key(&self.config.envelope_key()) {
            Ok(Some(bytes)) => bytes,
            _ => return CacheStats::default(),
        };
        let Ok(envelope) = CacheEnvelope::from_bytes(&bytes) else {
            return CacheStats {
                has_cache: true,
                ..CacheStats::default()
            };
        };

        let age_ms = elapsed_millis(self.clock.now_millis(), envelope.timestamp);
        CacheStats {
            has_cache: true,
            item_count: envelope.entry_count() as usize,
            age_ms: Some(age_ms),
            is_valid: self.validate_envelope(&envelope).is_ok(),
            is_chunked: envelope.is_chunked(),
            chunk_count: envelope.chunk_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{MemoryPartition, StoragePartition};

    const T0: i64 = 1_700_000_000_000;

    /// Entries with incompressible descriptions so sizes scale with count.
    fn noisy_entries(count: usize) -> Vec<CatalogEntry> {
        let mut state = 0x9e37_79b9_7f4a_7c15u64;
        (0..count)
            .map(|i| {
                let mut description = String::with_capacity(256);
                for _ in 0..16 {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    description.push_str(&format!("{state:016x}"));
                }
                CatalogEntry {
                    id: format!("p{i}"),
                    name: format!("Product {i}"),
                    description,
                    sku: format!("SKU-{i:05}"),
                    price: 10.0 + i as f64,
                    created_at: T0 + i as i64,
                    ..CatalogEntry::default()
                }
            })
            .collect()
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        primary: Arc<MemoryPartition>,
        overflow: Arc<MemoryPartition>,
        store: CacheStore,
    }

    fn fixture_with(config: CacheConfig, primary: MemoryPartition, overflow: MemoryPartition) -> Fixture {
        let clock = Arc::new(ManualClock::new(T0));
        let primary = Arc::new(primary);
        let overflow = Arc::new(overflow);
        let store = CacheStore::new(
            config,
            primary.clone(),
            Some(overflow.clone() as SharedPartition),
            clock.clone(),
        )
        .expect("store");
        Fixture {
            clock,
            primary,
            overflow,
            store,
        }
    }

    fn small_budget_config() -> CacheConfig {
        CacheConfig {
            inline_budget: 2 * 1024,
            max_chunk_size: 4 * 1024,
            max_chunks: 16,
            ..CacheConfig::default()
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            small_budget_config(),
            MemoryPartition::new("primary"),
            MemoryPartition::new("overflow"),
        )
    }

    fn assert_empty(fixture: &Fixture) {
        assert!(fixture.primary.is_empty(), "primary: {:?}", fixture.primary.keys());
        assert!(fixture.overflow.is_empty(), "overflow: {:?}", fixture.overflow.keys());
    }

    #[test]
    fn small_catalog_is_written_inline() {
        let fixture = fixture();
        let entries = noisy_entries(3);

        let outcome = fixture.store.write_entries(&entries).expect("write");
        assert!(matches!(outcome, WriteOutcome::Inline { .. }));
        assert_eq!(fixture.primary.keys(), vec!["catalog-cache:envelope".to_string()]);

        let cached = fixture.store.read_envelope().expect("cache hit");
        assert_eq!(cached.entries, entries);
        assert_eq!(cached.chunk_count, None);
        assert_eq!(cached.timestamp, T0);
    }

    #[test]
    fn large_catalog_is_chunked_and_reassembled_in_order() {
        let fixture = fixture();
        let entries = noisy_entries(100);

        let outcome = fixture.store.write_entries(&entries).expect("write");
        let WriteOutcome::Chunked { chunk_count, size } = outcome else {
            panic!("expected chunked layout, got {outcome:?}");
        };
        assert!(size > 2 * 1024);
        assert!(chunk_count >= 2 && chunk_count <= 16);

        for index in 0..chunk_count {
            let bytes = fixture
                .primary
                .get(&fixture.store.config().chunk_key(index))
                .expect("get")
                .expect("chunk present");
            let chunk = Chunk::from_bytes(&bytes).expect("chunk");
            assert!(chunk.entries.len() <= 4 * 1024);
        }

        let cached = fixture.store.read_envelope().expect("cache hit");
        assert_eq!(cached.chunk_count, Some(chunk_count));
        assert_eq!(cached.entries, entries);
    }

    #[test]
    fn envelope_expires_exactly_at_ttl() {
        let fixture = fixture();
        let entries = noisy_entries(5);
        fixture.store.write_entries(&entries).expect("write");
        let ttl_ms = fixture.store.config().ttl_ms() as i64;

        fixture.clock.set(T0 + ttl_ms - 1);
        assert!(fixture.store.read_envelope().is_some());

        fixture.clock.set(T0 + ttl_ms);
        assert!(matches!(
            fixture.store.try_read(),
            Err(CatalogError::CacheExpired { .. })
        ));
        assert!(fixture.store.read_envelope().is_none());
        assert_empty(&fixture);
    }

    #[test]
    fn capacity_exceeded_writes_nothing() {
        let fixture = fixture_with(
            CacheConfig {
                inline_budget: 1024,
                max_chunk_size: 1024,
                max_chunks: 2,
                ..CacheConfig::default()
            },
            MemoryPartition::new("primary"),
            MemoryPartition::new("overflow"),
        );

        let err = fixture
            .store
            .write_entries(&noisy_entries(100))
            .expect_err("too many chunks");
        match err {
            CatalogError::CapacityExceeded { required, max } => {
                assert!(required > 2);
                assert_eq!(max, 2);
            }
            other => panic!("expected capacity exceeded, got {other:?}"),
        }
        assert_empty(&fixture);
    }

    #[test]
    fn single_oversized_entry_exceeds_capacity() {
        let fixture = fixture_with(
            CacheConfig {
                inline_budget: 64,
                max_chunk_size: 64,
                max_chunks: 8,
                ..CacheConfig::default()
            },
            MemoryPartition::new("primary"),
            MemoryPartition::new("overflow"),
        );
        let err = fixture
            .store
            .write_entries(&noisy_entries(1))
            .expect_err("entry larger than a chunk");
        assert!(matches!(err, CatalogError::CapacityExceeded { .. }));
        assert_empty(&fixture);
    }

    #[test]
    fn full_primary_spills_chunks_to_overflow() {
        let fixture = fixture_with(
            small_budget_config(),
            MemoryPartition::with_quota("primary", 6 * 1024),
            MemoryPartition::new("overflow"),
        );
        let entries = noisy_entries(100);

        fixture.store.write_entries(&entries).expect("write");
        assert!(!fixture.overflow.is_empty());
        assert!(fixture.primary.used_bytes() <= 6 * 1024);

        let cached = fixture.store.read_envelope().expect("cache hit");
        assert_eq!(cached.entries, entries);
    }

    #[test]
    fn failure_on_both_partitions_rolls_back() {
        let fixture = fixture_with(
            small_budget_config(),
            MemoryPartition::with_quota("primary", 4_500),
            MemoryPartition::with_quota("overflow", 4_500),
        );

        let err = fixture
            .store
            .write_entries(&noisy_entries(100))
            .expect_err("both partitions full");
        assert!(err.is_quota_exceeded());
        assert_empty(&fixture);
        assert!(fixture.store.read_envelope().is_none());
    }

    #[test]
    fn schema_version_mismatch_invalidates() {
        let clock = Arc::new(ManualClock::new(T0));
        let primary = Arc::new(MemoryPartition::new("primary"));
        let writer = CacheStore::new(
            CacheConfig::default(),
            primary.clone(),
            None,
            clock.clone(),
        )
        .expect("writer");
        writer.write_entries(&noisy_entries(2)).expect("write");

        let reader = CacheStore::new(
            CacheConfig {
                schema_version: CacheConfig::default().schema_version + 1,
                ..CacheConfig::default()
            },
            primary.clone(),
            None,
            clock,
        )
        .expect("reader");
        assert!(matches!(
            reader.try_read(),
            Err(CatalogError::CacheSchemaStale(_))
        ));
        assert!(reader.read_envelope().is_none());
        assert!(primary.is_empty());
    }

    #[test]
    fn entries_missing_required_fields_are_stale() {
        let fixture = fixture();
        let mut entries = noisy_entries(2);
        entries[0].sku.clear();
        fixture.store.write_entries(&entries).expect("write");

        assert!(matches!(
            fixture.store.try_read(),
            Err(CatalogError::CacheSchemaStale(_))
        ));
        assert!(fixture.store.read_envelope().is_none());
        assert_empty(&fixture);
    }

    #[test]
    fn corrupt_envelope_is_discarded() {
        let fixture = fixture();
        fixture
            .primary
            .set(&fixture.store.config().envelope_key(), b"garbage")
            .expect("set");

        assert!(fixture.store.read_envelope().is_none());
        assert_empty(&fixture);
    }

    #[test]
    fn missing_chunk_invalidates_entire_cache() {
        let fixture = fixture();
        fixture
            .store
            .write_entries(&noisy_entries(100))
            .expect("write");
        let missing = fixture.store.config().chunk_key(1);
        fixture.primary.remove(&missing).expect("remove");
        fixture.overflow.remove(&missing).expect("remove");

        assert!(matches!(
            fixture.store.try_read(),
            Err(CatalogError::ChunkMissing { index: 1 })
        ));
        assert!(fixture.store.read_envelope().is_none());
        assert_empty(&fixture);
    }

    #[test]
    fn chunk_from_another_write_is_corrupt() {
        let fixture = fixture();
        fixture
            .store
            .write_entries(&noisy_entries(100))
            .expect("write");
        let key = fixture.store.config().chunk_key(0);
        let mut chunk =
            Chunk::from_bytes(&fixture.primary.get(&key).expect("get").expect("chunk"))
                .expect("decode");
        chunk.timestamp += 1;
        fixture
            .primary
            .set(&key, &chunk.to_bytes().expect("encode"))
            .expect("set");

        assert!(matches!(
            fixture.store.try_read(),
            Err(CatalogError::CacheCorrupt(_))
        ));
    }

    #[test]
    fn rewrite_replaces_chunked_with_inline() {
        let fixture = fixture();
        fixture
            .store
            .write_entries(&noisy_entries(100))
            .expect("chunked write");
        fixture
            .store
            .write_entries(&noisy_entries(2))
            .expect("inline write");

        assert_eq!(
            fixture.primary.keys(),
            vec!["catalog-cache:envelope".to_string()]
        );
        assert_eq!(
            fixture.store.read_envelope().expect("hit").entries.len(),
            2
        );
    }

    #[test]
    fn stats_describe_stored_envelope() {
        let fixture = fixture();
        assert_eq!(fixture.store.stats(), CacheStats::default());

        let entries = noisy_entries(100);
        let WriteOutcome::Chunked { chunk_count, .. } =
            fixture.store.write_entries(&entries).expect("write")
        else {
            panic!("expected chunked layout");
        };
        fixture.clock.set(T0 + 1_500);

        let stats = fixture.store.stats();
        assert!(stats.has_cache);
        assert!(stats.is_valid);
        assert!(stats.is_chunked);
        assert_eq!(stats.chunk_count, chunk_count);
        assert_eq!(stats.item_count, 100);
        assert_eq!(stats.age_ms, Some(1_500));

        fixture
            .clock
            .set(T0 + fixture.store.config().ttl_ms() as i64);
        assert!(!fixture.store.stats().is_valid);
    }

    #[test]
    fn clear_removes_everything() {
        let fixture = fixture();
        fixture
            .store
            .write_entries(&noisy_entries(100))
            .expect("write");
        fixture.store.clear().expect("clear");
        assert_empty(&fixture);
    }
}
