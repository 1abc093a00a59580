//! Persistence seam for the combination tables
//!
//! The engine never touches storage. Hosts implement [`CombinationStore`]
//! as an opaque key/blob store and use [`load_tables`] at startup and
//! [`flush_tables`] whenever they want the tables to be durable.

use crate::model::{ClassCombinationKey, CombinationKey};
use crate::sampler::{LapPointsCombination, LapPositionSampler};
use crate::stats::{FuelCombination, RollingStats};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Store key of the fuel / lap-time table
pub const FUEL_TABLE: &str = "fuel_combinations";

/// Store key of the best-lap profile table
pub const LAP_POINTS_TABLE: &str = "lap_points_combinations";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed '{table}' table: {source}")]
    Codec {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub trait CombinationStore: Send + Sync {
    /// `Ok(None)` when nothing was stored under `key` yet
    fn load_combination(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError>;

    fn persist_combination(&self, key: &str, blob: &[u8]) -> Result<(), PersistError>;
}

/// JSON maps need string keys, so tables are stored as entry lists
#[derive(Serialize, Deserialize)]
struct TableEntry<K, V> {
    key: K,
    value: V,
}

fn encode<K, V>(table: &'static str, entries: Vec<(&K, &V)>) -> Result<Vec<u8>, PersistError>
where
    K: Serialize + Ord,
    V: Serialize,
{
    let mut entries: Vec<TableEntry<&K, &V>> = entries
        .into_iter()
        .map(|(key, value)| TableEntry { key, value })
        .collect();
    entries.sort_by(|a, b| a.key.cmp(b.key));
    serde_json::to_vec_pretty(&entries).map_err(|source| PersistError::Codec { table, source })
}

fn decode<K, V>(table: &'static str, blob: &[u8]) -> Result<Vec<(K, V)>, PersistError>
where
    K: for<'de> Deserialize<'de>,
    V: for<'de> Deserialize<'de>,
{
    let entries: Vec<TableEntry<K, V>> =
        serde_json::from_slice(blob).map_err(|source| PersistError::Codec { table, source })?;
    Ok(entries.into_iter().map(|e| (e.key, e.value)).collect())
}

pub fn encode_fuel_table(stats: &RollingStats) -> Result<Vec<u8>, PersistError> {
    encode(FUEL_TABLE, stats.combinations().collect())
}

pub fn decode_fuel_table(blob: &[u8]) -> Result<Vec<(CombinationKey, FuelCombination)>, PersistError> {
    decode(FUEL_TABLE, blob)
}

pub fn encode_lap_points_table(sampler: &LapPositionSampler) -> Result<Vec<u8>, PersistError> {
    encode(LAP_POINTS_TABLE, sampler.profiles().collect())
}

pub fn decode_lap_points_table(
    blob: &[u8],
) -> Result<Vec<(ClassCombinationKey, LapPointsCombination)>, PersistError> {
    decode(LAP_POINTS_TABLE, blob)
}

/// Install whatever `store` holds into `stats` and `sampler`
pub fn load_tables(
    store: &dyn CombinationStore,
    stats: &mut RollingStats,
    sampler: &mut LapPositionSampler,
) -> Result<(), PersistError> {
    if let Some(blob) = store.load_combination(FUEL_TABLE)? {
        for (key, combination) in decode_fuel_table(&blob)? {
            stats.insert(key, combination);
        }
    }

    if let Some(blob) = store.load_combination(LAP_POINTS_TABLE)? {
        for (key, profile) in decode_lap_points_table(&blob)? {
            if !sampler.insert(key, profile) {
                warn!(
                    layout = key.layout_id,
                    class = key.class_id,
                    "dropping unusable stored lap profile"
                );
            }
        }
    }

    debug!(
        combinations = stats.len(),
        profiles = sampler.len(),
        "combination tables loaded"
    );
    Ok(())
}

pub fn flush_tables(
    store: &dyn CombinationStore,
    stats: &RollingStats,
    sampler: &LapPositionSampler,
) -> Result<(), PersistError> {
    store.persist_combination(FUEL_TABLE, &encode_fuel_table(stats)?)?;
    store.persist_combination(LAP_POINTS_TABLE, &encode_lap_points_table(sampler)?)?;
    Ok(())
}

/// In-process store, mainly for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CombinationStore for MemoryStore {
    fn load_combination(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(self.blobs().get(key).cloned())
    }

    fn persist_combination(&self, key: &str, blob: &[u8]) -> Result<(), PersistError> {
        self.blobs().insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LapSample;
    use crate::units::{Liters, Seconds};

    const KEY: CombinationKey = CombinationKey {
        layout_id: 1693,
        vehicle_id: 5383,
    };
    const CLASS_KEY: ClassCombinationKey = ClassCombinationKey {
        layout_id: 1693,
        class_id: 1703,
    };

    #[test]
    fn test_tables_survive_a_flush_and_load() {
        let mut stats = RollingStats::new(20);
        for lap in 0..25 {
            stats.add_fuel_sample(KEY, Liters(1.0 + lap as f32), true);
            stats.add_lap_time(KEY, Seconds(100.0 - lap as f32));
        }
        stats.add_lap_time(KEY, Seconds(110.0));
        let mut sampler = LapPositionSampler::new(10);
        let samples = [LapSample { fraction: 0.0, elapsed: 0.0 }];
        sampler.complete_lap(CLASS_KEY, &samples, Seconds(80.0));

        let store = MemoryStore::new();
        flush_tables(&store, &stats, &sampler).unwrap();

        let mut loaded_stats = RollingStats::new(20);
        let mut loaded_sampler = LapPositionSampler::new(10);
        load_tables(&store, &mut loaded_stats, &mut loaded_sampler).unwrap();

        let combination = loaded_stats.combination(&KEY).unwrap();
        assert_eq!(combination.capacity(), 20);
        assert_eq!(combination.fuel_samples().count(), 20);
        assert_eq!(loaded_stats.average_fuel(&KEY), stats.average_fuel(&KEY));
        assert_eq!(loaded_stats.best_lap_time(&KEY), Some(Seconds(76.0)));
        assert_eq!(loaded_sampler.best_lap_time(&CLASS_KEY), Some(Seconds(80.0)));
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let store = MemoryStore::new();
        let mut stats = RollingStats::default();
        let mut sampler = LapPositionSampler::default();
        load_tables(&store, &mut stats, &mut sampler).unwrap();
        assert!(stats.is_empty());
        assert!(sampler.is_empty());
    }

    #[test]
    fn test_malformed_table_is_codec_error() {
        let store = MemoryStore::new();
        store.persist_combination(FUEL_TABLE, b"{not json").unwrap();
        let err = load_tables(
            &store,
            &mut RollingStats::default(),
            &mut LapPositionSampler::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PersistError::Codec { table: FUEL_TABLE, .. }));
    }

    #[test]
    fn test_encoded_table_is_entry_list() {
        let mut stats = RollingStats::default();
        stats.add_lap_time(KEY, Seconds(90.0));
        let blob = encode_fuel_table(&stats).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&blob).unwrap();
        assert_eq!(json[0]["key"]["layout_id"], 1693);
        assert_eq!(json[0]["value"]["best_lap_time"], 90.0);
    }

    #[test]
    fn test_unusable_profile_is_skipped_on_load() {
        let broken = br#"[{"key":{"layout_id":1,"class_id":2},"value":{"best_lap_time":0.0,"points":[],"points_per_unit":0.0}}]"#;
        let store = MemoryStore::new();
        store.persist_combination(LAP_POINTS_TABLE, broken).unwrap();
        let mut sampler = LapPositionSampler::default();
        load_tables(&store, &mut RollingStats::default(), &mut sampler).unwrap();
        assert!(sampler.is_empty());
    }
}
