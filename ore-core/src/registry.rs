//! Driver identity registry
//!
//! The producer has no stable per-car identifier, so each [`DriverRecord`]
//! is resolved to a long-lived [`Driver`] through its [`DriverKey`]. A
//! producer that reuses a slot and livery for a different competitor gets a
//! fresh identity only if the name or user id differs as well.

use crate::model::{DriverKey, DriverRecord};
use std::collections::HashMap;

/// One (lap fraction, elapsed lap time) point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapSample {
    pub fraction: f32,
    pub elapsed: f32,
}

/// Engine-owned identity of one car for the current session
#[derive(Debug, Clone)]
pub struct Driver {
    key: DriverKey,
    pub(crate) completed_laps: Option<u32>,
    pub(crate) in_pitlane: Option<bool>,
    pub(crate) lap_fraction: Option<f32>,
    last_valid: Option<bool>,
    is_main: bool,
    samples: Vec<LapSample>,
}

impl Driver {
    fn new(key: DriverKey, record: &DriverRecord) -> Self {
        Self {
            key,
            completed_laps: record.completed_laps,
            in_pitlane: record.in_pitlane,
            lap_fraction: record.lap_fraction,
            last_valid: record.current_lap_valid,
            is_main: false,
            samples: Vec::new(),
        }
    }

    pub fn key(&self) -> &DriverKey {
        &self.key
    }

    pub fn completed_laps(&self) -> Option<u32> {
        self.completed_laps
    }

    pub fn in_pitlane(&self) -> Option<bool> {
        self.in_pitlane
    }

    /// Validity of the lap in progress as last reported
    pub fn last_valid(&self) -> Option<bool> {
        self.last_valid
    }

    pub(crate) fn set_last_valid(&mut self, valid: Option<bool>) {
        if valid.is_some() {
            self.last_valid = valid;
        }
    }

    pub fn is_main(&self) -> bool {
        self.is_main
    }

    pub(crate) fn set_main(&mut self, is_main: bool) {
        self.is_main = is_main;
    }

    /// Samples collected on the lap in progress
    pub fn samples(&self) -> &[LapSample] {
        &self.samples
    }

    /// Append a sample if it moves forward along the lap
    pub fn record_sample(&mut self, fraction: f32, elapsed: f32) -> bool {
        if let Some(last) = self.samples.last() {
            if fraction <= last.fraction || elapsed < last.elapsed {
                return false;
            }
        }
        self.samples.push(LapSample { fraction, elapsed });
        true
    }

    pub fn clear_samples(&mut self) {
        self.samples.clear();
    }

    pub(crate) fn take_samples(&mut self) -> Vec<LapSample> {
        std::mem::take(&mut self.samples)
    }
}

/// Owned map from composite key to identity
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: HashMap<DriverKey, Driver>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the identity for `record`, creating it on first sight
    pub fn resolve(&mut self, record: &DriverRecord) -> &mut Driver {
        let key = DriverKey::from_record(record);
        self.drivers
            .entry(key)
            .or_insert_with_key(|key| Driver::new(key.clone(), record))
    }

    pub fn get(&self, key: &DriverKey) -> Option<&Driver> {
        self.drivers.get(key)
    }

    pub fn get_mut(&mut self, key: &DriverKey) -> Option<&mut Driver> {
        self.drivers.get_mut(key)
    }

    pub fn contains(&self, key: &DriverKey) -> bool {
        self.drivers.contains_key(key)
    }

    /// Forget every identity
    pub fn reset(&mut self) {
        self.drivers.clear();
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Driver> {
        self.drivers.values()
    }

    pub fn main_driver(&self) -> Option<&Driver> {
        self.drivers.values().find(|d| d.is_main)
    }
}
