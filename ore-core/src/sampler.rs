//! Best-lap delta profiles
//!
//! While the main driver laps, the engine collects (lap fraction, elapsed)
//! samples on its [`Driver`](crate::registry::Driver). When a valid lap
//! completes faster than the stored best for its (layout, class), those
//! samples are resampled onto a fixed grid so any later position on the lap
//! can be turned into a time delta.

use crate::config::DEFAULT_PROFILE_RESOLUTION;
use crate::model::ClassCombinationKey;
use crate::registry::LapSample;
use crate::units::Seconds;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Largest gap at the start of the lap that a recorded lap may have.
/// Laps picked up mid-way are not turned into profiles.
const MAX_START_GAP: f32 = 0.05;

/// Stored best lap for one (layout, class)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapPointsCombination {
    pub best_lap_time: f32,
    /// Cumulative lap time at each distance bucket
    pub points: Vec<f32>,
    /// Buckets per unit of lap fraction
    pub points_per_unit: f32,
}

impl LapPointsCombination {
    /// Resample `samples` of a lap that took `lap_time` onto
    /// `resolution + 1` evenly spaced points from 0.0 to 1.0
    pub fn from_samples(samples: &[LapSample], lap_time: f32, resolution: usize) -> Self {
        let resolution = resolution.max(1);

        let mut anchors: Vec<(f32, f32)> = Vec::with_capacity(samples.len() + 2);
        anchors.push((0.0, 0.0));
        for s in samples {
            let (last_f, last_t) = anchors[anchors.len() - 1];
            if s.fraction > last_f && s.fraction < 1.0 && s.elapsed >= last_t && s.elapsed <= lap_time {
                anchors.push((s.fraction, s.elapsed));
            }
        }
        anchors.push((1.0, lap_time));

        let mut points = Vec::with_capacity(resolution + 1);
        let mut j = 0;
        for i in 0..=resolution {
            let f = i as f32 / resolution as f32;
            while j + 2 < anchors.len() && anchors[j + 1].0 < f {
                j += 1;
            }
            let (f0, t0) = anchors[j];
            let (f1, t1) = anchors[j + 1];
            let ratio = ((f - f0) / (f1 - f0)).clamp(0.0, 1.0);
            points.push(t0 + (t1 - t0) * ratio);
        }

        Self {
            best_lap_time: lap_time,
            points,
            points_per_unit: resolution as f32,
        }
    }

    /// Time at which the best lap passed `fraction`
    pub fn time_at(&self, fraction: f32) -> Option<Seconds> {
        if self.points.is_empty() || !fraction.is_finite() {
            return None;
        }
        let last = (self.points.len() - 1) as f32;
        let index = (fraction.clamp(0.0, 1.0) * self.points_per_unit).min(last);
        let lower = index.floor() as usize;
        let upper = index.ceil() as usize;
        let ratio = index - lower as f32;
        let t = self.points[lower] + (self.points[upper] - self.points[lower]) * ratio;
        Some(Seconds(t))
    }

    fn is_usable(&self) -> bool {
        self.best_lap_time.is_finite()
            && self.best_lap_time > 0.0
            && self.points_per_unit > 0.0
            && !self.points.is_empty()
    }
}

/// Best-lap profiles for every (layout, class) seen
#[derive(Debug, Clone)]
pub struct LapPositionSampler {
    resolution: usize,
    profiles: HashMap<ClassCombinationKey, LapPointsCombination>,
}

impl LapPositionSampler {
    pub fn new(resolution: usize) -> Self {
        Self {
            resolution: resolution.max(1),
            profiles: HashMap::new(),
        }
    }

    /// Offer a completed valid lap. The stored profile is replaced only when
    /// `lap_time` is strictly better. Returns whether it was replaced.
    pub fn complete_lap(
        &mut self,
        key: ClassCombinationKey,
        samples: &[LapSample],
        lap_time: Seconds,
    ) -> bool {
        if !lap_time.is_positive() || !lap_time.0.is_finite() {
            return false;
        }
        match samples.first() {
            Some(first) if first.fraction <= MAX_START_GAP => {}
            _ => return false,
        }
        if let Some(existing) = self.profiles.get(&key) {
            if lap_time.0 >= existing.best_lap_time {
                return false;
            }
        }

        debug!(
            layout = key.layout_id,
            class = key.class_id,
            lap_time = lap_time.0,
            samples = samples.len(),
            "new best lap profile"
        );
        let profile = LapPointsCombination::from_samples(samples, lap_time.0, self.resolution);
        self.profiles.insert(key, profile);
        true
    }

    pub fn profile(&self, key: &ClassCombinationKey) -> Option<&LapPointsCombination> {
        self.profiles.get(key)
    }

    pub fn best_lap_time(&self, key: &ClassCombinationKey) -> Option<Seconds> {
        self.profiles.get(key).map(|p| Seconds(p.best_lap_time))
    }

    pub fn time_at(&self, key: &ClassCombinationKey, fraction: f32) -> Option<Seconds> {
        self.profiles.get(key)?.time_at(fraction)
    }

    /// Time gained (negative) or lost (positive) against the stored best at
    /// the same point on the lap
    pub fn delta(&self, key: &ClassCombinationKey, fraction: f32, elapsed: Seconds) -> Option<Seconds> {
        let reference = self.time_at(key, fraction)?;
        Some(Seconds(elapsed.0 - reference.0))
    }

    pub fn profiles(&self) -> impl Iterator<Item = (&ClassCombinationKey, &LapPointsCombination)> {
        self.profiles.iter()
    }

    /// Install a profile loaded from storage; unusable profiles are dropped
    pub fn insert(&mut self, key: ClassCombinationKey, profile: LapPointsCombination) -> bool {
        if !profile.is_usable() {
            return false;
        }
        self.profiles.insert(key, profile);
        true
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for LapPositionSampler {
    fn default() -> Self {
        Self::new(DEFAULT_PROFILE_RESOLUTION)
    }
}
