//! Rolling per-combination statistics
//!
//! Each (track layout, vehicle) combination keeps bounded FIFOs of the most
//! recent fuel-per-lap, lap-time and tire-wear samples, plus the best lap
//! ever seen there. Averages are computed on first read and cached until the
//! next sample arrives.

use crate::config::DEFAULT_SAMPLE_CAPACITY;
use crate::model::CombinationKey;
use crate::units::{Liters, Seconds};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::{HashMap, VecDeque};

fn default_capacity() -> usize {
    DEFAULT_SAMPLE_CAPACITY
}

/// Statistics for one (track layout, vehicle) combination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuelCombination {
    #[serde(default = "default_capacity")]
    capacity: usize,

    #[serde(default)]
    fuel_samples: VecDeque<f32>,

    #[serde(default)]
    lap_times: VecDeque<f32>,

    /// Per-lap tread loss: front-left, front-right, rear-left, rear-right
    #[serde(default)]
    tire_wear_samples: VecDeque<[f32; 4]>,

    /// Monotonic minimum; independent of the lap-time FIFO
    #[serde(default)]
    best_lap_time: Option<f32>,

    #[serde(skip)]
    average_fuel: OnceCell<Option<f32>>,

    #[serde(skip)]
    average_lap_time: OnceCell<Option<f32>>,

    #[serde(skip)]
    average_tire_wear: OnceCell<Option<[f32; 4]>>,
}

fn mean(values: &VecDeque<f32>) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f32>() / values.len() as f32)
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, capacity: usize, value: T) {
    buffer.push_back(value);
    while buffer.len() > capacity {
        buffer.pop_front();
    }
}

impl FuelCombination {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            fuel_samples: VecDeque::new(),
            lap_times: VecDeque::new(),
            tire_wear_samples: VecDeque::new(),
            best_lap_time: None,
            average_fuel: OnceCell::new(),
            average_lap_time: OnceCell::new(),
            average_tire_wear: OnceCell::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record the fuel used over one lap. Returns whether it was accepted.
    pub fn add_fuel_sample(&mut self, amount: Liters, valid: bool) -> bool {
        if !valid || !amount.0.is_finite() || amount.0 <= 0.0 {
            return false;
        }
        push_bounded(&mut self.fuel_samples, self.capacity, amount.0);
        self.average_fuel = OnceCell::new();
        true
    }

    /// Record a lap time. Returns whether it was accepted.
    pub fn add_lap_time(&mut self, lap_time: Seconds) -> bool {
        if !lap_time.0.is_finite() || lap_time.0 <= 0.0 {
            return false;
        }
        push_bounded(&mut self.lap_times, self.capacity, lap_time.0);
        self.average_lap_time = OnceCell::new();
        if self.best_lap_time.map_or(true, |best| lap_time.0 < best) {
            self.best_lap_time = Some(lap_time.0);
        }
        true
    }

    /// Record the tread lost per corner over one lap. Returns whether it was
    /// accepted; a tire change shows up as negative wear and is rejected.
    pub fn add_tire_wear_sample(&mut self, worn: [f32; 4], valid: bool) -> bool {
        let usable = worn.iter().all(|w| w.is_finite() && *w >= 0.0)
            && worn.iter().any(|w| *w > 0.0);
        if !valid || !usable {
            return false;
        }
        push_bounded(&mut self.tire_wear_samples, self.capacity, worn);
        self.average_tire_wear = OnceCell::new();
        true
    }

    pub fn average_fuel(&self) -> Option<Liters> {
        self.average_fuel
            .get_or_init(|| mean(&self.fuel_samples))
            .map(Liters)
    }

    pub fn average_lap_time(&self) -> Option<Seconds> {
        self.average_lap_time
            .get_or_init(|| mean(&self.lap_times))
            .map(Seconds)
    }

    /// Average tread lost per lap, per corner (FL, FR, RL, RR)
    pub fn average_tire_wear(&self) -> Option<[f32; 4]> {
        *self.average_tire_wear.get_or_init(|| {
            if self.tire_wear_samples.is_empty() {
                return None;
            }
            let n = self.tire_wear_samples.len() as f32;
            let mut sum = [0.0f32; 4];
            for sample in &self.tire_wear_samples {
                for (total, w) in sum.iter_mut().zip(sample) {
                    *total += w;
                }
            }
            Some(sum.map(|s| s / n))
        })
    }

    pub fn best_lap_time(&self) -> Option<Seconds> {
        self.best_lap_time.map(Seconds)
    }

    pub fn fuel_samples(&self) -> impl Iterator<Item = Liters> + '_ {
        self.fuel_samples.iter().copied().map(Liters)
    }

    pub fn lap_times(&self) -> impl Iterator<Item = Seconds> + '_ {
        self.lap_times.iter().copied().map(Seconds)
    }

    /// Re-establish the buffer invariants after loading from storage
    pub(crate) fn normalize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.fuel_samples.retain(|v| v.is_finite() && *v > 0.0);
        self.lap_times.retain(|v| v.is_finite() && *v > 0.0);
        let buffered_best = self.lap_times.iter().copied().reduce(f32::min);
        while self.fuel_samples.len() > self.capacity {
            self.fuel_samples.pop_front();
        }
        while self.lap_times.len() > self.capacity {
            self.lap_times.pop_front();
        }
        while self.tire_wear_samples.len() > self.capacity {
            self.tire_wear_samples.pop_front();
        }
        self.best_lap_time = match (self.best_lap_time, buffered_best) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
        .filter(|v| v.is_finite() && *v > 0.0);
        self.average_fuel = OnceCell::new();
        self.average_lap_time = OnceCell::new();
        self.average_tire_wear = OnceCell::new();
    }
}

impl Default for FuelCombination {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAPACITY)
    }
}

/// Rolling statistics for every combination seen
#[derive(Debug, Clone)]
pub struct RollingStats {
    capacity: usize,
    combinations: HashMap<CombinationKey, FuelCombination>,
}

impl RollingStats {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            combinations: HashMap::new(),
        }
    }

    fn entry(&mut self, key: CombinationKey) -> &mut FuelCombination {
        let capacity = self.capacity;
        self.combinations
            .entry(key)
            .or_insert_with(|| FuelCombination::new(capacity))
    }

    pub fn add_fuel_sample(&mut self, key: CombinationKey, amount: Liters, valid: bool) -> bool {
        self.entry(key).add_fuel_sample(amount, valid)
    }

    pub fn add_lap_time(&mut self, key: CombinationKey, lap_time: Seconds) -> bool {
        self.entry(key).add_lap_time(lap_time)
    }

    pub fn add_tire_wear_sample(&mut self, key: CombinationKey, worn: [f32; 4], valid: bool) -> bool {
        self.entry(key).add_tire_wear_sample(worn, valid)
    }

    pub fn average_fuel(&self, key: &CombinationKey) -> Option<Liters> {
        self.combinations.get(key)?.average_fuel()
    }

    pub fn average_lap_time(&self, key: &CombinationKey) -> Option<Seconds> {
        self.combinations.get(key)?.average_lap_time()
    }

    pub fn average_tire_wear(&self, key: &CombinationKey) -> Option<[f32; 4]> {
        self.combinations.get(key)?.average_tire_wear()
    }

    pub fn best_lap_time(&self, key: &CombinationKey) -> Option<Seconds> {
        self.combinations.get(key)?.best_lap_time()
    }

    pub fn combination(&self, key: &CombinationKey) -> Option<&FuelCombination> {
        self.combinations.get(key)
    }

    pub fn combinations(&self) -> impl Iterator<Item = (&CombinationKey, &FuelCombination)> {
        self.combinations.iter()
    }

    /// Install a combination loaded from storage
    pub fn insert(&mut self, key: CombinationKey, mut combination: FuelCombination) {
        combination.normalize(self.capacity);
        self.combinations.insert(key, combination);
    }

    pub fn len(&self) -> usize {
        self.combinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }
}

impl Default for RollingStats {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TireWear;

    const KEY: CombinationKey = CombinationKey {
        layout_id: 1693,
        vehicle_id: 5383,
    };

    #[test]
    fn test_average_fuel_evicts_oldest() {
        let mut stats = RollingStats::new(20);
        for i in 1..=25 {
            assert!(stats.add_fuel_sample(KEY, Liters(i as f32), true));
        }
        // Samples 6..=25 remain
        let expected = (6..=25).sum::<i32>() as f32 / 20.0;
        let avg = stats.average_fuel(&KEY).unwrap();
        assert!((avg.0 - expected).abs() < 1e-4);
        assert_eq!(stats.combination(&KEY).unwrap().fuel_samples().count(), 20);
    }

    #[test]
    fn test_non_positive_fuel_rejected() {
        let mut stats = RollingStats::default();
        stats.add_fuel_sample(KEY, Liters(2.5), true);
        let before = stats.average_fuel(&KEY);

        assert!(!stats.add_fuel_sample(KEY, Liters(0.0), true));
        assert!(!stats.add_fuel_sample(KEY, Liters(-12.0), true));
        assert!(!stats.add_fuel_sample(KEY, Liters(f32::NAN), true));
        assert_eq!(stats.average_fuel(&KEY), before);
    }

    #[test]
    fn test_invalid_fuel_sample_rejected() {
        let mut stats = RollingStats::default();
        assert!(!stats.add_fuel_sample(KEY, Liters(2.5), false));
        assert!(stats.average_fuel(&KEY).is_none());
    }

    #[test]
    fn test_average_cache_invalidated_on_append() {
        let mut combo = FuelCombination::new(20);
        combo.add_lap_time(Seconds(90.0));
        assert_eq!(combo.average_lap_time(), Some(Seconds(90.0)));
        combo.add_lap_time(Seconds(92.0));
        assert_eq!(combo.average_lap_time(), Some(Seconds(91.0)));
    }

    #[test]
    fn test_best_lap_survives_eviction() {
        let mut stats = RollingStats::new(3);
        stats.add_lap_time(KEY, Seconds(88.5));
        for t in [91.0, 92.0, 93.0, 94.0] {
            stats.add_lap_time(KEY, Seconds(t));
        }
        let combo = stats.combination(&KEY).unwrap();
        assert!(combo.lap_times().all(|t| t.0 > 90.0));
        assert_eq!(stats.best_lap_time(&KEY), Some(Seconds(88.5)));
    }

    #[test]
    fn test_best_lap_is_minimum_of_positive_inputs() {
        let mut stats = RollingStats::new(2);
        let inputs = [95.0, -1.0, 0.0, 93.2, 97.0, 93.4, 99.9];
        for t in inputs {
            stats.add_lap_time(KEY, Seconds(t));
        }
        assert_eq!(stats.best_lap_time(&KEY), Some(Seconds(93.2)));
    }

    #[test]
    fn test_unknown_combination_is_unavailable() {
        let stats = RollingStats::default();
        assert!(stats.average_fuel(&KEY).is_none());
        assert!(stats.average_lap_time(&KEY).is_none());
        assert!(stats.best_lap_time(&KEY).is_none());
        assert!(stats.average_tire_wear(&KEY).is_none());
    }

    #[test]
    fn test_tire_wear_average_and_rejection() {
        let mut stats = RollingStats::default();
        assert!(stats.add_tire_wear_sample(KEY, [0.02, 0.02, 0.01, 0.01], true));
        assert!(stats.add_tire_wear_sample(KEY, [0.04, 0.02, 0.03, 0.01], true));
        // Fresh tires fitted mid-lap
        assert!(!stats.add_tire_wear_sample(KEY, [-0.9, -0.9, -0.9, -0.9], true));
        assert!(!stats.add_tire_wear_sample(KEY, [0.0; 4], true));
        assert!(!stats.add_tire_wear_sample(KEY, [0.02; 4], false));

        let avg = stats.average_tire_wear(&KEY).unwrap();
        assert!((avg[0] - 0.03).abs() < 1e-6);
        assert!((avg[2] - 0.02).abs() < 1e-6);
        // Corner order follows TireWear::worn_since
        let before = TireWear::from_corners([0.9, 0.8, 0.7, 0.6]);
        let after = TireWear::from_corners([0.85, 0.8, 0.7, 0.6]);
        let mut combo = FuelCombination::new(20);
        assert!(combo.add_tire_wear_sample(before.worn_since(&after), true));
        let avg = combo.average_tire_wear().unwrap();
        assert!((avg[0] - 0.05).abs() < 1e-6);
        assert_eq!(&avg[1..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_tire_wear_buffer_bounded() {
        let mut combo = FuelCombination::new(2);
        combo.add_tire_wear_sample([0.1; 4], true);
        combo.add_tire_wear_sample([0.2; 4], true);
        combo.add_tire_wear_sample([0.3; 4], true);
        let avg = combo.average_tire_wear().unwrap();
        assert!((avg[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_restores_invariants() {
        let json = r#"{
            "capacity": 2,
            "fuel_samples": [1.0, 2.0, -3.0, 4.0],
            "lap_times": [80.0, 90.0, 91.0],
            "best_lap_time": 85.0
        }"#;
        let combo: FuelCombination = serde_json::from_str(json).unwrap();
        let mut stats = RollingStats::new(2);
        stats.insert(KEY, combo);

        let combo = stats.combination(&KEY).unwrap();
        assert_eq!(combo.fuel_samples().count(), 2);
        assert_eq!(combo.lap_times().count(), 2);
        // 80.0 was evicted but still the best ever seen
        assert_eq!(combo.best_lap_time(), Some(Seconds(80.0)));
        assert_eq!(combo.average_fuel(), Some(Liters(3.0)));
    }
}
