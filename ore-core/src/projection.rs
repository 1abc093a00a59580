//! Race-length projection
//!
//! Estimates how many laps the race will run and how much of that is still
//! ahead of the local player, from the leader's pace and the session budget.

use crate::model::{DriverRecord, Frame, SessionLengthFormat};
use crate::stats::FuelCombination;
use crate::units::{Liters, Seconds};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RaceLength {
    /// Laps the local player will have completed at the flag
    pub total_laps: u32,
    /// Laps (including the current partial one) still to drive
    pub laps_remaining: f32,
}

/// What the projection needs to know about the leader
struct Leader {
    completed_laps: Option<u32>,
    fraction: Option<f32>,
    best_lap: Option<Seconds>,
    current_lap: Option<Seconds>,
    finished: bool,
}

impl Leader {
    /// Place 1, falling back to the local player when nobody is listed there
    fn of(frame: &Frame) -> Self {
        let main = frame.main_driver();
        let Some(leader) = frame.leader() else {
            return Self::local(frame, main);
        };
        if main.is_some_and(|m| std::ptr::eq(m, leader)) {
            return Self::local(frame, Some(leader));
        }
        Self {
            completed_laps: leader.completed_laps,
            fraction: leader.lap_fraction,
            best_lap: leader.lap_time_best,
            current_lap: leader.lap_time_current,
            finished: leader.has_finished(),
        }
    }

    /// The local player's own fields are richer than its driver record
    fn local(frame: &Frame, record: Option<&DriverRecord>) -> Self {
        Self {
            completed_laps: frame.completed_laps.or(record.and_then(|r| r.completed_laps)),
            fraction: frame
                .lap_distance_fraction
                .or(record.and_then(|r| r.lap_fraction)),
            best_lap: frame
                .lap_time_best_self
                .or(record.and_then(|r| r.lap_time_best)),
            current_lap: frame
                .lap_time_current_self
                .or(record.and_then(|r| r.lap_time_current)),
            finished: record.is_some_and(DriverRecord::has_finished),
        }
    }
}

/// Project the race length from `frame`, falling back to the combination's
/// historical best lap when neither the leader nor the local player has a
/// usable best lap yet. `None` when the session budget or a reference lap
/// time is unknown.
pub fn estimate_laps(frame: &Frame, combination: Option<&FuelCombination>) -> Option<RaceLength> {
    let leader = Leader::of(frame);
    let main = frame.main_driver();
    let local_completed = frame
        .completed_laps
        .or(main.and_then(|m| m.completed_laps))?;
    let local_fraction = frame
        .lap_distance_fraction
        .or(main.and_then(|m| m.lap_fraction))?;

    if leader.finished {
        return Some(RaceLength {
            total_laps: local_completed + 1,
            laps_remaining: 1.0 - leader.fraction?,
        });
    }

    let mut remaining = if let Some(time_left) = frame.session_time_remaining {
        let reference = reference_lap(&leader, frame, combination)?;
        let laps = match leader.current_lap {
            Some(current) => (time_left.0 + current.0) / reference.0,
            None => time_left.0 / reference.0 + leader.fraction?,
        };
        laps.ceil().max(0.0) as u32
    } else if let Some(lap_budget) = frame.number_of_laps {
        lap_budget.saturating_sub(leader.completed_laps?)
    } else {
        return None;
    };

    // Leader still has to cross the line before the local player's lap counts
    if leader.fraction.is_some_and(|f| f < local_fraction) {
        remaining += 1;
    }
    if frame.session_length_format == Some(SessionLengthFormat::TimeAndLapBased) {
        remaining += 1;
    }

    Some(RaceLength {
        total_laps: remaining + local_completed,
        laps_remaining: remaining as f32 - local_fraction,
    })
}

fn reference_lap(leader: &Leader, frame: &Frame, combination: Option<&FuelCombination>) -> Option<Seconds> {
    let usable = |t: Option<Seconds>| t.filter(Seconds::is_positive);

    if leader.completed_laps.is_some_and(|l| l > 1) {
        if let Some(best) = usable(leader.best_lap) {
            return Some(best);
        }
    }
    if frame.completed_laps.is_some_and(|l| l > 1) {
        if let Some(best) = usable(frame.lap_time_best_self) {
            return Some(best);
        }
    }
    usable(combination.and_then(FuelCombination::best_lap_time))
}

/// Fuel still needed to reach the flag beyond what is in the tank.
/// Negative when the tank holds more than enough.
pub fn fuel_to_finish(frame: &Frame, combination: Option<&FuelCombination>) -> Option<Liters> {
    let per_lap = combination?.average_fuel()?;
    let fuel_left = frame.fuel_left?;
    let race = estimate_laps(frame, combination)?;
    Some(Liters(per_lap.0 * race.laps_remaining - fuel_left.0))
}
