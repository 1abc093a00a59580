//! Producer-side frame layout and the sentinel boundary
//!
//! The producer writes a flat struct where `-1` (or any negative float)
//! means "not available in this frame". [`Frame::from_raw`] is the only
//! place those sentinels are interpreted; everything downstream works with
//! `Option`.

use crate::model::*;
use crate::units::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Size of the producer's NUL-terminated driver name buffer
pub const NAME_BUFFER_LEN: usize = 64;

/// Sentinel used by the producer for integer fields
pub const SENTINEL_I32: i32 = -1;

/// Sentinel used by the producer for float fields
pub const SENTINEL_F32: f32 = -1.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFrame {
    pub session_type: i32,
    pub session_iteration: i32,
    pub session_phase: i32,
    pub session_length_format: i32,
    pub session_time_remaining: f32,
    pub number_of_laps: i32,

    pub track_id: i32,
    pub layout_id: i32,
    pub layout_length: f32,
    pub vehicle_model_id: i32,
    pub vehicle_class_id: i32,

    pub game_paused: i32,
    pub game_in_replay: i32,

    pub position: i32,
    pub lap_distance_fraction: f32,
    pub completed_laps: i32,
    pub current_lap_valid: i32,
    pub lap_time_current_self: f32,
    pub lap_time_previous_self: f32,
    pub previous_lap_valid: i32,
    pub lap_time_best_self: f32,

    /// Remaining tread: front-left, front-right, rear-left, rear-right
    pub tire_wear: [f32; 4],
    pub fuel_left: f32,
    pub fuel_capacity: f32,

    pub push_to_pass: RawPushToPass,

    pub drivers: Vec<RawDriver>,
}

impl Default for RawFrame {
    fn default() -> Self {
        Self {
            session_type: SENTINEL_I32,
            session_iteration: SENTINEL_I32,
            session_phase: SENTINEL_I32,
            session_length_format: SENTINEL_I32,
            session_time_remaining: SENTINEL_F32,
            number_of_laps: SENTINEL_I32,
            track_id: SENTINEL_I32,
            layout_id: SENTINEL_I32,
            layout_length: SENTINEL_F32,
            vehicle_model_id: SENTINEL_I32,
            vehicle_class_id: SENTINEL_I32,
            game_paused: 0,
            game_in_replay: 0,
            position: SENTINEL_I32,
            lap_distance_fraction: SENTINEL_F32,
            completed_laps: SENTINEL_I32,
            current_lap_valid: SENTINEL_I32,
            lap_time_current_self: SENTINEL_F32,
            lap_time_previous_self: SENTINEL_F32,
            previous_lap_valid: SENTINEL_I32,
            lap_time_best_self: SENTINEL_F32,
            tire_wear: [SENTINEL_F32; 4],
            fuel_left: SENTINEL_F32,
            fuel_capacity: SENTINEL_F32,
            push_to_pass: RawPushToPass::default(),
            drivers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPushToPass {
    pub available: i32,
    pub engaged: i32,
    pub amount_left: i32,
    pub engaged_time_left: f32,
    pub wait_time_left: f32,
}

impl Default for RawPushToPass {
    fn default() -> Self {
        Self {
            available: SENTINEL_I32,
            engaged: SENTINEL_I32,
            amount_left: SENTINEL_I32,
            engaged_time_left: SENTINEL_F32,
            wait_time_left: SENTINEL_F32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDriver {
    pub place: i32,
    /// NUL-terminated UTF-8, at most [`NAME_BUFFER_LEN`] bytes
    pub name: Vec<u8>,
    pub user_id: i32,
    pub slot_id: i32,
    pub livery_id: i32,
    pub class_id: i32,
    pub class_performance_index: i32,
    pub completed_laps: i32,
    pub current_lap_valid: i32,
    pub lap_time_current_self: f32,
    pub lap_time_previous_self: f32,
    pub lap_time_best_self: f32,
    pub sector_times_previous_self: [f32; 3],
    pub lap_distance: f32,
    pub in_pitlane: i32,
    pub finish_status: i32,
    pub control_type: i32,
}

impl Default for RawDriver {
    fn default() -> Self {
        Self {
            place: SENTINEL_I32,
            name: Vec::new(),
            user_id: SENTINEL_I32,
            slot_id: SENTINEL_I32,
            livery_id: SENTINEL_I32,
            class_id: SENTINEL_I32,
            class_performance_index: SENTINEL_I32,
            completed_laps: SENTINEL_I32,
            current_lap_valid: SENTINEL_I32,
            lap_time_current_self: SENTINEL_F32,
            lap_time_previous_self: SENTINEL_F32,
            lap_time_best_self: SENTINEL_F32,
            sector_times_previous_self: [SENTINEL_F32; 3],
            lap_distance: SENTINEL_F32,
            in_pitlane: SENTINEL_I32,
            finish_status: SENTINEL_I32,
            control_type: SENTINEL_I32,
        }
    }
}

impl RawDriver {
    /// Write `name` into a fixed-size, NUL-padded buffer the way the
    /// producer lays it out
    pub fn encode_name(name: &str) -> Vec<u8> {
        let mut buf = vec![0u8; NAME_BUFFER_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_BUFFER_LEN - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }
}

// === Sentinel helpers ===

/// Integer id or enum code; negative means unavailable
pub fn available_i32(v: i32) -> Option<i32> {
    (v >= 0).then_some(v)
}

/// Non-negative count (laps, places)
pub fn available_u32(v: i32) -> Option<u32> {
    u32::try_from(v).ok()
}

/// Non-negative, finite measurement (fuel, distance, fraction)
pub fn available_f32(v: f32) -> Option<f32> {
    (v.is_finite() && v >= 0.0).then_some(v)
}

/// Strictly positive time; a zero lap time means "no time set"
pub fn available_time(v: f32) -> Option<Seconds> {
    (v.is_finite() && v > 0.0).then_some(Seconds(v))
}

/// Integer boolean; negative means unavailable
pub fn available_flag(v: i32) -> Option<bool> {
    (v >= 0).then_some(v != 0)
}

/// Decode a NUL-terminated name buffer, replacing invalid UTF-8
pub fn driver_name(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

impl Frame {
    /// Convert a producer frame, mapping every sentinel to `None`
    pub fn from_raw(raw: &RawFrame, timestamp: DateTime<Utc>) -> Frame {
        let track_length = available_f32(raw.layout_length).filter(|l| *l > 0.0);

        let tire_wear = {
            let corners = raw.tire_wear.map(available_f32);
            match corners {
                [Some(fl), Some(fr), Some(rl), Some(rr)] => {
                    Some(TireWear::from_corners([fl, fr, rl, rr]))
                }
                _ => None,
            }
        };

        let push_to_pass = available_flag(raw.push_to_pass.available).map(|available| {
            PushToPass {
                available,
                engaged: available_flag(raw.push_to_pass.engaged).unwrap_or(false),
                amount_left: available_u32(raw.push_to_pass.amount_left),
                engaged_time_left: available_f32(raw.push_to_pass.engaged_time_left).map(Seconds),
                wait_time_left: available_f32(raw.push_to_pass.wait_time_left).map(Seconds),
            }
        });

        Frame {
            timestamp,
            session: SessionType::from_code(raw.session_type),
            session_iteration: available_i32(raw.session_iteration),
            session_phase: SessionPhase::from_code(raw.session_phase),
            session_length_format: SessionLengthFormat::from_code(raw.session_length_format),
            session_time_remaining: available_f32(raw.session_time_remaining).map(Seconds),
            number_of_laps: available_u32(raw.number_of_laps).filter(|n| *n > 0),
            track_id: available_i32(raw.track_id),
            layout_id: available_i32(raw.layout_id),
            track_length: track_length.map(Meters),
            vehicle_id: available_i32(raw.vehicle_model_id),
            vehicle_class_id: available_i32(raw.vehicle_class_id),
            game_paused: raw.game_paused > 0,
            game_in_replay: raw.game_in_replay > 0,
            position: available_u32(raw.position).filter(|p| *p > 0),
            lap_distance_fraction: available_f32(raw.lap_distance_fraction),
            completed_laps: available_u32(raw.completed_laps),
            current_lap_valid: available_flag(raw.current_lap_valid),
            lap_time_current_self: available_f32(raw.lap_time_current_self).map(Seconds),
            lap_time_previous_self: available_time(raw.lap_time_previous_self),
            previous_lap_valid: available_flag(raw.previous_lap_valid),
            lap_time_best_self: available_time(raw.lap_time_best_self),
            tire_wear,
            fuel_left: available_f32(raw.fuel_left).map(Liters),
            fuel_capacity: available_f32(raw.fuel_capacity).map(Liters),
            push_to_pass,
            drivers: raw
                .drivers
                .iter()
                .map(|d| DriverRecord::from_raw(d, track_length))
                .collect(),
        }
    }
}

impl DriverRecord {
    fn from_raw(raw: &RawDriver, track_length: Option<f32>) -> DriverRecord {
        let lap_distance = available_f32(raw.lap_distance);
        let lap_fraction = match (lap_distance, track_length) {
            (Some(d), Some(l)) => Some((d / l).clamp(0.0, 1.0)),
            _ => None,
        };

        DriverRecord {
            place: available_u32(raw.place).filter(|p| *p > 0),
            name: driver_name(&raw.name),
            user_id: available_i32(raw.user_id),
            slot_id: available_i32(raw.slot_id),
            livery_id: available_i32(raw.livery_id),
            class_id: available_i32(raw.class_id),
            class_performance_index: available_i32(raw.class_performance_index),
            completed_laps: available_u32(raw.completed_laps),
            current_lap_valid: available_flag(raw.current_lap_valid),
            lap_time_current: available_f32(raw.lap_time_current_self).map(Seconds),
            lap_time_previous: available_time(raw.lap_time_previous_self),
            lap_time_best: available_time(raw.lap_time_best_self),
            sector_times_previous: raw.sector_times_previous_self.map(available_time),
            lap_distance: lap_distance.map(Meters),
            lap_fraction,
            in_pitlane: available_flag(raw.in_pitlane),
            finish_status: FinishStatus::from_code(raw.finish_status),
            control_type: ControlType::from_code(raw.control_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_name_stops_at_nul() {
        let buf = RawDriver::encode_name("Alex Rivera");
        assert_eq!(buf.len(), NAME_BUFFER_LEN);
        assert_eq!(driver_name(&buf), "Alex Rivera");
    }

    #[test]
    fn test_driver_name_without_terminator() {
        assert_eq!(driver_name(b"Sam"), "Sam");
    }

    #[test]
    fn test_driver_name_invalid_utf8_is_lossy() {
        let name = driver_name(&[b'A', 0xFF, b'B', 0, b'C']);
        assert_eq!(name, "A\u{FFFD}B");
    }

    #[test]
    fn test_encode_name_truncates_and_terminates() {
        let long = "x".repeat(100);
        let buf = RawDriver::encode_name(&long);
        assert_eq!(buf[NAME_BUFFER_LEN - 1], 0);
        assert_eq!(driver_name(&buf).len(), NAME_BUFFER_LEN - 1);
    }

    #[test]
    fn test_sentinels_become_none() {
        let frame = Frame::from_raw(&RawFrame::default(), Utc::now());
        assert!(frame.session.is_none());
        assert!(frame.session_phase.is_none());
        assert!(frame.fuel_left.is_none());
        assert!(frame.tire_wear.is_none());
        assert!(frame.position.is_none());
        assert!(frame.completed_laps.is_none());
        assert!(frame.push_to_pass.is_none());
        assert!(frame.session_time_remaining.is_none());
    }

    #[test]
    fn test_zero_lap_time_is_unavailable() {
        assert!(available_time(0.0).is_none());
        assert!(available_time(-1.0).is_none());
        assert!(available_time(f32::NAN).is_none());
        assert_eq!(available_time(91.2), Some(Seconds(91.2)));
    }

    #[test]
    fn test_available_f32_keeps_zero() {
        assert_eq!(available_f32(0.0), Some(0.0));
        assert_eq!(available_f32(-1.0), None);
        assert_eq!(available_f32(f32::INFINITY), None);
    }

    #[test]
    fn test_driver_lap_fraction_from_track_length() {
        let raw = RawFrame {
            layout_length: 4000.0,
            drivers: vec![RawDriver {
                place: 1,
                name: RawDriver::encode_name("Alex"),
                lap_distance: 1000.0,
                sector_times_previous_self: [30.0, -1.0, 29.0],
                ..Default::default()
            }],
            ..Default::default()
        };
        let frame = Frame::from_raw(&raw, Utc::now());
        let driver = &frame.drivers[0];
        assert_eq!(driver.lap_fraction, Some(0.25));
        assert_eq!(driver.sector_times_previous[1], None);
        assert!(driver.sector_lap_time().is_none());
    }

    #[test]
    fn test_lap_fraction_unknown_without_track_length() {
        let raw = RawFrame {
            drivers: vec![RawDriver {
                lap_distance: 1000.0,
                ..Default::default()
            }],
            ..Default::default()
        };
        let frame = Frame::from_raw(&raw, Utc::now());
        assert_eq!(frame.drivers[0].lap_distance, Some(Meters(1000.0)));
        assert!(frame.drivers[0].lap_fraction.is_none());
    }

    #[test]
    fn test_raw_frame_deserializes_with_missing_fields() {
        let raw: RawFrame =
            serde_json::from_str(r#"{"session_type": 2, "session_phase": 5}"#).unwrap();
        let frame = Frame::from_raw(&raw, Utc::now());
        assert_eq!(frame.session, Some(SessionType::Race));
        assert_eq!(frame.session_phase, Some(SessionPhase::Green));
        assert!(frame.layout_id.is_none());
    }
}
