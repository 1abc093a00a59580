//! Integration tests for the DemoAdapter

use ore_adapters::DemoAdapter;
use ore_core::adapter::FrameAdapter;
use ore_core::model::{SessionPhase, SessionType};
use ore_core::{Event, EventEngine, Frame};
use std::sync::Arc;

/// Simulated frames per second
const HZ: usize = 60;

#[test]
fn test_demo_adapter_name() {
    let adapter = DemoAdapter::new();
    assert_eq!(adapter.name(), "Demo");
    assert_eq!(adapter.key(), "demo");
}

#[test]
fn test_demo_adapter_detect_always_true() {
    let adapter = DemoAdapter::new();
    assert!(adapter.detect(), "DemoAdapter should always be detected");
}

#[test]
fn test_demo_adapter_read_frame_when_inactive_returns_none() {
    let mut adapter = DemoAdapter::new();
    assert!(!adapter.is_active());
    let frame = adapter.read_frame().unwrap();
    assert!(
        frame.is_none(),
        "read_frame() should return None when adapter is inactive"
    );
}

#[test]
fn test_demo_adapter_start_and_stop() {
    let mut adapter = DemoAdapter::new();

    adapter.start().expect("start() should succeed");
    assert!(adapter.is_active(), "Adapter should be active after start()");

    adapter.stop().expect("stop() should succeed");
    assert!(
        !adapter.is_active(),
        "Adapter should be inactive after stop()"
    );
}

#[test]
fn test_demo_first_frame_is_grid_countdown() {
    let mut adapter = DemoAdapter::new();
    adapter.start().unwrap();

    let frame = adapter
        .read_frame()
        .expect("read_frame() should not error")
        .expect("read_frame() should return Some after start()");

    assert_eq!(frame.session, Some(SessionType::Race));
    assert_eq!(frame.session_phase, Some(SessionPhase::Countdown));
    assert_eq!(frame.drivers.len(), 6);
    assert!(frame.main_driver().is_some(), "local player should be in the field");
    assert!(frame.track_length.is_some());
    assert!(frame.fuel_left.is_some());
    assert_eq!(frame.lap_time_previous_self, None, "no lap completed yet");
}

#[test]
fn test_demo_is_deterministic() {
    let mut a = DemoAdapter::new();
    let mut b = DemoAdapter::new();
    for _ in 0..(30 * HZ) {
        a.next_raw();
        b.next_raw();
    }
    let left = serde_json::to_value(a.next_raw()).unwrap();
    let right = serde_json::to_value(b.next_raw()).unwrap();
    assert_eq!(left, right);
}

#[test]
fn test_demo_frame_values_in_reasonable_range() {
    let mut adapter = DemoAdapter::new();
    adapter.start().unwrap();

    let mut frame = None;
    for _ in 0..(45 * HZ) {
        frame = adapter.read_frame().unwrap();
    }
    let frame = frame.expect("frames while active");

    for driver in &frame.drivers {
        if let Some(fraction) = driver.lap_fraction {
            assert!((0.0..=1.0).contains(&fraction), "{fraction} out of range");
        }
        let place = driver.place.expect("every car has a place");
        assert!((1..=6).contains(&place));
    }
    let fuel = frame.fuel_left.unwrap().0;
    assert!((0.0..=60.0).contains(&fuel));
    let wear = frame.tire_wear.unwrap();
    assert!(wear.front_left.0 < 1.0);
}

#[test]
fn test_demo_race_drives_the_engine() {
    let mut adapter = DemoAdapter::new();
    adapter.start().unwrap();
    let mut engine = EventEngine::default();

    let mut previous: Option<Arc<Frame>> = None;
    let mut events = Vec::new();
    for _ in 0..(200 * HZ) {
        let frame = Arc::new(adapter.read_frame().unwrap().unwrap());
        events.extend(engine.cycle(previous.as_ref(), &frame));
        previous = Some(frame);
    }

    let main_laps = events
        .iter()
        .filter(|log| matches!(&log.event, Event::NewLap { driver, .. } if driver.is_main))
        .count();
    assert_eq!(main_laps, 2);

    let timed_other_laps = events
        .iter()
        .filter(|log| {
            matches!(&log.event, Event::NewLap { driver, lap } if !driver.is_main && lap.lap_time.is_some())
        })
        .count();
    assert!(timed_other_laps >= 8);

    assert!(
        !events
            .iter()
            .any(|log| matches!(log.event, Event::PositionJump { .. })),
        "sentinel dropouts must not look like teleports"
    );
    assert!(events
        .iter()
        .any(|log| matches!(log.event, Event::PushToPassActivated { .. })));

    let frame = previous.unwrap();
    let key = frame.combination_key().unwrap();
    assert!(engine.stats().best_lap_time(&key).is_some());
    assert!(engine.stats().average_fuel(&key).is_some());
    let class_key = frame.class_combination_key().unwrap();
    assert!(engine.sampler().profile(&class_key).is_some());

    let mains = engine.registry().iter().filter(|d| d.is_main()).count();
    assert_eq!(mains, 1);
    assert!(engine.estimate_laps(&frame).is_some());
}
