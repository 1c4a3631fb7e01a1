//! Shared test utilities for integration tests.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

use replay_prefetch::{
    CongestionLevel, PedestrianRecord, RequestSpec, RoadStatusRecord, SignalState,
    TrafficLightRecord, VehicleRecord,
};

/// Tolerance used when comparing chained request boundaries.
#[allow(dead_code)]
pub const CHAIN_EPSILON: f64 = 1e-9;

/// Installs a test-friendly tracing subscriber (once per binary).
///
/// Output is captured by the test harness and shown for failing tests only.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// Record factory for `u32` payloads: the integer part of `t`.
#[allow(dead_code)]
pub fn numbered(t: f64) -> u32 {
    t.max(0.0) as u32
}

/// A single vehicle driving east at one longitude unit per step, heading east.
#[allow(dead_code)]
pub fn vehicle_at(t: f64) -> VehicleRecord {
    VehicleRecord {
        id: 1,
        lng: t,
        lat: 0.0,
        direction: 0.0,
        v: 1.0,
        lane_id: Some(100),
        model: Some("bus".to_owned()),
    }
}

/// A vehicle turning counter-clockwise by 20 degrees per step, starting at 350°.
#[allow(dead_code)]
pub fn turning_vehicle_at(t: f64) -> VehicleRecord {
    VehicleRecord {
        direction: (350.0 + 20.0 * t).to_radians(),
        ..vehicle_at(t)
    }
}

/// A pedestrian walking north.
#[allow(dead_code)]
pub fn pedestrian_at(t: f64) -> PedestrianRecord {
    PedestrianRecord {
        id: 7,
        lng: 0.0,
        lat: t,
        direction: t,
        v: 1.0,
        parent_id: None,
    }
}

/// Lane 10 cycles red, green, yellow with a period of three steps.
#[allow(dead_code)]
pub fn signal_at(t: f64) -> TrafficLightRecord {
    let phase = (t.max(0.0) as u64 % 3) as u8 + 1;
    TrafficLightRecord {
        id: 10,
        state: SignalState::from(phase),
    }
}

/// Road 20 is heavily congested.
#[allow(dead_code)]
pub fn road_at(_t: f64) -> RoadStatusRecord {
    RoadStatusRecord {
        id: 20,
        level: CongestionLevel::Heavy,
    }
}

/// Asserts that `specs` form one gap-free, overlap-free chain.
#[allow(dead_code)]
pub fn assert_chained(specs: &[RequestSpec]) {
    for pair in specs.windows(2) {
        assert!(
            (pair[0].end_t - pair[1].start_t).abs() < CHAIN_EPSILON,
            "{} is not followed by a chunk starting at its end: {}",
            pair[0],
            pair[1]
        );
    }
}
