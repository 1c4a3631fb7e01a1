//! Numeric helpers for blending two frames.
//!
//! Angles are radians. Heading interpolation always follows the shorter arc, so
//! blending 350° and 10° passes through 0° rather than 180°.

use std::f64::consts::{PI, TAU};

/// Linear interpolation: `a` at `ratio = 0`, `b` at `ratio = 1`.
#[must_use]
pub fn lerp(a: f64, b: f64, ratio: f64) -> f64 {
    a * (1.0 - ratio) + b * ratio
}

/// Normalizes an angle into `[0, 2π)`.
#[must_use]
pub fn norm_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if a >= TAU {
        0.0
    } else {
        a
    }
}

/// Signed shortest difference `to - from`, in `(-π, π]`.
#[must_use]
pub fn angle_diff(from: f64, to: f64) -> f64 {
    let delta = norm_angle(to - from);
    if delta > PI {
        delta - TAU
    } else {
        delta
    }
}

/// Interpolates two headings along the shorter arc; the result is in `[0, 2π)`.
#[must_use]
pub fn angle_interp(from: f64, to: f64, ratio: f64) -> f64 {
    norm_angle(from + angle_diff(from, to) * ratio)
}

/// Position of `t` between `before_t` and `after_t`, clamped to `[0, 1]`.
///
/// Returns 0 when the two times coincide.
#[must_use]
pub fn interpolation_ratio(t: f64, before_t: f64, after_t: f64) -> f64 {
    let span = after_t - before_t;
    if span > 0.0 {
        ((t - before_t) / span).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
