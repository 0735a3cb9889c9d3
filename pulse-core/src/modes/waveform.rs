//! Shared timing math for cyclic stimulation patterns.

use core::f64::consts::PI;

/// Position of `elapsed` inside a repeating cycle of `cycle` seconds.
#[must_use]
pub const fn cycle_position(elapsed: u32, cycle: u32) -> u32 {
    if cycle == 0 { 0 } else { elapsed % cycle }
}

/// Linear progress of `position` through a window of `length` seconds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress(position: u32, length: u32) -> f32 {
    if length == 0 {
        0.0
    } else {
        position as f32 / length as f32
    }
}

/// Rounded sine offset in `{-1, 0, 1}` for a wave with the given period.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn sine_offset(elapsed: u32, period: u32) -> i32 {
    if period == 0 {
        return 0;
    }
    let angle = 2.0 * PI * f64::from(elapsed) / f64::from(period);
    libm::round(libm::sin(angle)) as i32
}
