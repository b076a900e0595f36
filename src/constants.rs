//! Global constants for the cytomap engine

use crate::color::Color;

/// Fixed palette used to auto-color new selections, cycled round-robin
/// per object type.
pub const SELECTION_PALETTE: [Color; 8] = [
    Color::rgb(228, 26, 28),
    Color::rgb(55, 126, 184),
    Color::rgb(77, 175, 74),
    Color::rgb(152, 78, 163),
    Color::rgb(255, 127, 0),
    Color::rgb(255, 255, 51),
    Color::rgb(166, 86, 40),
    Color::rgb(247, 129, 191),
];

/// Delay between reconnection attempts of the streaming job channel, in
/// milliseconds. The interval is fixed, not backed off.
pub const STREAM_RECONNECT_DELAY_MS: u64 = 5_000;

/// Read poll interval for the streaming channel worker, in milliseconds.
pub const STREAM_POLL_INTERVAL_MS: u64 = 100;

/// Default brightness offset applied to channel windowing.
pub const DEFAULT_BRIGHTNESS: f32 = 0.0;

/// Default lower bound of the intensity window, as a fraction of the
/// sensor range.
pub const DEFAULT_WINDOW_MIN: f32 = 0.0;

/// Default upper bound of the intensity window, as a fraction of the
/// sensor range.
pub const DEFAULT_WINDOW_MAX: f32 = 1.0;

/// Default layer opacity.
pub const DEFAULT_OPACITY: f32 = 1.0;
