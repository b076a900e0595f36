//! RGBA color value type shared across the engine.
//!
//! Colors flow through every subsystem: layer tints, selection colors,
//! per-class result coloring, and the persisted snapshot payload. The type
//! is immutable; every derived-color operation returns a new value.

use serde::{Deserialize, Serialize};

fn default_alpha() -> f32 {
    1.0
}

/// An immutable RGBA color.
///
/// Channels are 8-bit integers; alpha is a float in `[0, 1]`. Equality is
/// component-wise. The serde form is the plain `{r, g, b, a}` record used
/// by wire payloads and the persisted snapshot; a missing `a` defaults
/// to fully opaque, matching tool responses that only carry `{r, g, b}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red channel (0-255)
    pub r: u8,
    /// Green channel (0-255)
    pub g: u8,
    /// Blue channel (0-255)
    pub b: u8,
    /// Alpha (0.0-1.0)
    #[serde(default = "default_alpha")]
    pub a: f32,
}

impl Color {
    /// Create a color from channels and alpha. Alpha is clamped to `[0, 1]`.
    pub fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self {
            r,
            g,
            b,
            a: a.clamp(0.0, 1.0),
        }
    }

    /// Create a fully opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Return a copy with the given alpha.
    pub fn with_alpha(&self, a: f32) -> Self {
        Self::new(self.r, self.g, self.b, a)
    }

    /// Return a copy with the given red channel.
    pub fn with_red(&self, r: u8) -> Self {
        Self { r, ..*self }
    }

    /// Return a copy with the given green channel.
    pub fn with_green(&self, g: u8) -> Self {
        Self { g, ..*self }
    }

    /// Return a copy with the given blue channel.
    pub fn with_blue(&self, b: u8) -> Self {
        Self { b, ..*self }
    }

    /// Parse a `#rrggbb` hex string. A leading `#` is optional.
    ///
    /// Returns `None` on malformed input; never panics. The alpha of a
    /// parsed color is always 1.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
        let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
        let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
        Some(Self::rgb(r, g, b))
    }

    /// Parse an `rgb(r, g, b)` string.
    ///
    /// Returns `None` on malformed input; never panics.
    pub fn from_rgb_string(s: &str) -> Option<Self> {
        let inner = s
            .trim()
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))?;
        let mut parts = inner.split(',');
        let r = parts.next()?.trim().parse::<u8>().ok()?;
        let g = parts.next()?.trim().parse::<u8>().ok()?;
        let b = parts.next()?.trim().parse::<u8>().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::rgb(r, g, b))
    }

    /// Build a color from normalized `[0, 1]` RGB components.
    pub fn from_normalized_rgb(rgb: [f32; 3]) -> Self {
        let to_channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::rgb(to_channel(rgb[0]), to_channel(rgb[1]), to_channel(rgb[2]))
    }

    /// Build a color from a plain `{r, g, b[, a]}` JSON object.
    ///
    /// Returns `None` if the value does not have that shape.
    pub fn from_object(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Format as `#rrggbb`. Exact inverse of [`Color::from_hex`] for
    /// colors with alpha 1.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Format as `rgb(r, g, b)`. Exact inverse of
    /// [`Color::from_rgb_string`] for colors with alpha 1.
    pub fn to_rgb_string(&self) -> String {
        format!("rgb({}, {}, {})", self.r, self.g, self.b)
    }

    /// Format as `rgba(r, g, b, a)`.
    pub fn to_rgba_string(&self) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }

    /// Normalized `[0, 1]` RGB components, each scaled by `factor`.
    ///
    /// This is the contribution a channel layer feeds to additive
    /// compositing: `tint × normalized_intensity × opacity`.
    pub fn scaled_components(&self, factor: f32) -> [f32; 3] {
        [
            self.r as f32 / 255.0 * factor,
            self.g as f32 / 255.0 * factor,
            self.b as f32 / 255.0 * factor,
        ]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::rgb(255, 255, 255)
    }
}
