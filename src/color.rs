//! RGBA colors and the per-code color tables of the style-target layers.

use serde::{Deserialize, Serialize};

use crate::ReplayError;

/// Alpha applied to every table color (0.5, rounded to the nearest byte).
pub const TABLE_ALPHA: f64 = 0.5;

/// An 8-bit-per-channel RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba(pub [u8; 4]);

/// Color of a style target whose id has no record in the current frame (fully transparent).
pub const UNKNOWN_COLOR: Rgba = Rgba([0, 0, 0, 0]);

/// Traffic-light colors indexed by signal code: no signal, red, green, yellow.
pub const SIGNAL_COLORS: [Rgba; 4] = [
    Rgba([255, 255, 255, 128]),
    Rgba([255, 0, 0, 128]),
    Rgba([0, 255, 0, 128]),
    Rgba([255, 255, 0, 128]),
];

/// Road colors indexed by congestion code 0 through 6.
pub const CONGESTION_COLORS: [Rgba; 7] = [
    Rgba([0x2e, 0x8b, 0x57, 128]),
    Rgba([0x32, 0xcd, 0x32, 128]),
    Rgba([0xee, 0xee, 0x00, 128]),
    Rgba([0xaa, 0x00, 0x00, 128]),
    Rgba([0x80, 0x00, 0x00, 128]),
    Rgba([0x60, 0x00, 0x00, 128]),
    Rgba([0x7d, 0x85, 0x97, 128]),
];

impl Rgba {
    /// Creates a color from its four channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Parses `#rrggbb` (or `rrggbb`) and applies `alpha` in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Decode`] if `hex` is not six hex digits.
    pub fn from_hex(hex: &str, alpha: f64) -> Result<Self, ReplayError> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        let invalid = || ReplayError::Decode {
            context: format!("invalid hex color {:?}", hex),
        };
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| {
            digits
                .get(range)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(invalid)
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        Ok(Self([channel(0..2)?, channel(2..4)?, channel(4..6)?, a]))
    }

    /// The red, green, blue and alpha channels.
    #[must_use]
    pub const fn channels(self) -> [u8; 4] {
        self.0
    }

    /// Returns `true` if the color is fully transparent.
    #[must_use]
    pub const fn is_transparent(self) -> bool {
        self.0[3] == 0
    }
}
