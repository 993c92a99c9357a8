//! Ink colors of a black/white/red panel

use std::fmt;

use embedded_graphics::pixelcolor::{BinaryColor, PixelColor};
use serde::Deserialize;

/// One of the two bit planes of a bicolor frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Black ink
    #[default]
    Primary,
    /// Red ink
    Accent,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Primary => write!(f, "primary"),
            Channel::Accent => write!(f, "accent"),
        }
    }
}

/// What a single pixel looks like on the panel.
///
/// A pixel can only carry one ink, so painting black clears the red bit and
/// the other way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InkColor {
    #[default]
    White,
    Black,
    Red,
}

impl InkColor {
    pub const fn from_channel(channel: Channel) -> Self {
        match channel {
            Channel::Primary => InkColor::Black,
            Channel::Accent => InkColor::Red,
        }
    }

    /// sRGB value used for previews.
    pub const fn rgb(self) -> [u8; 3] {
        match self {
            InkColor::White => [0xFF, 0xFF, 0xFF],
            InkColor::Black => [0x00, 0x00, 0x00],
            InkColor::Red => [0xD0, 0x10, 0x10],
        }
    }
}

impl PixelColor for InkColor {
    type Raw = ();
}

impl From<BinaryColor> for InkColor {
    fn from(color: BinaryColor) -> Self {
        match color {
            BinaryColor::On => InkColor::Black,
            BinaryColor::Off => InkColor::White,
        }
    }
}
