//! Panel dimensions and pixel rectangles.

use std::cmp::Ordering;
use std::fmt;

use embedded_graphics::prelude::{Point, Size};
use embedded_graphics::primitives::Rectangle;

use crate::error::ClockError;

/// Physical panel size in pixels, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// Both sides must be positive.
    pub fn new(width: u32, height: u32) -> Result<Self, ClockError> {
        if width == 0 || height == 0 {
            return Err(ClockError::config(format!(
                "panel resolution must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels on the panel.
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Swap the axes, used when the panel is mounted in portrait.
    pub const fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// The whole panel as a rectangle.
    pub const fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned pixel rectangle. `x`/`y` is the top-left corner.
///
/// Rectangles order top-to-bottom, then left-to-right, which is the order
/// the diff reports dirty regions in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// True when `other` lies completely inside `self`.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Some(Rect::new(x, y, right - x, bottom - y))
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Widen horizontally to whole bytes of a packed plane, clamped to `limit`.
    ///
    /// E-paper controllers address RAM columns in bytes, so partial windows
    /// have to start and end on multiples of eight pixels. A rectangle
    /// outside `limit` comes back empty.
    pub fn byte_aligned(&self, limit: Resolution) -> Rect {
        let right = (self.right().div_ceil(8) * 8).min(limit.width().div_ceil(8) * 8);
        let bottom = self.bottom().min(limit.height());
        let x = (self.x & !7).min(right);
        let y = self.y.min(bottom);
        Rect::new(x, y, right - x, bottom - y)
    }
}

impl Ord for Rect {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x, self.height, self.width).cmp(&(other.y, other.x, other.height, other.width))
    }
}

impl PartialOrd for Rect {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

impl From<Rect> for Rectangle {
    fn from(rect: Rect) -> Self {
        Rectangle::new(
            Point::new(rect.x as i32, rect.y as i32),
            Size::new(rect.width, rect.height),
        )
    }
}
