//! Bicolor frame buffer
//!
//! Two one-bit planes (black and red) packed the way e-paper controllers
//! take them: rows of `ceil(width / 8)` bytes, most significant bit is the
//! leftmost pixel. A set bit means ink, a clear bit means paper.
//!
//! The buffer is allocated once at startup and redrawn in place every tick.
//! [`FrameBuffer::diff`] compares it with the last frame that reached the
//! panel and reports the dirty rectangles that drive partial refreshes.

mod color;
mod geometry;

pub use color::{Channel, InkColor};
pub use geometry::{Rect, Resolution};

use embedded_graphics::prelude::*;

use crate::error::ClockError;

/// Edge length, in pixels, of the tiles the diff scans. One tile column is
/// exactly one byte column of a plane.
const TILE: u32 = 8;

/// Raised when two frames cannot be compared.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("frames differ in size: current {current:?}, previous {previous:?}")]
    ResolutionMismatch {
        current: (u32, u32),
        previous: (u32, u32),
    },
}

/// In-memory image of the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    resolution: Resolution,
    stride: usize,
    primary: Vec<u8>,
    accent: Vec<u8>,
}

impl FrameBuffer {
    /// Allocate a blank frame.
    pub fn new(resolution: Resolution) -> Self {
        let stride = resolution.width().div_ceil(8) as usize;
        let len = stride * resolution.height() as usize;
        Self {
            resolution,
            stride,
            primary: vec![0; len],
            accent: vec![0; len],
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Bytes per row of a plane.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Reset both planes to paper.
    pub fn clear(&mut self) {
        self.primary.fill(0);
        self.accent.fill(0);
    }

    /// True when no pixel carries ink.
    pub fn is_blank(&self) -> bool {
        self.primary.iter().chain(self.accent.iter()).all(|&b| b == 0)
    }

    /// Packed bytes of one plane.
    pub fn plane(&self, channel: Channel) -> &[u8] {
        match channel {
            Channel::Primary => &self.primary,
            Channel::Accent => &self.accent,
        }
    }

    fn plane_mut(&mut self, channel: Channel) -> &mut [u8] {
        match channel {
            Channel::Primary => &mut self.primary,
            Channel::Accent => &mut self.accent,
        }
    }

    fn locate(&self, x: u32, y: u32) -> (usize, u8) {
        let index = y as usize * self.stride + (x / 8) as usize;
        (index, 0x80 >> (x % 8))
    }

    fn check_bounds(&self, x: u32, y: u32, channel: Channel) -> Result<(), ClockError> {
        if self.resolution.contains(x, y) {
            Ok(())
        } else {
            Err(ClockError::OutOfBounds {
                x,
                y,
                channel,
                width: self.resolution.width(),
                height: self.resolution.height(),
            })
        }
    }

    /// Write one bit of one plane.
    pub fn set_pixel(
        &mut self,
        x: u32,
        y: u32,
        channel: Channel,
        value: bool,
    ) -> Result<(), ClockError> {
        self.check_bounds(x, y, channel)?;
        let (index, mask) = self.locate(x, y);
        let byte = &mut self.plane_mut(channel)[index];
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
        Ok(())
    }

    /// Read one bit of one plane.
    pub fn pixel(&self, x: u32, y: u32, channel: Channel) -> Result<bool, ClockError> {
        self.check_bounds(x, y, channel)?;
        let (index, mask) = self.locate(x, y);
        Ok(self.plane(channel)[index] & mask != 0)
    }

    /// Paint a pixel with a single ink, clearing the other plane.
    pub fn paint(&mut self, x: u32, y: u32, color: InkColor) -> Result<(), ClockError> {
        let (black, red) = match color {
            InkColor::White => (false, false),
            InkColor::Black => (true, false),
            InkColor::Red => (false, true),
        };
        self.set_pixel(x, y, Channel::Primary, black)?;
        self.set_pixel(x, y, Channel::Accent, red)
    }

    /// What the panel shows at (x, y). Red wins if both bits are set.
    pub fn color_at(&self, x: u32, y: u32) -> Result<InkColor, ClockError> {
        if self.pixel(x, y, Channel::Accent)? {
            Ok(InkColor::Red)
        } else if self.pixel(x, y, Channel::Primary)? {
            Ok(InkColor::Black)
        } else {
            Ok(InkColor::White)
        }
    }

    /// Overwrite this frame with `other` without reallocating.
    pub fn copy_from(&mut self, other: &FrameBuffer) -> Result<(), DiffError> {
        self.same_size(other)?;
        self.primary.copy_from_slice(&other.primary);
        self.accent.copy_from_slice(&other.accent);
        Ok(())
    }

    /// Packed bytes covering `rect` widened to whole bytes, row by row.
    ///
    /// The result is what a controller expects after its RAM window has been
    /// set to `rect.byte_aligned(..)`.
    pub fn region_bytes(&self, rect: Rect, channel: Channel) -> Vec<u8> {
        let window = rect.byte_aligned(self.resolution);
        let first = (window.x / 8) as usize;
        let last = (window.right() / 8) as usize;
        let plane = self.plane(channel);
        let mut out = Vec::with_capacity((last - first) * window.height as usize);
        for y in window.y..window.bottom() {
            let row = y as usize * self.stride;
            out.extend_from_slice(&plane[row + first..row + last]);
        }
        out
    }

    fn same_size(&self, other: &FrameBuffer) -> Result<(), DiffError> {
        if self.resolution == other.resolution {
            Ok(())
        } else {
            Err(DiffError::ResolutionMismatch {
                current: (self.resolution.width(), self.resolution.height()),
                previous: (other.resolution.width(), other.resolution.height()),
            })
        }
    }

    /// Changed bits of either plane for one byte of the buffer.
    fn changed(&self, previous: &FrameBuffer, index: usize) -> u8 {
        (self.primary[index] ^ previous.primary[index]) | (self.accent[index] ^ previous.accent[index])
    }

    /// Rectangles covering every pixel that differs from `previous`.
    ///
    /// The panel is scanned in 8x8 tiles. Horizontal runs of dirty tiles are
    /// stacked into rectangles while consecutive tile rows share the same
    /// span, then every rectangle is shrunk to the exact bounding box of the
    /// changed pixels inside it. The result never overlaps, is sorted top to
    /// bottom, and is empty when the frames are identical.
    pub fn diff(&self, previous: &FrameBuffer) -> Result<Vec<Rect>, DiffError> {
        self.same_size(previous)?;

        let tile_rows = self.resolution.height().div_ceil(TILE);
        let mut closed: Vec<(usize, usize, u32, u32)> = Vec::new();
        // (first tile column, end tile column, first tile row)
        let mut open: Vec<(usize, usize, u32)> = Vec::new();

        for tile_row in 0..tile_rows {
            let runs = self.dirty_runs(previous, tile_row);
            let mut next_open = Vec::with_capacity(runs.len());
            for (start, end) in runs {
                match open.iter().position(|&(s, e, _)| s == start && e == end) {
                    Some(pos) => next_open.push(open.swap_remove(pos)),
                    None => next_open.push((start, end, tile_row)),
                }
            }
            closed.extend(open.drain(..).map(|(s, e, top)| (s, e, top, tile_row)));
            open = next_open;
        }
        closed.extend(open.into_iter().map(|(s, e, top)| (s, e, top, tile_rows)));

        let mut regions: Vec<Rect> = closed
            .into_iter()
            .filter_map(|(start, end, top, bottom)| {
                let x = start as u32 * TILE;
                let y = top * TILE;
                let right = (end as u32 * TILE).min(self.resolution.width());
                let bottom = (bottom * TILE).min(self.resolution.height());
                self.tighten(previous, Rect::new(x, y, right - x, bottom - y))
            })
            .collect();
        regions.sort();
        Ok(regions)
    }

    /// Runs of consecutive dirty tile columns within one tile row.
    fn dirty_runs(&self, previous: &FrameBuffer, tile_row: u32) -> Vec<(usize, usize)> {
        let top = tile_row * TILE;
        let bottom = (top + TILE).min(self.resolution.height());
        let mut runs = Vec::new();
        let mut run_start: Option<usize> = None;

        for column in 0..self.stride {
            let dirty = (top..bottom)
                .any(|y| self.changed(previous, y as usize * self.stride + column) != 0);
            match (dirty, run_start) {
                (true, None) => run_start = Some(column),
                (false, Some(start)) => {
                    runs.push((start, column));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            runs.push((start, self.stride));
        }
        runs
    }

    /// Exact bounding box of the changed pixels inside `rect`.
    fn tighten(&self, previous: &FrameBuffer, rect: Rect) -> Option<Rect> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        let first = (rect.x / 8) as usize;
        let last = rect.right().div_ceil(8) as usize;

        for y in rect.y..rect.bottom() {
            for column in first..last {
                let changed = self.changed(previous, y as usize * self.stride + column);
                if changed == 0 {
                    continue;
                }
                let left = column as u32 * 8 + changed.leading_zeros();
                let right = column as u32 * 8 + 7 - changed.trailing_zeros();
                bounds = Some(match bounds {
                    None => (left, y, right, y),
                    Some((x0, y0, x1, _)) => (x0.min(left), y0, x1.max(right), y),
                });
            }
        }

        bounds.map(|(x0, y0, x1, y1)| Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(self.resolution.width(), self.resolution.height())
    }
}

impl DrawTarget for FrameBuffer {
    type Color = InkColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) else {
                continue;
            };
            // Anything off-panel is clipped
            if self.resolution.contains(x, y) {
                let _ = self.paint(x, y, color);
            }
        }
        Ok(())
    }
}
