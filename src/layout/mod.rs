//! Composes the clock face onto a [`FrameBuffer`].
//!
//! Blocks are laid out once from the configuration and drawn in the
//! configured order every tick. A block whose data is missing falls back to
//! the last good value it showed, or to a `"<source> unavailable"` line, so
//! one bad feed never costs the whole frame.

mod content;
mod text;

pub use content::Line;
pub use text::{MonoRasterizer, TextMask, TextRasterizer};

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, TimeDelta};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use log::{debug, warn};

use crate::config::{Align, Config, ContentSource, FontSpec};
use crate::data::{CalendarEvent, DataSnapshot, FeedValue, WeatherReport};
use crate::error::ClockError;
use crate::framebuffer::{Channel, FrameBuffer, InkColor, Rect};

/// A positioned, immutable region of the face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutBlock {
    pub id: String,
    pub rect: Rect,
    pub source: ContentSource,
    pub font: FontSpec,
    pub align: Align,
    pub channel: Channel,
    pub format: Option<String>,
    pub accent_lead: bool,
}

/// Facts a render pass needs that don't come from the data feeds.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    /// When the next forced full refresh is due
    pub erase_due: DateTime<FixedOffset>,
}

/// What one block shows this tick, split into side-by-side columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContent {
    pub id: String,
    pub columns: Vec<Vec<Line>>,
    /// True when the block shows the "unavailable" placeholder
    pub placeholder: bool,
}

impl BlockContent {
    fn lines(id: &str, lines: Vec<Line>) -> Self {
        Self {
            id: id.to_string(),
            columns: vec![lines],
            placeholder: false,
        }
    }

    fn single(id: &str, text: String) -> Self {
        Self::lines(id, vec![Line::plain(text)])
    }

    fn unavailable(id: &str, source: ContentSource) -> Self {
        Self {
            placeholder: true,
            ..Self::single(id, format!("{} unavailable", source))
        }
    }

    /// All lines joined with newlines, columns one after another.
    pub fn text(&self) -> String {
        self.columns
            .iter()
            .flatten()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct LayoutEngine<R = MonoRasterizer> {
    blocks: Vec<LayoutBlock>,
    rasterizer: R,
    stale_after: TimeDelta,
    last_weather: Option<(WeatherReport, DateTime<FixedOffset>)>,
    last_events: Option<(Vec<CalendarEvent>, DateTime<FixedOffset>)>,
}

impl<R: TextRasterizer> LayoutEngine<R> {
    /// Resolve and check every configured block.
    ///
    /// Blocks must have unique ids, lie inside the panel, not overlap any
    /// earlier block and use a font the rasterizer knows.
    pub fn new(config: &Config, rasterizer: R) -> Result<Self, ClockError> {
        config.validate()?;
        let bounds = config.resolution()?.bounds();
        let mut ids = HashSet::new();
        let mut blocks: Vec<LayoutBlock> = Vec::with_capacity(config.blocks.len());

        for block in &config.blocks {
            if !ids.insert(block.id.as_str()) {
                return Err(ClockError::config(format!(
                    "block id '{}' is used twice",
                    block.id
                )));
            }
            let rect = block.rect();
            if rect.is_empty() {
                return Err(ClockError::config(format!("block '{}' is empty", block.id)));
            }
            if !bounds.contains_rect(&rect) {
                return Err(ClockError::config(format!(
                    "block '{}' ({}) lies outside the {}x{} panel",
                    block.id, rect, bounds.width, bounds.height
                )));
            }
            if let Some(earlier) = blocks.iter().find(|b| b.rect.intersects(&rect)) {
                return Err(ClockError::config(format!(
                    "block '{}' overlaps block '{}'",
                    block.id, earlier.id
                )));
            }
            let font = config.fonts.get(block.font).clone();
            if rasterizer.line_height(&font).is_none() {
                return Err(ClockError::config(format!(
                    "block '{}' uses the {} font with unknown face '{}'",
                    block.id, block.font, font.face
                )));
            }
            blocks.push(LayoutBlock {
                id: block.id.clone(),
                rect,
                source: block.source,
                font,
                align: block.align,
                channel: block.channel,
                format: block.format.clone(),
                accent_lead: block.accent_lead,
            });
        }

        let stale_after = TimeDelta::from_std(config.data.stale_after)
            .map_err(|_| ClockError::config("data.stale_after is too long"))?;

        Ok(Self {
            blocks,
            rasterizer,
            stale_after,
            last_weather: None,
            last_events: None,
        })
    }

    pub fn blocks(&self) -> &[LayoutBlock] {
        &self.blocks
    }

    /// Work out the text of every block, remembering fresh feed values.
    pub fn compose(
        &mut self,
        snapshot: &DataSnapshot,
        context: &RenderContext,
    ) -> Vec<BlockContent> {
        if let FeedValue::Fresh { value, as_of } = &snapshot.weather {
            remember(&mut self.last_weather, value, *as_of);
        }
        if let FeedValue::Fresh { value, as_of } = &snapshot.events {
            remember(&mut self.last_events, value, *as_of);
        }

        self.blocks
            .iter()
            .map(|block| self.content(block, snapshot, context))
            .collect()
    }

    /// Clear `frame` and draw every block onto it.
    pub fn render(
        &mut self,
        snapshot: &DataSnapshot,
        context: &RenderContext,
        frame: &mut FrameBuffer,
    ) -> Vec<BlockContent> {
        let contents = self.compose(snapshot, context);
        frame.clear();
        for (block, content) in self.blocks.iter().zip(&contents) {
            debug!("Block {} at {}: {:?}", block.id, block.rect, content.text());
            if let Err(e) = self.draw(block, content, frame) {
                warn!("Block {} left blank: {}", block.id, e);
            }
        }
        contents
    }

    fn content(
        &self,
        block: &LayoutBlock,
        snapshot: &DataSnapshot,
        context: &RenderContext,
    ) -> BlockContent {
        let now = &snapshot.now;
        let timed = |default: &str| {
            let pattern = block.format.as_deref().unwrap_or(default);
            match content::strftime(now, pattern) {
                Some(text) => BlockContent::single(&block.id, text),
                None => BlockContent::unavailable(&block.id, block.source),
            }
        };

        match block.source {
            ContentSource::Clock => timed("%H:%M"),
            ContentSource::DayName => timed("%A"),
            ContentSource::Date => match &block.format {
                Some(_) => timed("%Y-%m-%d"),
                None => BlockContent::single(&block.id, content::long_date(now)),
            },
            ContentSource::EraseReminder => BlockContent::single(
                &block.id,
                format!(
                    "{} erase by {}",
                    now.format("%Y-%m-%d"),
                    context.erase_due.format("%Y-%m-%d")
                ),
            ),
            ContentSource::Weather => self.weather(block, snapshot),
            ContentSource::Events => self.events(block, snapshot),
            ContentSource::Calendar => {
                let today = now.date_naive();
                BlockContent {
                    columns: content::calendar_months(today)
                        .into_iter()
                        .map(|month| content::month_grid(month, today))
                        .collect(),
                    ..BlockContent::lines(&block.id, Vec::new())
                }
            }
        }
    }

    fn is_recent(&self, as_of: &DateTime<FixedOffset>, now: &DateTime<FixedOffset>) -> bool {
        *now - *as_of <= self.stale_after
    }

    /// This tick's value when it was observed recently enough.
    fn current<'a, T>(
        &self,
        value: &'a FeedValue<T>,
        now: &DateTime<FixedOffset>,
    ) -> Option<&'a T> {
        match value {
            FeedValue::Fresh { value, as_of } if self.is_recent(as_of, now) => Some(value),
            _ => None,
        }
    }

    fn weather(&self, block: &LayoutBlock, snapshot: &DataSnapshot) -> BlockContent {
        if let Some(report) = self.current(&snapshot.weather, &snapshot.now) {
            return BlockContent::single(&block.id, content::weather_line(report));
        }
        match &self.last_weather {
            Some((report, as_of)) if self.is_recent(as_of, &snapshot.now) => {
                BlockContent::single(
                    &block.id,
                    format!(
                        "{} (as of {})",
                        content::weather_line(report),
                        as_of.format("%H:%M")
                    ),
                )
            }
            _ => BlockContent::unavailable(&block.id, block.source),
        }
    }

    fn events(&self, block: &LayoutBlock, snapshot: &DataSnapshot) -> BlockContent {
        let limit = self
            .rasterizer
            .line_height(&block.font)
            .map(|height| (block.rect.height / height.max(1)).max(1) as usize)
            .unwrap_or(1);
        let events = match (self.current(&snapshot.events, &snapshot.now), &self.last_events) {
            (Some(events), _) => events,
            (None, Some((events, as_of))) if self.is_recent(as_of, &snapshot.now) => events,
            _ => return BlockContent::unavailable(&block.id, block.source),
        };
        let lines = content::event_lines(events, &snapshot.now, limit)
            .into_iter()
            .map(Line::plain)
            .collect();
        BlockContent::lines(&block.id, lines)
    }

    fn draw(
        &self,
        block: &LayoutBlock,
        content: &BlockContent,
        frame: &mut FrameBuffer,
    ) -> Result<(), ClockError> {
        let line_height = self
            .rasterizer
            .line_height(&block.font)
            .ok_or_else(|| ClockError::config(format!("unknown font face '{}'", block.font.face)))?;
        let columns = content.columns.len().max(1) as u32;
        let column_width = block.rect.width / columns;

        for (index, lines) in content.columns.iter().enumerate() {
            let index = index as u32;
            let x = block.rect.x + index * column_width;
            let width = if index + 1 == columns {
                block.rect.right() - x
            } else {
                column_width
            };
            let area = Rect::new(x, block.rect.y, width, block.rect.height);

            for (row, line) in lines.iter().enumerate() {
                let top = row as u32 * line_height;
                if top >= area.height {
                    break;
                }
                let mask = self
                    .rasterizer
                    .rasterize(&line.text, &block.font, area.width)?;
                let lead = if block.accent_lead && row == 0 && index == 0 {
                    match line.text.chars().next() {
                        Some(first) => self
                            .rasterizer
                            .rasterize(first.encode_utf8(&mut [0; 4]), &block.font, area.width)?
                            .width(),
                        None => 0,
                    }
                } else {
                    0
                };
                let channel = if line.accent {
                    Channel::Accent
                } else {
                    block.channel
                };
                let left = match block.align {
                    Align::Left => 0,
                    Align::Center => area.width.saturating_sub(mask.width()) / 2,
                    Align::Right => area.width.saturating_sub(mask.width()),
                };
                blit(frame, area, &mask, left, top, channel, lead);
            }
        }
        Ok(())
    }
}

/// Keep `value` as the last known good one unless a newer one is held.
fn remember<T: Clone>(
    last: &mut Option<(T, DateTime<FixedOffset>)>,
    value: &T,
    as_of: DateTime<FixedOffset>,
) {
    if last.as_ref().map_or(true, |(_, held)| *held <= as_of) {
        *last = Some((value.clone(), as_of));
    }
}

/// Copy `mask` into `area` of the frame at the given offset, clipped to the
/// area. Columns left of `lead` go to the accent plane.
fn blit(
    frame: &mut FrameBuffer,
    area: Rect,
    mask: &TextMask,
    left: u32,
    top: u32,
    channel: Channel,
    lead: u32,
) {
    let ink = InkColor::from_channel(channel);
    let pixels = mask.ink().map(|(x, y)| {
        let color = if x < lead { InkColor::Red } else { ink };
        Pixel(Point::new((left + x) as i32, (top + y) as i32), color)
    });
    frame
        .cropped(&Rectangle::from(area))
        .draw_iter(pixels)
        .unwrap_or_else(|never| match never {});
}
