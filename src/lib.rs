//! Render and refresh core of a bicolor (black/red on white) e-ink clock.
//!
//! A [`Scheduler`] ticks once per interval: it renders the configured
//! [`LayoutEngine`] blocks into a [`FrameBuffer`], diffs it against what the
//! panel shows and lets the [`RefreshPolicy`] pick a partial or a full
//! refresh, forcing a full erase at least every `refresh.erase_interval` to
//! keep ghosting away.

pub mod config;
pub mod data;
pub mod error;
pub mod framebuffer;
pub mod layout;
pub mod panel;
pub mod refresh;
pub mod scheduler;
pub mod ssd1680;
pub mod time;

pub use config::Config;
pub use data::{DataSnapshot, DataSources};
pub use error::ClockError;
pub use framebuffer::{Channel, FrameBuffer, InkColor, Rect, Resolution};
pub use layout::LayoutEngine;
pub use panel::{PanelDriver, PanelError, SimulatedPanel, TimedPanel};
pub use refresh::{RefreshDecision, RefreshPolicy};
pub use scheduler::Scheduler;
pub use time::{ManualClock, SystemClock, TimeSource};
