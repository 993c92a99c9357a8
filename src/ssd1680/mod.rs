//! SSD1680 ePaper Display Driver
//!
//! Used in the WeAct 2.13" and 2.9" Tri-Color displays. Generic over
//! embedded-hal 1.0 SPI, GPIO and delay, so the same driver runs on a
//! Linux board through `linux-embedded-hal` and against fakes in tests.
//!
//! ### Usage
//!
//! 1. wrap the bus and pins with [`Ssd1680::new`]
//! 1. hand the driver to the scheduler, which calls
//!    [`PanelDriver::initialize`](crate::panel::PanelDriver::initialize) once
//!    and then `wake`, `display_full`/`display_partial`, `sleep` per push

mod cmd;
mod driver;
mod flag;
mod interface;

pub use driver::{Ssd1680, Ssd1680Options};

/// Maximum number of gate lines (frame height) the controller drives
pub const MAX_GATES: u32 = 296;

/// Maximum number of source lines (frame width) the controller drives
pub const MAX_SOURCES: u32 = 176;
