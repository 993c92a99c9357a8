//! The five operations the scheduler needs from a physical panel.
//!
//! Implementations own the wire protocol; the scheduler only ever calls
//! these in the order `initialize` (once), then `wake`, one `display_*`,
//! `sleep` per push. A failed call is retried as a whole on a later tick.

mod simulator;
mod timed;

pub use simulator::SimulatedPanel;
pub use timed::{RunningAverage, TimedPanel, UpdateTimings};

use std::time::Duration;

use display_interface::DisplayError;

use crate::framebuffer::{FrameBuffer, Rect, Resolution};

#[derive(thiserror::Error, Debug)]
pub enum PanelError {
    #[error("display interface error: {0:?}")]
    Interface(DisplayError),

    #[error("panel still busy after {0:?}")]
    BusyTimeout(Duration),

    #[error("panel unresponsive: {0}")]
    Unresponsive(String),

    #[error("panel is {panel}, frame is {frame}")]
    ResolutionMismatch { panel: Resolution, frame: Resolution },

    #[error("unsupported panel: {0}")]
    Unsupported(String),

    #[error("panel used before initialize")]
    NotInitialized,

    #[error("preview image: {0}")]
    Preview(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DisplayError> for PanelError {
    fn from(e: DisplayError) -> Self {
        PanelError::Interface(e)
    }
}

/// Capability interface over a concrete e-paper controller.
pub trait PanelDriver {
    /// Bring the controller up for a panel of `resolution`.
    fn initialize(&mut self, resolution: Resolution) -> Result<(), PanelError>;

    /// Redraw the whole panel, clearing ghosting.
    fn display_full(&mut self, frame: &FrameBuffer) -> Result<(), PanelError>;

    /// Redraw only `regions` of the panel.
    fn display_partial(&mut self, frame: &FrameBuffer, regions: &[Rect])
        -> Result<(), PanelError>;

    /// Enter the controller's low-power state.
    fn sleep(&mut self) -> Result<(), PanelError>;

    /// Leave the low-power state; may reset the controller.
    fn wake(&mut self) -> Result<(), PanelError>;
}

impl<P: PanelDriver + ?Sized> PanelDriver for Box<P> {
    fn initialize(&mut self, resolution: Resolution) -> Result<(), PanelError> {
        (**self).initialize(resolution)
    }

    fn display_full(&mut self, frame: &FrameBuffer) -> Result<(), PanelError> {
        (**self).display_full(frame)
    }

    fn display_partial(
        &mut self,
        frame: &FrameBuffer,
        regions: &[Rect],
    ) -> Result<(), PanelError> {
        (**self).display_partial(frame, regions)
    }

    fn sleep(&mut self) -> Result<(), PanelError> {
        (**self).sleep()
    }

    fn wake(&mut self) -> Result<(), PanelError> {
        (**self).wake()
    }
}

/// Fails unless the frame has the size the panel was initialized with.
pub(crate) fn check_frame(
    panel: Option<Resolution>,
    frame: &FrameBuffer,
) -> Result<Resolution, PanelError> {
    let panel = panel.ok_or(PanelError::NotInitialized)?;
    if panel != frame.resolution() {
        return Err(PanelError::ResolutionMismatch {
            panel,
            frame: frame.resolution(),
        });
    }
    Ok(panel)
}
