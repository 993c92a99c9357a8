//! Error kinds shared by the render/refresh core.
//!
//! Only two of them ever end the process: a bad configuration at startup
//! and a panel that keeps failing past the configured threshold. Everything
//! else is recovered locally and only logged.

use std::path::PathBuf;
use std::process::ExitCode;

use crate::framebuffer::{Channel, DiffError};
use crate::panel::PanelError;

/// All errors produced by the clock core.
#[derive(thiserror::Error, Debug)]
pub enum ClockError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Data source '{source_name}' unavailable: {reason}")]
    DataUnavailable { source_name: String, reason: String },

    #[error("Panel communication failed {failures} times in a row: {source}")]
    PanelCommunication {
        failures: u32,
        #[source]
        source: PanelError,
    },

    #[error("Frame diff failed: {0}")]
    DiffComputation(#[from] DiffError),

    #[error("Pixel ({x}, {y}) on the {channel} plane is outside the {width}x{height} panel")]
    OutOfBounds {
        x: u32,
        y: u32,
        channel: Channel,
        width: u32,
        height: u32,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClockError {
    /// Shorthand for building a [`ClockError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        ClockError::Configuration(message.into())
    }

    /// Whether the error must terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::ConfigFile { .. } | Self::PanelCommunication { .. }
        )
    }

    /// Process exit status for a fatal error.
    ///
    /// - `2`: the configuration could not be loaded or is invalid
    /// - `3`: the panel stopped responding
    /// - `1`: anything else that bubbled up
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Configuration(_) | Self::ConfigFile { .. } => ExitCode::from(2),
            Self::PanelCommunication { .. } => ExitCode::from(3),
            Self::DataUnavailable { .. }
            | Self::DiffComputation(_)
            | Self::OutOfBounds { .. }
            | Self::Io(_) => ExitCode::from(1),
        }
    }
}
