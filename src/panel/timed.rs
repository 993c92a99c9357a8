use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{PanelDriver, PanelError};
use crate::framebuffer::{FrameBuffer, Rect, Resolution};

/// Incremental mean of update durations.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunningAverage {
    count: u64,
    mean_secs: f64,
}

impl RunningAverage {
    pub fn record(&mut self, sample: Duration) {
        self.count += 1;
        self.mean_secs += (sample.as_secs_f64() - self.mean_secs) / self.count as f64;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Duration {
        Duration::from_secs_f64(self.mean_secs.max(0.0))
    }
}

/// Averages for both kinds of refresh, kept across runs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateTimings {
    pub full: RunningAverage,
    pub partial: RunningAverage,
}

impl UpdateTimings {
    /// Previous timings, or fresh ones if the file is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("Cannot read timings {}: {}", path.display(), e);
                return Self::default();
            }
        };
        bincode::deserialize(&bytes).unwrap_or_else(|e| {
            warn!("Discarding corrupt timings {}: {}", path.display(), e);
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), PanelError> {
        let bytes = bincode::serialize(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Wraps a panel and reports how long each refresh took.
pub struct TimedPanel<P> {
    inner: P,
    timings: UpdateTimings,
    path: Option<PathBuf>,
}

impl<P: PanelDriver> TimedPanel<P> {
    /// Timings are loaded from and saved to `path` when one is given.
    pub fn new(inner: P, path: Option<&Path>) -> Self {
        let timings = path.map(UpdateTimings::load).unwrap_or_default();
        Self {
            inner,
            timings,
            path: path.map(Path::to_path_buf),
        }
    }

    pub fn timings(&self) -> &UpdateTimings {
        &self.timings
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn finish(&mut self, kind: &str, started: Instant, full: bool) {
        let took = started.elapsed();
        let average = if full {
            &mut self.timings.full
        } else {
            &mut self.timings.partial
        };
        average.record(took);
        info!(
            "{} update took {:.1}s (average {:.1}s over {} updates)",
            kind,
            took.as_secs_f64(),
            average.mean().as_secs_f64(),
            average.count()
        );
        if let Some(path) = &self.path {
            if let Err(e) = self.timings.save(path) {
                warn!("Cannot save timings to {}: {}", path.display(), e);
            }
        }
    }
}

impl<P: PanelDriver> PanelDriver for TimedPanel<P> {
    fn initialize(&mut self, resolution: Resolution) -> Result<(), PanelError> {
        self.inner.initialize(resolution)
    }

    fn display_full(&mut self, frame: &FrameBuffer) -> Result<(), PanelError> {
        let started = Instant::now();
        self.inner.display_full(frame)?;
        self.finish("Full", started, true);
        Ok(())
    }

    fn display_partial(
        &mut self,
        frame: &FrameBuffer,
        regions: &[Rect],
    ) -> Result<(), PanelError> {
        let started = Instant::now();
        self.inner.display_partial(frame, regions)?;
        self.finish("Partial", started, false);
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), PanelError> {
        self.inner.sleep()
    }

    fn wake(&mut self) -> Result<(), PanelError> {
        self.inner.wake()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::SimulatedPanel;

    #[test]
    fn running_average_is_the_mean() {
        let mut average = RunningAverage::default();
        average.record(Duration::from_secs(2));
        average.record(Duration::from_secs(4));
        average.record(Duration::from_secs(6));
        assert_eq!(average.count(), 3);
        assert!((average.mean().as_secs_f64() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn timings_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let timing_file = dir.path().join("update.bin");
        let resolution = Resolution::new(8, 8).unwrap();
        let frame = FrameBuffer::new(resolution);

        let mut panel = TimedPanel::new(SimulatedPanel::new(dir.path()), Some(&timing_file));
        panel.initialize(resolution).unwrap();
        panel.wake().unwrap();
        panel.display_full(&frame).unwrap();
        panel.display_partial(&frame, &[Rect::new(0, 0, 1, 1)]).unwrap();
        assert_eq!(panel.inner().pushes(), 2);

        let reloaded = UpdateTimings::load(&timing_file);
        assert_eq!(reloaded.full.count(), 1);
        assert_eq!(reloaded.partial.count(), 1);
    }

    #[test]
    fn failed_updates_are_not_timed() {
        let dir = tempfile::tempdir().unwrap();
        let mut panel = TimedPanel::new(SimulatedPanel::new(dir.path()), None);
        let frame = FrameBuffer::new(Resolution::new(8, 8).unwrap());
        assert!(panel.display_full(&frame).is_err());
        assert_eq!(panel.timings().full.count(), 0);
    }

    #[test]
    fn corrupt_timing_file_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.bin");
        std::fs::write(&path, b"x").unwrap();
        assert_eq!(UpdateTimings::load(&path), UpdateTimings::default());
    }
}
