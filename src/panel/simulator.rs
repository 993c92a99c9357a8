use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use log::{debug, info};

use super::{check_frame, PanelDriver, PanelError};
use crate::framebuffer::{FrameBuffer, InkColor, Rect, Resolution};

/// Stand-in panel that renders every push to a PNG.
///
/// Each full refresh rewrites `latest.png` from scratch. A partial refresh
/// only repaints its regions on top of the previous image, so stale pixels
/// outside them stay visible the same way they would on glass.
pub struct SimulatedPanel {
    dir: PathBuf,
    resolution: Option<Resolution>,
    canvas: Option<RgbImage>,
    asleep: bool,
    pushes: u64,
}

impl SimulatedPanel {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            resolution: None,
            canvas: None,
            asleep: true,
            pushes: 0,
        }
    }

    /// Path of the most recent preview.
    pub fn preview_path(&self) -> PathBuf {
        self.dir.join("latest.png")
    }

    pub fn pushes(&self) -> u64 {
        self.pushes
    }

    fn ensure_awake(&self) -> Result<(), PanelError> {
        if self.asleep {
            Err(PanelError::Unresponsive("display called while asleep".into()))
        } else {
            Ok(())
        }
    }

    fn paint(canvas: &mut RgbImage, frame: &FrameBuffer, rect: Rect) {
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                let ink = frame.color_at(x, y).unwrap_or(InkColor::White);
                canvas.put_pixel(x, y, Rgb(ink.rgb()));
            }
        }
    }

    fn save(&mut self) -> Result<(), PanelError> {
        let Some(canvas) = &self.canvas else {
            return Err(PanelError::NotInitialized);
        };
        let path = self.preview_path();
        canvas.save(&path)?;
        self.pushes += 1;
        debug!("Wrote preview {}", path.display());
        Ok(())
    }
}

impl PanelDriver for SimulatedPanel {
    fn initialize(&mut self, resolution: Resolution) -> Result<(), PanelError> {
        std::fs::create_dir_all(&self.dir)?;
        self.resolution = Some(resolution);
        self.canvas = Some(RgbImage::from_pixel(
            resolution.width(),
            resolution.height(),
            Rgb(InkColor::White.rgb()),
        ));
        info!(
            "Simulated {} panel writing to {}",
            resolution,
            self.dir.display()
        );
        Ok(())
    }

    fn display_full(&mut self, frame: &FrameBuffer) -> Result<(), PanelError> {
        let resolution = check_frame(self.resolution, frame)?;
        self.ensure_awake()?;
        if let Some(canvas) = self.canvas.as_mut() {
            Self::paint(canvas, frame, resolution.bounds());
        }
        self.save()
    }

    fn display_partial(
        &mut self,
        frame: &FrameBuffer,
        regions: &[Rect],
    ) -> Result<(), PanelError> {
        let resolution = check_frame(self.resolution, frame)?;
        self.ensure_awake()?;
        if let Some(canvas) = self.canvas.as_mut() {
            for region in regions {
                if let Some(visible) = region.intersection(&resolution.bounds()) {
                    Self::paint(canvas, frame, visible);
                }
            }
        }
        self.save()
    }

    fn sleep(&mut self) -> Result<(), PanelError> {
        self.asleep = true;
        Ok(())
    }

    fn wake(&mut self) -> Result<(), PanelError> {
        if self.resolution.is_none() {
            return Err(PanelError::NotInitialized);
        }
        self.asleep = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::Channel;

    fn panel_with_frame() -> (tempfile::TempDir, SimulatedPanel, FrameBuffer) {
        let dir = tempfile::tempdir().unwrap();
        let mut panel = SimulatedPanel::new(&dir.path().join("frames"));
        let resolution = Resolution::new(16, 8).unwrap();
        panel.initialize(resolution).unwrap();
        panel.wake().unwrap();
        (dir, panel, FrameBuffer::new(resolution))
    }

    #[test]
    fn full_refresh_writes_the_composited_frame() {
        let (_dir, mut panel, mut frame) = panel_with_frame();
        frame.paint(1, 1, InkColor::Red).unwrap();
        frame.paint(2, 1, InkColor::Black).unwrap();
        panel.display_full(&frame).unwrap();

        let image = image::open(panel.preview_path()).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (16, 8));
        assert_eq!(image.get_pixel(1, 1).0, InkColor::Red.rgb());
        assert_eq!(image.get_pixel(2, 1).0, InkColor::Black.rgb());
        assert_eq!(image.get_pixel(0, 0).0, InkColor::White.rgb());
        assert_eq!(panel.pushes(), 1);
    }

    #[test]
    fn partial_refresh_leaves_other_pixels_alone() {
        let (_dir, mut panel, mut frame) = panel_with_frame();
        frame.set_pixel(0, 0, Channel::Primary, true).unwrap();
        panel.display_full(&frame).unwrap();

        frame.clear();
        frame.set_pixel(10, 5, Channel::Primary, true).unwrap();
        panel
            .display_partial(&frame, &[Rect::new(10, 5, 1, 1)])
            .unwrap();

        let image = image::open(panel.preview_path()).unwrap().to_rgb8();
        assert_eq!(image.get_pixel(0, 0).0, InkColor::Black.rgb());
        assert_eq!(image.get_pixel(10, 5).0, InkColor::Black.rgb());
    }

    #[test]
    fn protocol_violations_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut panel = SimulatedPanel::new(dir.path());
        let frame = FrameBuffer::new(Resolution::new(8, 8).unwrap());
        assert!(matches!(
            panel.display_full(&frame),
            Err(PanelError::NotInitialized)
        ));

        panel.initialize(Resolution::new(8, 8).unwrap()).unwrap();
        assert!(matches!(
            panel.display_full(&frame),
            Err(PanelError::Unresponsive(_))
        ));

        panel.wake().unwrap();
        let wrong = FrameBuffer::new(Resolution::new(16, 8).unwrap());
        assert!(matches!(
            panel.display_full(&wrong),
            Err(PanelError::ResolutionMismatch { .. })
        ));
    }
}
