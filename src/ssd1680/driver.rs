//! SSD1680 Display Driver Implementation
//!
//! Drives black/white/red modules built on the SSD1680 (WeAct and
//! GoodDisplay 2.13" and 2.9" panels, up to 176x296) through the
//! [`PanelDriver`] operations.
//!
//! ## Critical Implementation Details
//!
//! ### RAM layout
//!
//! Data entry mode is X+ then Y+, so RAM takes exactly the frame buffer's
//! packed rows: `width / 8` bytes per row, MSB leftmost. The frame width is
//! the source (X) axis and its height the gate (Y) axis.
//!
//! ### Display Update Value (0xF4)
//!
//! Full refreshes use `0xF4` for Display Update Control 2, the value known
//! to work on these modules. Partial refreshes use the display mode 2
//! waveform (`0xFF`) after writing only the dirty windows.
//!
//! ### Polarity
//!
//! Some modules take `1` bits as black, others as white. `invert_black`
//! flips the black plane before it is sent; the red plane is never
//! inverted.
//!
//! ### BUSY Pin Wait
//!
//! After `MASTER_ACTIVATE` the controller holds BUSY high for the whole
//! waveform (1-3 s for a full refresh, longer for red). Waits are bounded
//! by `busy_timeout` and report [`PanelError::BusyTimeout`].

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;

use super::cmd::Cmd;
use super::flag::Flag;
use super::interface::DisplayInterface;
use super::{MAX_GATES, MAX_SOURCES};
use crate::framebuffer::{Channel, FrameBuffer, Rect, Resolution};
use crate::panel::{check_frame, PanelDriver, PanelError};

/// Tunables that differ between modules.
#[derive(Debug, Clone, Copy)]
pub struct Ssd1680Options {
    /// Send black pixels as 0 bits
    pub invert_black: bool,
    /// Longest a refresh may keep the busy line high
    pub busy_timeout: Duration,
}

impl Default for Ssd1680Options {
    fn default() -> Self {
        Self {
            invert_black: false,
            busy_timeout: Duration::from_secs(20),
        }
    }
}

/// SSD1680 E-Paper Display Driver
///
/// ## Type Parameters
///
/// - `SPI` - SPI device for communication
/// - `BSY` - BUSY input pin (HIGH when display is busy)
/// - `DC` - Data/Command output pin
/// - `RST` - Reset output pin
/// - `DELAY` - Delay provider for timing
pub struct Ssd1680<SPI, BSY, DC, RST, DELAY> {
    interface: DisplayInterface<SPI, BSY, DC, RST>,
    delay: DELAY,
    options: Ssd1680Options,
    resolution: Option<Resolution>,
}

impl<SPI, BSY, DC, RST, DELAY> Ssd1680<SPI, BSY, DC, RST, DELAY>
where
    SPI: SpiDevice,
    BSY: InputPin,
    DC: OutputPin,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// Wrap the bus and pins. Nothing is sent until `initialize`.
    pub fn new(spi: SPI, busy: BSY, dc: DC, rst: RST, delay: DELAY) -> Self {
        Self::with_options(spi, busy, dc, rst, delay, Ssd1680Options::default())
    }

    pub fn with_options(
        spi: SPI,
        busy: BSY,
        dc: DC,
        rst: RST,
        delay: DELAY,
        options: Ssd1680Options,
    ) -> Self {
        Ssd1680 {
            interface: DisplayInterface::new(spi, busy, dc, rst),
            delay,
            options,
            resolution: None,
        }
    }

    /// Give the bus, pins and delay back.
    pub fn release(self) -> (SPI, BSY, DC, RST, DELAY) {
        let (spi, busy, dc, rst) = self.interface.release();
        (spi, busy, dc, rst, self.delay)
    }

    fn wait_idle(&mut self) -> Result<(), PanelError> {
        self.interface
            .wait_busy_low(&mut self.delay, self.options.busy_timeout)
    }

    /// Reset and configure the controller for `resolution`.
    fn init(&mut self, resolution: Resolution) -> Result<(), PanelError> {
        log::debug!("Initializing SSD1680 for {}", resolution);
        self.interface.reset(&mut self.delay)?;
        self.interface
            .soft_reset(&mut self.delay, self.options.busy_timeout)?;

        let last_gate = resolution.height() - 1;
        self.interface.cmd_with_data(
            Cmd::DRIVER_CONTROL,
            &[
                last_gate as u8,
                (last_gate >> 8) as u8,
                Flag::DRIVER_OUTPUT_GATE_SCAN_FROM_G0,
            ],
        )?;
        self.interface
            .cmd_with_data(Cmd::DATA_ENTRY_MODE, &[Flag::DATA_ENTRY_INCRY_INCRX])?;
        self.interface.cmd_with_data(
            Cmd::BORDER_WAVEFORM_CONTROL,
            &[Flag::BORDER_WAVEFORM_FIXED_BITS | Flag::BORDER_WAVEFORM_WHITE],
        )?;
        self.interface
            .cmd_with_data(Cmd::TEMP_CONTROL, &[Flag::INTERNAL_TEMP_SENSOR])?;
        self.use_full_frame(resolution)?;
        self.wait_idle()
    }

    fn use_full_frame(&mut self, resolution: Resolution) -> Result<(), PanelError> {
        self.set_ram_area(resolution.bounds().byte_aligned(resolution))
    }

    /// Point the RAM window and counters at a byte-aligned rectangle.
    fn set_ram_area(&mut self, window: Rect) -> Result<(), PanelError> {
        let start_x = window.x / 8;
        let end_x = window.right() / 8 - 1;
        let start_y = window.y;
        let end_y = window.bottom() - 1;

        self.interface
            .cmd_with_data(Cmd::SET_RAMX_START_END, &[start_x as u8, end_x as u8])?;
        self.interface.cmd_with_data(
            Cmd::SET_RAMY_START_END,
            &[
                start_y as u8,
                (start_y >> 8) as u8,
                end_y as u8,
                (end_y >> 8) as u8,
            ],
        )?;
        self.interface
            .cmd_with_data(Cmd::SET_RAMX_COUNTER, &[start_x as u8])?;
        self.interface
            .cmd_with_data(Cmd::SET_RAMY_COUNTER, &[start_y as u8, (start_y >> 8) as u8])?;
        Ok(())
    }

    /// Write both planes of `window` into controller RAM.
    fn write_window(&mut self, frame: &FrameBuffer, window: Rect) -> Result<(), PanelError> {
        let mut black = frame.region_bytes(window, Channel::Primary);
        if self.options.invert_black {
            black.iter_mut().for_each(|b| *b = !*b);
        }
        let red = frame.region_bytes(window, Channel::Accent);

        self.set_ram_area(window)?;
        self.interface.cmd_with_data(Cmd::WRITE_BW_DATA, &black)?;
        self.set_ram_area(window)?;
        self.interface.cmd_with_data(Cmd::WRITE_RED_DATA, &red)?;
        Ok(())
    }

    /// Run the given update sequence and wait for it to finish.
    fn trigger_display_update(&mut self, ctrl2_value: u8) -> Result<(), PanelError> {
        self.interface
            .cmd_with_data(Cmd::UPDATE_DISPLAY_CTRL2, &[ctrl2_value])?;
        self.interface.cmd(Cmd::MASTER_ACTIVATE)?;
        self.wait_idle()?;
        // Terminates the update sequence
        self.interface.cmd(Cmd::NOP)?;
        Ok(())
    }
}

impl<SPI, BSY, DC, RST, DELAY> PanelDriver for Ssd1680<SPI, BSY, DC, RST, DELAY>
where
    SPI: SpiDevice,
    BSY: InputPin,
    DC: OutputPin,
    RST: OutputPin,
    DELAY: DelayNs,
{
    fn initialize(&mut self, resolution: Resolution) -> Result<(), PanelError> {
        if resolution.width() > MAX_SOURCES || resolution.height() > MAX_GATES {
            return Err(PanelError::Unsupported(format!(
                "{} exceeds the SSD1680's {}x{}",
                resolution, MAX_SOURCES, MAX_GATES
            )));
        }
        self.resolution = None;
        self.init(resolution)?;
        self.resolution = Some(resolution);
        log::info!("SSD1680 ready for a {} panel", resolution);
        Ok(())
    }

    fn display_full(&mut self, frame: &FrameBuffer) -> Result<(), PanelError> {
        let resolution = check_frame(self.resolution, frame)?;
        self.write_window(frame, resolution.bounds().byte_aligned(resolution))?;
        self.trigger_display_update(Flag::DISPLAY_UPDATE_FULL)
    }

    fn display_partial(
        &mut self,
        frame: &FrameBuffer,
        regions: &[Rect],
    ) -> Result<(), PanelError> {
        let resolution = check_frame(self.resolution, frame)?;
        let mut written = 0;
        for region in regions {
            let window = region.byte_aligned(resolution);
            if window.is_empty() {
                continue;
            }
            self.write_window(frame, window)?;
            written += 1;
        }
        if written == 0 {
            return Ok(());
        }
        self.use_full_frame(resolution)?;
        self.trigger_display_update(Flag::DISPLAY_UPDATE_PARTIAL)
    }

    fn sleep(&mut self) -> Result<(), PanelError> {
        log::debug!("Putting display into deep sleep mode");
        self.interface
            .cmd_with_data(Cmd::DEEP_SLEEP_MODE, &[Flag::DEEP_SLEEP_MODE_1])?;
        Ok(())
    }

    fn wake(&mut self) -> Result<(), PanelError> {
        // Deep sleep is only left through a hardware reset, which also
        // clears the configuration
        let resolution = self.resolution.ok_or(PanelError::NotInitialized)?;
        self.init(resolution)
    }
}
