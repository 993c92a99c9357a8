//! Four-wire SPI link to the controller: bus plus BUSY, D/C and RST lines.
use std::time::Duration;

use display_interface::DisplayError;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;

use super::cmd::Cmd;
use crate::panel::PanelError;

/// How often the busy line is sampled.
const BUSY_POLL_MS: u32 = 10;

/// Bytes per SPI write when streaming a plane; spidev caps a transfer at 4 KiB.
const CHUNK_SIZE: usize = 4096;

/// RST levels and how long to hold each, in ms.
const RESET_PULSE: [(bool, u32); 3] = [(true, 20), (false, 2), (true, 20)];

pub struct DisplayInterface<SPI, BSY, DC, RST> {
    spi: SPI,
    /// Driven high by the controller while a command runs
    busy: BSY,
    /// Low selects the command register, high the data register
    dc: DC,
    /// Active-low hardware reset
    rst: RST,
}

impl<SPI, BSY, DC, RST> DisplayInterface<SPI, BSY, DC, RST> {
    pub fn new(spi: SPI, busy: BSY, dc: DC, rst: RST) -> Self {
        Self { spi, busy, dc, rst }
    }

    pub fn release(self) -> (SPI, BSY, DC, RST) {
        (self.spi, self.busy, self.dc, self.rst)
    }
}

impl<SPI, BSY, DC, RST> DisplayInterface<SPI, BSY, DC, RST>
where
    SPI: SpiDevice,
    BSY: InputPin,
    DC: OutputPin,
    RST: OutputPin,
{
    /// Send a single command byte.
    pub(crate) fn cmd(&mut self, command: u8) -> Result<(), DisplayError> {
        self.dc.set_low().map_err(|_| DisplayError::DCError)?;
        self.spi.write(&[command]).map_err(|e| {
            log::error!("SPI write of command 0x{:02X} failed: {:?}", command, e);
            DisplayError::BusWriteError
        })
    }

    /// Stream parameter or RAM bytes for the last command.
    pub(crate) fn data(&mut self, bytes: &[u8]) -> Result<(), DisplayError> {
        self.dc.set_high().map_err(|_| DisplayError::DCError)?;
        bytes.chunks(CHUNK_SIZE).try_for_each(|chunk| {
            self.spi
                .write(chunk)
                .map_err(|_| DisplayError::BusWriteError)
        })
    }

    pub(crate) fn cmd_with_data(&mut self, command: u8, bytes: &[u8]) -> Result<(), DisplayError> {
        self.cmd(command)?;
        self.data(bytes)
    }

    /// Pulse RST. The only way out of deep sleep; clears all registers.
    pub(crate) fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), DisplayError> {
        for (level, hold_ms) in RESET_PULSE {
            let set = if level {
                self.rst.set_high()
            } else {
                self.rst.set_low()
            };
            set.map_err(|_| DisplayError::RSError)?;
            delay.delay_ms(hold_ms);
        }
        Ok(())
    }

    /// Issue SW_RESET and wait for the controller to come back.
    pub(crate) fn soft_reset(
        &mut self,
        delay: &mut impl DelayNs,
        timeout: Duration,
    ) -> Result<(), PanelError> {
        self.cmd(Cmd::SW_RESET)?;
        delay.delay_ms(10);
        self.wait_busy_low(delay, timeout)
    }

    /// Poll BUSY until it drops, or fail once `timeout` has been spent.
    pub(crate) fn wait_busy_low(
        &mut self,
        delay: &mut impl DelayNs,
        timeout: Duration,
    ) -> Result<(), PanelError> {
        let limit_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let mut waited_ms = 0u32;
        loop {
            let busy = self
                .busy
                .is_high()
                .map_err(|_| PanelError::Unresponsive("cannot read the busy line".to_string()))?;
            if !busy {
                log::debug!("Busy line released after ~{}ms", waited_ms);
                return Ok(());
            }
            if waited_ms >= limit_ms {
                log::error!("Busy line still high after {}ms", waited_ms);
                return Err(PanelError::BusyTimeout(timeout));
            }
            delay.delay_ms(BUSY_POLL_MS);
            waited_ms = waited_ms.saturating_add(BUSY_POLL_MS);
        }
    }
}
