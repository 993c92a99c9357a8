use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use signal_hook::consts::{SIGINT, SIGTERM};

use eink_clock::config::{Config, HardwareConfig, PanelKind, DEFAULT_CONFIG_PATH};
use eink_clock::layout::{LayoutEngine, MonoRasterizer};
use eink_clock::{
    ClockError, DataSources, PanelDriver, Scheduler, SimulatedPanel, SystemClock, TimedPanel,
};

/// Bicolor e-ink clock
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Render a single tick and exit
    #[arg(long)]
    once: bool,

    /// Erase the panel with a full refresh before the first tick
    #[arg(long)]
    clear: bool,

    /// Draw in portrait orientation regardless of the configuration
    #[arg(long)]
    portrait: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            return fail(e);
        }
    };
    init_logging(&config.logging.level);

    match run(&args, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn fail(e: anyhow::Error) -> ExitCode {
    error!("{:#}", e);
    match e.downcast_ref::<ClockError>() {
        Some(clock) => clock.exit_code(),
        None => ExitCode::FAILURE,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = Config::load(&args.config)?;
    if args.portrait {
        config.set_portrait(true)?;
    }
    Ok(config)
}

fn run(args: &Args, config: Config) -> anyhow::Result<()> {
    let layout = LayoutEngine::new(&config, MonoRasterizer)?;
    let sources = DataSources::from_config(&config.data, config.schedule.fetch_timeout);
    let panel = TimedPanel::new(
        open_panel(&config)?,
        config.output.timing_file.as_deref(),
    );
    let mut scheduler = Scheduler::new(&config, layout, panel, SystemClock, sources)?;

    let shutdown = scheduler.shutdown_flag();
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .with_context(|| format!("registering handler for signal {}", signal))?;
    }

    if args.clear {
        scheduler.erase()?;
    }

    let ticks = scheduler.run(args.once.then_some(1))?;
    info!("Stopped after {} ticks", ticks);
    Ok(())
}

fn open_panel(config: &Config) -> anyhow::Result<Box<dyn PanelDriver>> {
    match config.panel.driver {
        PanelKind::Simulator => Ok(Box::new(SimulatedPanel::new(&config.output.frames_dir))),
        PanelKind::Ssd1680 => open_ssd1680(&config.panel.hardware),
    }
}

#[cfg(feature = "linux-panel")]
fn open_ssd1680(hardware: &HardwareConfig) -> anyhow::Result<Box<dyn PanelDriver>> {
    use eink_clock::ssd1680::{Ssd1680, Ssd1680Options};
    use linux_embedded_hal::{
        gpio_cdev::{Chip, LineRequestFlags},
        spidev::{SpiModeFlags, SpidevOptions},
        CdevPin, Delay, SpidevDevice,
    };

    let mut spi = SpidevDevice::open(&hardware.spi_device)
        .with_context(|| format!("opening {}", hardware.spi_device.display()))?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(hardware.spi_speed_hz)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    spi.configure(&options).context("configuring SPI")?;

    let mut chip = Chip::new(&hardware.gpio_chip)
        .with_context(|| format!("opening {}", hardware.gpio_chip.display()))?;
    let mut line = |offset: u32, flags: LineRequestFlags, name: &str| -> anyhow::Result<CdevPin> {
        let handle = chip
            .get_line(offset)
            .with_context(|| format!("getting {} line {}", name, offset))?
            .request(flags, 0, name)
            .with_context(|| format!("requesting {} line {}", name, offset))?;
        CdevPin::new(handle).with_context(|| format!("creating {} pin", name))
    };
    let busy = line(hardware.busy_pin, LineRequestFlags::INPUT, "eink-busy")?;
    let dc = line(hardware.dc_pin, LineRequestFlags::OUTPUT, "eink-dc")?;
    let rst = line(hardware.rst_pin, LineRequestFlags::OUTPUT, "eink-rst")?;

    info!(
        "SSD1680 on {} at {} Hz",
        hardware.spi_device.display(),
        hardware.spi_speed_hz
    );
    let options = Ssd1680Options {
        invert_black: hardware.invert_black,
        ..Ssd1680Options::default()
    };
    Ok(Box::new(Ssd1680::with_options(spi, busy, dc, rst, Delay, options)))
}

#[cfg(not(feature = "linux-panel"))]
fn open_ssd1680(_hardware: &HardwareConfig) -> anyhow::Result<Box<dyn PanelDriver>> {
    Err(ClockError::config(
        "panel.driver = \"ssd1680\" needs a build with the linux-panel feature",
    )
    .into())
}
