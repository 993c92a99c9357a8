//! Static configuration, loaded once at startup from a TOML file.
//!
//! ```toml
//! [panel]
//! width = 296
//! height = 128
//!
//! [refresh]
//! erase_interval = "90d"
//! partial_area_threshold = 0.05
//!
//! [[blocks]]
//! id = "clock"
//! source = "clock"
//! x = 0
//! y = 0
//! width = 296
//! height = 64
//! font = "large"
//! ```
//!
//! Everything but `[panel]` has a default. Without any `[[blocks]]` the
//! classic clock face (day name, time, date, erase reminder) is laid out
//! over the panel.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

use crate::error::ClockError;
use crate::framebuffer::{Channel, Rect, Resolution};

/// Where the binary looks when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "eink-clock.toml";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub panel: PanelConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub fonts: FontRoles,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub blocks: Vec<BlockConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanelConfig {
    pub width: u32,
    pub height: u32,
    /// Swap width and height
    #[serde(default)]
    pub portrait: bool,
    #[serde(default)]
    pub driver: PanelKind,
    #[serde(default)]
    pub hardware: HardwareConfig,
}

/// Which panel backend the binary drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelKind {
    /// Write PNG previews instead of talking to hardware
    #[default]
    Simulator,
    /// SSD1680 controller on spidev (needs the `linux-panel` feature)
    Ssd1680,
}

/// Wiring of a panel attached to the board's SPI header.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HardwareConfig {
    pub spi_device: PathBuf,
    pub spi_speed_hz: u32,
    pub gpio_chip: PathBuf,
    pub busy_pin: u32,
    pub dc_pin: u32,
    pub rst_pin: u32,
    /// Send black pixels as 0 bits (most Waveshare/GoodDisplay panels)
    pub invert_black: bool,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            spi_device: PathBuf::from("/dev/spidev0.0"),
            spi_speed_hz: 4_000_000,
            gpio_chip: PathBuf::from("/dev/gpiochip0"),
            busy_pin: 24,
            dc_pin: 25,
            rst_pin: 17,
            invert_black: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RefreshConfig {
    /// Longest time the panel may go without a full erase
    #[serde(deserialize_with = "deserialize_duration")]
    pub erase_interval: Duration,
    /// Fraction of the panel area above which a change is pushed as a full refresh
    pub partial_area_threshold: f64,
    /// Panel failures in a row that end the process
    pub max_consecutive_failures: u32,
    /// Partial refreshes allowed between two full ones, unlimited when absent
    pub max_partial_refreshes: Option<u32>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            erase_interval: Duration::from_secs(90 * SECONDS_PER_DAY),
            partial_area_threshold: 0.05,
            max_consecutive_failures: 3,
            max_partial_refreshes: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScheduleConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub tick_interval: Duration,
    /// Upper bound for a single weather/calendar fetch
    #[serde(deserialize_with = "deserialize_duration")]
    pub fetch_timeout: Duration,
    /// Wake on wall-clock multiples of the tick interval (on the minute)
    pub align_to_interval: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(5),
            align_to_interval: true,
        }
    }
}

/// Named text sizes used by layout blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontRole {
    Large,
    #[default]
    Small,
    Tiny,
}

impl fmt::Display for FontRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontRole::Large => write!(f, "large"),
            FontRole::Small => write!(f, "small"),
            FontRole::Tiny => write!(f, "tiny"),
        }
    }
}

/// A font face and the pixel height text should be drawn at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FontSpec {
    pub face: String,
    pub size: u32,
}

impl FontSpec {
    pub fn new(face: &str, size: u32) -> Self {
        Self {
            face: face.to_string(),
            size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FontRoles {
    pub large: FontSpec,
    pub small: FontSpec,
    pub tiny: FontSpec,
}

impl FontRoles {
    pub fn get(&self, role: FontRole) -> &FontSpec {
        match role {
            FontRole::Large => &self.large,
            FontRole::Small => &self.small,
            FontRole::Tiny => &self.tiny,
        }
    }
}

impl Default for FontRoles {
    fn default() -> Self {
        Self {
            large: FontSpec::new("10x20", 40),
            small: FontSpec::new("6x10", 10),
            tiny: FontSpec::new("5x8", 8),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DataConfig {
    /// TOML file kept up to date by an external weather poller
    pub weather_file: Option<PathBuf>,
    /// TOML file kept up to date by an external calendar sync
    pub events_file: Option<PathBuf>,
    /// How long a last-known-good value may stand in for a failed fetch
    #[serde(deserialize_with = "deserialize_duration")]
    pub stale_after: Duration,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            weather_file: None,
            events_file: None,
            stale_after: Duration::from_secs(3 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OutputConfig {
    /// Directory the simulator writes PNG frames into
    pub frames_dir: PathBuf,
    /// Running average of panel update time, kept across runs
    pub timing_file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("frames"),
            timing_file: Some(PathBuf::from("update.bin")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Default `env_logger` filter; `RUST_LOG` wins when set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// What a layout block shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    Clock,
    Date,
    DayName,
    Weather,
    Events,
    Calendar,
    EraseReminder,
}

impl fmt::Display for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentSource::Clock => "clock",
            ContentSource::Date => "date",
            ContentSource::DayName => "day_name",
            ContentSource::Weather => "weather",
            ContentSource::Events => "events",
            ContentSource::Calendar => "calendar",
            ContentSource::EraseReminder => "erase_reminder",
        };
        f.write_str(name)
    }
}

/// Horizontal placement of text inside its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockConfig {
    pub id: String,
    pub source: ContentSource,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub font: FontRole,
    #[serde(default)]
    pub align: Align,
    #[serde(default)]
    pub channel: Channel,
    /// strftime pattern for time-based sources
    #[serde(default)]
    pub format: Option<String>,
    /// Draw the first glyph in the accent channel
    #[serde(default)]
    pub accent_lead: bool,
}

impl BlockConfig {
    pub fn new(id: &str, source: ContentSource, rect: Rect) -> Self {
        Self {
            id: id.to_string(),
            source,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            font: FontRole::default(),
            align: Align::default(),
            channel: Channel::default(),
            format: None,
            accent_lead: false,
        }
    }

    pub fn with_font(mut self, font: FontRole) -> Self {
        self.font = font;
        self
    }

    pub fn with_align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn with_accent_lead(mut self) -> Self {
        self.accent_lead = true;
        self
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

impl Config {
    /// Defaults for a panel of the given size, with the classic clock face.
    pub fn for_panel(width: u32, height: u32) -> Self {
        let mut config = Self {
            panel: PanelConfig {
                width,
                height,
                portrait: false,
                driver: PanelKind::default(),
                hardware: HardwareConfig::default(),
            },
            refresh: RefreshConfig::default(),
            schedule: ScheduleConfig::default(),
            fonts: FontRoles::default(),
            data: DataConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
            blocks: Vec::new(),
        };
        config.blocks = clock_face(Resolution::new(width, height).ok());
        config
    }

    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ClockError> {
        let text = std::fs::read_to_string(path).map_err(|source| ClockError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::info!(
            "Loaded configuration from {} ({} panel, {} blocks)",
            path.display(),
            config.resolution()?,
            config.blocks.len()
        );
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ClockError> {
        let mut config: Config =
            toml::from_str(text).map_err(|e| ClockError::config(e.to_string()))?;
        if config.blocks.is_empty() {
            config.blocks = clock_face(config.resolution().ok());
        }
        config.validate()?;
        Ok(config)
    }

    /// Panel size as drawn, after applying portrait rotation.
    pub fn resolution(&self) -> Result<Resolution, ClockError> {
        let native = Resolution::new(self.panel.width, self.panel.height)?;
        Ok(if self.panel.portrait {
            native.transposed()
        } else {
            native
        })
    }

    /// Switch orientation. A generated clock face is laid out again for the
    /// new shape; hand-written blocks are kept and must still fit.
    pub fn set_portrait(&mut self, portrait: bool) -> Result<(), ClockError> {
        let generated = self.blocks == clock_face(self.resolution().ok());
        self.panel.portrait = portrait;
        if generated {
            self.blocks = clock_face(self.resolution().ok());
        }
        self.validate()
    }

    /// Checks that don't depend on fonts or block geometry; the layout
    /// engine verifies those when it is built.
    pub fn validate(&self) -> Result<(), ClockError> {
        self.resolution()?;

        let refresh = &self.refresh;
        if !(0.0..=1.0).contains(&refresh.partial_area_threshold) {
            return Err(ClockError::config(format!(
                "refresh.partial_area_threshold must be between 0 and 1, got {}",
                refresh.partial_area_threshold
            )));
        }
        if refresh.max_consecutive_failures == 0 {
            return Err(ClockError::config(
                "refresh.max_consecutive_failures must be at least 1",
            ));
        }
        if refresh.erase_interval.is_zero() {
            return Err(ClockError::config("refresh.erase_interval must be positive"));
        }
        if chrono::TimeDelta::from_std(refresh.erase_interval).is_err() {
            return Err(ClockError::config("refresh.erase_interval is too long"));
        }

        let schedule = &self.schedule;
        if schedule.tick_interval < Duration::from_secs(1) {
            return Err(ClockError::config(
                "schedule.tick_interval must be at least one second",
            ));
        }
        if schedule.fetch_timeout.is_zero() || schedule.fetch_timeout > schedule.tick_interval {
            return Err(ClockError::config(
                "schedule.fetch_timeout must be positive and no longer than the tick interval",
            ));
        }

        for (role, spec) in [
            (FontRole::Large, &self.fonts.large),
            (FontRole::Small, &self.fonts.small),
            (FontRole::Tiny, &self.fonts.tiny),
        ] {
            if spec.size == 0 {
                return Err(ClockError::config(format!("fonts.{} size must be positive", role)));
            }
        }

        for block in &self.blocks {
            if let Some(format) = &block.format {
                if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                    return Err(ClockError::config(format!(
                        "block '{}' has an invalid time format '{}'",
                        block.id, format
                    )));
                }
            }
        }
        Ok(())
    }
}

/// The classic clock layout: day name across the top in red, the time on
/// the left with the date on the right beneath it, and the erase reminder
/// along the bottom edge.
fn clock_face(resolution: Option<Resolution>) -> Vec<BlockConfig> {
    let Some(resolution) = resolution else {
        return Vec::new();
    };
    let (width, height) = (resolution.width(), resolution.height());
    let top = height * 3 / 10;
    let middle = height / 2;
    let footer = height - top - middle;
    let half = width / 2;

    vec![
        BlockConfig::new("day", ContentSource::DayName, Rect::new(0, 0, width, top))
            .with_font(FontRole::Large)
            .with_align(Align::Center)
            .with_channel(Channel::Accent),
        BlockConfig::new("clock", ContentSource::Clock, Rect::new(0, top, half, middle))
            .with_font(FontRole::Large)
            .with_accent_lead(),
        BlockConfig::new(
            "date",
            ContentSource::Date,
            Rect::new(half, top, width - half, middle),
        )
        .with_align(Align::Right),
        BlockConfig::new(
            "erase",
            ContentSource::EraseReminder,
            Rect::new(0, top + middle, width, footer),
        )
        .with_font(FontRole::Tiny)
        .with_align(Align::Center),
    ]
}

/// Parse `"90d"`, `"1m"`, `"1h30m"`, `"45s"` or `"2w"`.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        if ch.is_whitespace() {
            continue;
        }
        let unit = match ch {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => SECONDS_PER_DAY,
            'w' => 7 * SECONDS_PER_DAY,
            other => return Err(format!("unknown unit '{}' in '{}'", other, text)),
        };
        let amount: u64 = digits
            .parse()
            .map_err(|_| format!("missing number before '{}' in '{}'", ch, text))?;
        total = amount
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("duration '{}' is too long", text))?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(format!("missing unit after '{}' in '{}'", digits, text));
    }
    Ok(Duration::from_secs(total))
}

/// Durations are either a string understood by [`parse_duration`] or a
/// bare number of seconds.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a duration such as \"90d\" or a number of seconds")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            parse_duration(value).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
            u64::try_from(value)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration cannot be negative"))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}
