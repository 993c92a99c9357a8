//! Read-only data the clock face is drawn from.
//!
//! Weather and calendar data come from [`Feed`]s owned by other programs.
//! Every tick the scheduler asks [`DataSources`] for a [`DataSnapshot`];
//! each feed is fetched on a helper thread and given at most the configured
//! timeout, after which it counts as unavailable for that tick.

mod fetch;
mod file;

pub use fetch::BoundedFetcher;
pub use file::FileFeed;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

use crate::config::DataConfig;
use crate::error::ClockError;

/// Why a feed produced nothing.
#[derive(thiserror::Error, Debug)]
pub enum DataError {
    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("fetch worker stopped without an answer")]
    WorkerLost,
}

/// A provider of one kind of external data.
pub trait Feed<T>: Send + Sync {
    /// Short name used in logs and placeholders, e.g. `weather`.
    fn name(&self) -> &str;

    /// Produce the current value. May block; callers bound it with a timeout.
    fn fetch(&self) -> Result<T, DataError>;
}

/// A record that may say when it was observed.
///
/// Records without a timestamp count as observed when they were fetched.
pub trait Observed {
    fn observed_at(&self) -> Option<DateTime<FixedOffset>> {
        None
    }
}

/// Current conditions as reported by the weather poller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeatherReport {
    pub temperature_c: f64,
    pub condition: String,
    #[serde(default)]
    pub observed_at: Option<DateTime<FixedOffset>>,
}

impl Observed for WeatherReport {
    fn observed_at(&self) -> Option<DateTime<FixedOffset>> {
        self.observed_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CalendarEvent {
    pub start: DateTime<FixedOffset>,
    pub title: String,
    #[serde(default)]
    pub all_day: bool,
}

impl Observed for Vec<CalendarEvent> {}

/// Outcome of one feed for one tick.
#[derive(Debug)]
pub enum FeedValue<T> {
    Fresh {
        value: T,
        /// When the value was observed, never later than the tick
        as_of: DateTime<FixedOffset>,
    },
    /// The feed failed or timed out; holds a [`ClockError::DataUnavailable`].
    Unavailable(ClockError),
    /// No feed is configured for this kind of data.
    Absent,
}

impl<T> FeedValue<T> {
    pub fn fresh(&self) -> Option<&T> {
        match self {
            FeedValue::Fresh { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Everything a render pass may look at.
#[derive(Debug)]
pub struct DataSnapshot {
    pub now: DateTime<FixedOffset>,
    pub weather: FeedValue<WeatherReport>,
    pub events: FeedValue<Vec<CalendarEvent>>,
}

impl DataSnapshot {
    /// A snapshot with only the time known.
    pub fn at(now: DateTime<FixedOffset>) -> Self {
        Self {
            now,
            weather: FeedValue::Absent,
            events: FeedValue::Absent,
        }
    }
}

/// The configured feeds, each behind its own bounded fetcher.
pub struct DataSources {
    timeout: Duration,
    weather: Option<BoundedFetcher<WeatherReport>>,
    events: Option<BoundedFetcher<Vec<CalendarEvent>>>,
}

impl DataSources {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            weather: None,
            events: None,
        }
    }

    /// File-backed feeds for whatever `[data]` names.
    pub fn from_config(config: &DataConfig, timeout: Duration) -> Self {
        let mut sources = Self::new(timeout);
        if let Some(path) = &config.weather_file {
            sources = sources.with_weather(FileFeed::new("weather", path));
        }
        if let Some(path) = &config.events_file {
            sources = sources.with_events(FileFeed::new("events", path));
        }
        sources
    }

    pub fn with_weather(mut self, feed: impl Feed<WeatherReport> + 'static) -> Self {
        self.weather = Some(BoundedFetcher::new(Arc::new(feed), self.timeout));
        self
    }

    pub fn with_events(mut self, feed: impl Feed<Vec<CalendarEvent>> + 'static) -> Self {
        self.events = Some(BoundedFetcher::new(Arc::new(feed), self.timeout));
        self
    }

    /// Fetch every feed, waiting at most the timeout for each.
    pub fn snapshot(&mut self, now: DateTime<FixedOffset>) -> DataSnapshot {
        DataSnapshot {
            now,
            weather: poll(self.weather.as_mut(), now),
            events: poll(self.events.as_mut(), now),
        }
    }
}

fn poll<T: Observed + Send + 'static>(
    fetcher: Option<&mut BoundedFetcher<T>>,
    now: DateTime<FixedOffset>,
) -> FeedValue<T> {
    let Some(fetcher) = fetcher else {
        return FeedValue::Absent;
    };
    match fetcher.fetch() {
        Ok(value) => {
            let as_of = value.observed_at().map_or(now, |at| at.min(now));
            FeedValue::Fresh { value, as_of }
        }
        Err(e) => {
            log::warn!("{} feed unavailable: {}", fetcher.name(), e);
            FeedValue::Unavailable(ClockError::DataUnavailable {
                source_name: fetcher.name().to_string(),
                reason: e.to_string(),
            })
        }
    }
}
