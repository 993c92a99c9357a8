use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{CalendarEvent, DataError, Feed, WeatherReport};

/// A feed backed by a TOML file that some other program keeps current.
///
/// Weather files hold the report fields at the top level:
///
/// ```toml
/// temperature_c = 12.5
/// condition = "Cloudy"
/// observed_at = "2026-10-19T11:50:00+02:00"
/// ```
///
/// Event files hold an `[[events]]` array of `start`, `title`, `all_day`.
#[derive(Debug, Clone)]
pub struct FileFeed {
    name: String,
    path: PathBuf,
}

#[derive(Deserialize)]
struct EventFile {
    #[serde(default)]
    events: Vec<CalendarEvent>,
}

impl FileFeed {
    pub fn new(name: &str, path: &Path) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
        }
    }

    fn read<D: DeserializeOwned>(&self) -> Result<D, DataError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| DataError::Read {
            path: self.path.clone(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| DataError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }
}

impl Feed<WeatherReport> for FileFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<WeatherReport, DataError> {
        self.read()
    }
}

impl Feed<Vec<CalendarEvent>> for FileFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<Vec<CalendarEvent>, DataError> {
        let mut events = self.read::<EventFile>()?.events;
        events.sort_by_key(|event| event.start);
        Ok(events)
    }
}
