//! Text for each content source.

use std::fmt::Write;

use chrono::{DateTime, Datelike, Days, FixedOffset, Months, NaiveDate};

use crate::data::{CalendarEvent, WeatherReport};

/// One rendered line of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    /// Drawn in the accent ink regardless of the block's channel
    pub accent: bool,
}

impl Line {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            accent: false,
        }
    }

    pub fn accent(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            accent: true,
        }
    }
}

/// Format `time` without panicking on a bad pattern.
pub fn strftime(time: &DateTime<FixedOffset>, pattern: &str) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", time.format(pattern)).ok()?;
    Some(out)
}

pub fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// `"October 19th, 2026"`
pub fn long_date(time: &DateTime<FixedOffset>) -> String {
    format!(
        "{} {}{}, {}",
        time.format("%B"),
        time.day(),
        ordinal_suffix(time.day()),
        time.year()
    )
}

/// `"12.5°C Cloudy"`
pub fn weather_line(report: &WeatherReport) -> String {
    format!("{:.1}°C {}", report.temperature_c, report.condition)
}

/// Upcoming events, earliest first, at most `limit` of them.
///
/// All-day events stay listed for the whole of their day.
pub fn event_lines(
    events: &[CalendarEvent],
    now: &DateTime<FixedOffset>,
    limit: usize,
) -> Vec<String> {
    let today = now.date_naive();
    let mut upcoming: Vec<&CalendarEvent> = events
        .iter()
        .filter(|event| {
            let start = event.start.with_timezone(&now.timezone());
            if event.all_day {
                start.date_naive() >= today
            } else {
                start >= *now
            }
        })
        .collect();
    upcoming.sort_by_key(|event| event.start);

    let lines: Vec<String> = upcoming
        .into_iter()
        .take(limit)
        .map(|event| {
            let start = event.start.with_timezone(&now.timezone());
            if event.all_day {
                format!("{} {}", start.format("%a"), event.title)
            } else {
                format!("{} {}", start.format("%a %H:%M"), event.title)
            }
        })
        .collect();
    if lines.is_empty() && limit > 0 {
        return vec!["No upcoming events".to_string()];
    }
    lines
}

/// The four months around `today`: the previous one, the current one and
/// the two after it.
pub fn calendar_months(today: NaiveDate) -> Vec<NaiveDate> {
    let first = today.with_day(1).unwrap_or(today);
    let mut months = Vec::with_capacity(4);
    if let Some(previous) = first.checked_sub_months(Months::new(1)) {
        months.push(previous);
    }
    months.push(first);
    for ahead in 1..=2 {
        if let Some(next) = first.checked_add_months(Months::new(ahead)) {
            months.push(next);
        }
    }
    months
}

/// A month grid with ISO week numbers:
///
/// ```text
/// October 2026
/// Wk Mo Tu We Th Fr Sa Su
/// 40           1  2  3  4
/// 41  5  6  7  8  9 10 11
/// ```
///
/// The header is accented for the month containing `today`.
pub fn month_grid(first: NaiveDate, today: NaiveDate) -> Vec<Line> {
    let header = first.format("%B %Y").to_string();
    let current = first.year() == today.year() && first.month() == today.month();
    let mut lines = vec![if current {
        Line::accent(header)
    } else {
        Line::plain(header)
    }];
    lines.push(Line::plain("Wk Mo Tu We Th Fr Sa Su"));

    let Some(next_month) = first.checked_add_months(Months::new(1)) else {
        return lines;
    };
    let offset = u64::from(first.weekday().num_days_from_monday());
    let Some(mut week) = first.checked_sub_days(Days::new(offset)) else {
        return lines;
    };
    while week < next_month {
        let mut row = format!("{:>2}", week.iso_week().week());
        for day in week.iter_days().take(7) {
            if day.month() == first.month() && day.year() == first.year() {
                let _ = write!(row, " {:>2}", day.day());
            } else {
                row.push_str("   ");
            }
        }
        lines.push(Line::plain(row.trim_end().to_string()));
        match week.checked_add_days(Days::new(7)) {
            Some(next) => week = next,
            None => break,
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(text: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(text).unwrap()
    }

    #[test]
    fn ordinals() {
        let suffixes: Vec<&str> = [1, 2, 3, 4, 11, 12, 13, 21, 22, 23, 31]
            .into_iter()
            .map(ordinal_suffix)
            .collect();
        assert_eq!(
            suffixes,
            vec!["st", "nd", "rd", "th", "th", "th", "th", "st", "nd", "rd", "st"]
        );
    }

    #[test]
    fn long_date_reads_naturally() {
        assert_eq!(long_date(&at("2026-10-19T08:00:00+02:00")), "October 19th, 2026");
        assert_eq!(long_date(&at("2026-03-02T08:00:00+02:00")), "March 2nd, 2026");
    }

    #[test]
    fn weather_is_one_decimal() {
        let report = WeatherReport {
            temperature_c: 12.46,
            condition: "Cloudy".into(),
            observed_at: None,
        };
        assert_eq!(weather_line(&report), "12.5°C Cloudy");
    }

    #[test]
    fn only_upcoming_events_are_listed() {
        let now = at("2026-10-19T12:00:00+02:00");
        let events = vec![
            CalendarEvent {
                start: at("2026-10-19T09:00:00+02:00"),
                title: "Standup".into(),
                all_day: false,
            },
            CalendarEvent {
                start: at("2026-10-19T00:00:00+02:00"),
                title: "Birthday".into(),
                all_day: true,
            },
            CalendarEvent {
                start: at("2026-10-20T12:00:00+00:00"),
                title: "Dentist".into(),
                all_day: false,
            },
        ];
        assert_eq!(
            event_lines(&events, &now, 5),
            vec!["Mon Birthday".to_string(), "Tue 14:00 Dentist".to_string()]
        );
        assert_eq!(event_lines(&events, &now, 1), vec!["Mon Birthday".to_string()]);
        assert_eq!(event_lines(&[], &now, 3), vec!["No upcoming events".to_string()]);
    }

    #[test]
    fn four_months_around_today() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let months: Vec<String> = calendar_months(today)
            .iter()
            .map(|m| m.format("%Y-%m").to_string())
            .collect();
        assert_eq!(months, vec!["2025-12", "2026-01", "2026-02", "2026-03"]);
    }

    #[test]
    fn month_grid_has_week_numbers() {
        let first = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let lines = month_grid(first, today);
        assert_eq!(lines[0], Line::accent("October 2026"));
        assert_eq!(lines[1].text, "Wk Mo Tu We Th Fr Sa Su");
        assert_eq!(lines[2].text, "40           1  2  3  4");
        assert_eq!(lines[3].text, "41  5  6  7  8  9 10 11");
        assert_eq!(lines.last().unwrap().text, "44 26 27 28 29 30 31");
        assert_eq!(lines.len(), 2 + 5);

        let november = month_grid(NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(), today);
        assert!(!november[0].accent);
    }
}
