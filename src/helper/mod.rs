use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;

/// Measures how long a pipeline step runs.
pub struct Stopwatch {
    start_time: Instant,
}

impl Stopwatch {
    pub fn start() -> Stopwatch {
        Stopwatch {
            start_time: Instant::now(),
        }
    }

    pub fn get_runtime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn get_formatted_runtime(&self) -> String {
        Self::get_formatted_duration(self.get_runtime())
    }

    pub fn get_formatted_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Replaces `{date:year}`, `{date:month}`, `{date:day}` and `{date:weekday}` in `name`.
pub fn expand_date_placeholders(name: &str, now: DateTime<Utc>) -> String {
    lazy_static! {
        static ref REGEX_DATE_YEAR: Regex = Regex::new(r"\{date:year\}").unwrap();
        static ref REGEX_DATE_MONTH: Regex = Regex::new(r"\{date:month\}").unwrap();
        static ref REGEX_DATE_DAY: Regex = Regex::new(r"\{date:day\}").unwrap();
        static ref REGEX_DATE_WEEKDAY: Regex = Regex::new(r"\{date:weekday\}").unwrap();
    }

    let year = format!("{:04}", now.year());
    let month = format!("{:02}", now.month());
    let day = format!("{:02}", now.day());
    let weekday = now.weekday().to_string();

    let name = REGEX_DATE_YEAR.replace_all(name, year.as_str());
    let name = REGEX_DATE_MONTH.replace_all(&name, month.as_str());
    let name = REGEX_DATE_DAY.replace_all(&name, day.as_str());
    let name = REGEX_DATE_WEEKDAY.replace_all(&name, weekday.as_str());

    name.into_owned()
}
