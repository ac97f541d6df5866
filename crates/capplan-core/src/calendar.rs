//! Machine working calendars.
//!
//! A calendar is a recurring week template (0 = Monday … 6 = Sunday, each day
//! an ordered list of working windows) plus date-specific exceptions that
//! replace the template for a single calendar date. An exception with no
//! windows closes the date entirely.
//!
//! Three queries drive the scheduler:
//! - [`MachineCalendar::is_working`]: working-time membership for an instant
//! - [`MachineCalendar::next_working_instant`]: advance an instant into
//!   working time
//! - [`MachineCalendar::advance_by_working_duration`]: consume a duration
//!   strictly inside working windows, crossing days as needed
//!
//! The forward searches are bounded at [`SEARCH_HORIZON_DAYS`] iterations and
//! report exhaustion as [`CalendarError::HorizonExhausted`] so callers can
//! reject the operation instead of silently scheduling into closed time.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound on day-by-day forward searches
pub const SEARCH_HORIZON_DAYS: u32 = 365;

/// Calendar query errors
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("invalid clock time '{0}': expected HH:MM")]
    InvalidTime(String),

    #[error("no working time found within {days} days of the calendar horizon")]
    HorizonExhausted { days: u32 },
}

// ============================================================================
// ClockTime
// ============================================================================

/// A wall-clock time of day, serialized as `"HH:MM"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    /// Build from hour/minute components; `None` outside 00:00–23:59
    pub fn new(hour: u16, minute: u16) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self {
            minutes: hour * 60 + minute,
        })
    }

    /// Minutes since midnight
    pub fn minutes(self) -> u16 {
        self.minutes
    }

    pub fn hour(self) -> u16 {
        self.minutes / 60
    }

    pub fn minute(self) -> u16 {
        self.minutes % 60
    }

    /// The clock time of an instant, truncated to whole minutes (the
    /// calendar contract carries no finer resolution)
    pub fn of(at: NaiveDateTime) -> Self {
        Self {
            minutes: (at.time().hour() * 60 + at.time().minute()) as u16,
        }
    }

    fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_num_seconds_from_midnight_opt(u32::from(self.minutes) * 60, 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CalendarError::InvalidTime(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        let hour: u16 = h.parse().map_err(|_| invalid())?;
        let minute: u16 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            D::Error::custom(format!("invalid clock time '{s}': expected HH:MM"))
        })
    }
}

// ============================================================================
// Windows, Templates, Exceptions
// ============================================================================

/// One contiguous working interval within a day.
///
/// `end_next_day` marks an overnight shift: the end time belongs to the
/// following calendar date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingWindow {
    pub start: ClockTime,
    pub end: ClockTime,
    #[serde(default)]
    pub end_next_day: bool,
}

impl WorkingWindow {
    /// Parse a same-day window from `"HH:MM"` bounds
    pub fn new(start: &str, end: &str) -> Result<Self, CalendarError> {
        Ok(Self {
            start: start.parse()?,
            end: end.parse()?,
            end_next_day: false,
        })
    }

    /// Parse an overnight window whose end falls on the following day
    pub fn overnight(start: &str, end: &str) -> Result<Self, CalendarError> {
        Ok(Self {
            end_next_day: true,
            ..Self::new(start, end)?
        })
    }

    /// Working-time membership for a clock time. Window ends are inclusive
    /// here (a shift ending 17:00 still counts 17:00 as staffed); overnight
    /// windows wrap across midnight.
    pub fn contains(&self, at: ClockTime) -> bool {
        if self.end_next_day {
            at >= self.start || at <= self.end
        } else {
            at >= self.start && at <= self.end
        }
    }

    /// Window end in minutes from the owning day's midnight; exceeds 24h for
    /// overnight windows
    pub fn end_minutes(&self) -> i64 {
        let end = i64::from(self.end.minutes());
        if self.end_next_day {
            end + 24 * 60
        } else {
            end
        }
    }
}

/// The recurring weekly schedule: weekday index (0 = Monday … 6 = Sunday) to
/// ordered windows. A missing or empty entry closes the day.
///
/// The wire format is a JSON object with string keys `"0"`…`"6"`, as the
/// backend sends it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekTemplate(pub BTreeMap<u8, Vec<WorkingWindow>>);

impl WeekTemplate {
    /// Set the windows of one weekday (0 = Monday … 6 = Sunday)
    pub fn with_day(mut self, weekday: u8, windows: Vec<WorkingWindow>) -> Self {
        self.0.insert(weekday, windows);
        self
    }

    /// Windows of one weekday; empty when the day is closed
    pub fn windows_for(&self, weekday: u8) -> &[WorkingWindow] {
        self.0.get(&weekday).map_or(&[], Vec::as_slice)
    }
}

/// A date-specific override of the week template. Empty `windows` closes the
/// date regardless of the template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkException {
    pub date: NaiveDate,
    pub windows: Vec<WorkingWindow>,
}

impl WorkException {
    pub fn closed(date: NaiveDate) -> Self {
        Self {
            date,
            windows: Vec::new(),
        }
    }

    pub fn open(date: NaiveDate, windows: Vec<WorkingWindow>) -> Self {
        Self { date, windows }
    }
}

// ============================================================================
// MachineCalendar
// ============================================================================

/// A machine's working-time definition.
///
/// `timezone` names the single IANA zone every timestamp and window time in
/// the deployment is expressed in. It is configuration, not a conversion
/// input: the engine performs no offset arithmetic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineCalendar {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub week_template: WeekTemplate,
    #[serde(default)]
    pub work_exceptions: Vec<WorkException>,
}

fn default_timezone() -> String {
    "Europe/Istanbul".into()
}

impl Default for MachineCalendar {
    fn default() -> Self {
        Self::new(default_timezone())
    }
}

impl MachineCalendar {
    /// Create an empty calendar (every day closed) for the given zone
    pub fn new(timezone: impl Into<String>) -> Self {
        Self {
            timezone: timezone.into(),
            week_template: WeekTemplate::default(),
            work_exceptions: Vec::new(),
        }
    }

    /// Set one weekday's windows (builder)
    pub fn weekday(mut self, weekday: u8, windows: Vec<WorkingWindow>) -> Self {
        self.week_template.0.insert(weekday, windows);
        self
    }

    /// Add a date exception (builder)
    pub fn exception(mut self, exception: WorkException) -> Self {
        self.work_exceptions.push(exception);
        self
    }

    /// The windows governing one calendar date: the date's exception when one
    /// exists, else the week template for its weekday.
    pub fn windows_for_date(&self, date: NaiveDate) -> &[WorkingWindow] {
        if let Some(exception) = self.work_exceptions.iter().find(|ex| ex.date == date) {
            return &exception.windows;
        }
        self.week_template
            .windows_for(date.weekday().num_days_from_monday() as u8)
    }

    /// Working-time membership for an instant
    pub fn is_working(&self, at: NaiveDateTime) -> bool {
        let clock = ClockTime::of(at);
        self.windows_for_date(at.date())
            .iter()
            .any(|w| w.contains(clock))
    }

    /// Advance an instant to working time.
    ///
    /// Identity when the instant is already working; otherwise the next
    /// window start later the same day, else the first window start of the
    /// next day with a non-empty schedule. Exception windows take priority
    /// over the template for their date.
    pub fn next_working_instant(
        &self,
        from: NaiveDateTime,
    ) -> Result<NaiveDateTime, CalendarError> {
        let mut current = from;

        for _ in 0..SEARCH_HORIZON_DAYS {
            let windows = self.windows_for_date(current.date());
            if !windows.is_empty() {
                let clock = ClockTime::of(current);
                if windows.iter().any(|w| w.contains(clock)) {
                    return Ok(current);
                }
                if let Some(next) = windows.iter().find(|w| w.start > clock) {
                    return Ok(current.date().and_time(next.start.to_naive_time()));
                }
            }
            current = day_start(current.date() + Duration::days(1));
        }

        Err(CalendarError::HorizonExhausted {
            days: SEARCH_HORIZON_DAYS,
        })
    }

    /// Consume `duration_ms` of wall-clock time strictly within working
    /// windows, returning the instant at which the duration is exhausted.
    ///
    /// Inside a window, time is consumed up to the window end (exclusive for
    /// consumption; overnight windows extend into the following day).
    /// Outside any window the cursor advances to the next window start (or
    /// the next day) without consuming.
    pub fn advance_by_working_duration(
        &self,
        start: NaiveDateTime,
        duration_ms: i64,
    ) -> Result<NaiveDateTime, CalendarError> {
        let mut current = start;
        let mut remaining = duration_ms;

        if remaining <= 0 {
            return Ok(current);
        }

        for _ in 0..SEARCH_HORIZON_DAYS {
            let day = current.date();
            let windows = self.windows_for_date(day);
            if windows.is_empty() {
                current = day_start(day + Duration::days(1));
                continue;
            }

            let clock_min = i64::from(ClockTime::of(current).minutes());

            if let Some(window) = windows
                .iter()
                .find(|w| clock_min >= i64::from(w.start.minutes()) && clock_min < w.end_minutes())
            {
                let available_ms = (window.end_minutes() - clock_min) * 60_000;
                if available_ms >= remaining {
                    return Ok(current + Duration::milliseconds(remaining));
                }
                remaining -= available_ms;
                // Land exactly on the window end; the next iteration hops to
                // the following window or day.
                current = day_start(day) + Duration::minutes(window.end_minutes());
            } else if let Some(next) = windows
                .iter()
                .find(|w| i64::from(w.start.minutes()) > clock_min)
            {
                current = day.and_time(next.start.to_naive_time());
            } else {
                current = day_start(day + Duration::days(1));
            }
        }

        Err(CalendarError::HorizonExhausted {
            days: SEARCH_HORIZON_DAYS,
        })
    }
}

fn day_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

// ============================================================================
// Tests
// ============================================================================
