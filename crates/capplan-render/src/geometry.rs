//! Timeline geometry.
//!
//! Pure layout math mapping `(period, anchor date)` to pixel positions: view
//! bounds, cell widths, header cells, task-bar rectangles and the now
//! indicator. No state, no side effects; the grid renderer and any host UI
//! consume these numbers as-is.

use capplan_core::{datetime_to_millis, millis_to_datetime, Millis};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Rendering errors
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("unknown period '{0}' (expected day, week, month or year)")]
    UnknownPeriod(String),
}

/// Zoom level of the timeline
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(RenderError::UnknownPeriod(other.to_string())),
        }
    }
}

/// The instant range a view displays; recomputed on every navigation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ViewRange {
    pub fn start_ms(&self) -> Millis {
        datetime_to_millis(self.start)
    }

    pub fn end_ms(&self) -> Millis {
        datetime_to_millis(self.end)
    }

    /// Any-overlap test, inclusive at both boundaries
    pub fn overlaps(&self, start_ms: Millis, end_ms: Millis) -> bool {
        start_ms <= self.end_ms() && end_ms >= self.start_ms()
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.start && at <= self.end
    }
}

/// View bounds for a period anchored at a date.
///
/// Day: midnight to midnight. Week: ISO Monday 00:00 through Sunday
/// 23:59:59.999. Month: first through last calendar day. Year: Jan 1 through
/// Dec 31.
pub fn view_range(period: Period, anchor: NaiveDate) -> ViewRange {
    let (first, last) = match period {
        Period::Day => (anchor, anchor),
        Period::Week => {
            let monday = anchor - Duration::days(i64::from(anchor.weekday().num_days_from_monday()));
            (monday, monday + Duration::days(6))
        }
        Period::Month => {
            let first = anchor.with_day(1).unwrap_or(anchor);
            (first, first + Duration::days(i64::from(days_in_month(anchor)) - 1))
        }
        Period::Year => (
            NaiveDate::from_ymd_opt(anchor.year(), 1, 1).unwrap_or(anchor),
            NaiveDate::from_ymd_opt(anchor.year(), 12, 31).unwrap_or(anchor),
        ),
    };
    ViewRange {
        start: first.and_time(NaiveTime::MIN),
        end: last.and_time(end_of_day()),
    }
}

/// Pixel width of one timeline unit (hour/day/day/month).
///
/// The day view divides by 25, one unit more than the 24 shown hours, to
/// leave a trailing partial column; the month view scrolls at a fixed 50px.
pub fn cell_width(period: Period, container_px: f64) -> f64 {
    match period {
        Period::Day => (container_px / 25.0).max(20.0),
        Period::Week => (container_px / 7.0).max(60.0),
        Period::Month => 50.0,
        Period::Year => (container_px / 12.0).max(80.0),
    }
}

/// Number of header units the view renders
pub fn unit_count(period: Period, anchor: NaiveDate) -> u32 {
    match period {
        Period::Day => 25,
        Period::Week => 7,
        Period::Month => days_in_month(anchor),
        Period::Year => 12,
    }
}

/// Total scrollable timeline width
pub fn timeline_width(period: Period, anchor: NaiveDate, cell_width_px: f64) -> f64 {
    f64::from(unit_count(period, anchor)) * cell_width_px
}

/// One header cell: primary label, secondary label, pixel width
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeaderCell {
    pub primary: String,
    pub secondary: String,
    pub width_px: f64,
}

/// Header cells for the view: hours (day), weekdays (week), month days
/// (month) or months (year)
pub fn header_cells(period: Period, anchor: NaiveDate, cell_width_px: f64) -> Vec<HeaderCell> {
    let range = view_range(period, anchor);
    let count = unit_count(period, anchor);

    (0..count)
        .map(|i| {
            let (primary, secondary) = match period {
                Period::Day => {
                    let hour = i % 24;
                    let secondary = if i == 0 {
                        range.start.format("%-d/%-m").to_string()
                    } else if hour < 12 {
                        "AM".to_string()
                    } else {
                        "PM".to_string()
                    };
                    (format!("{hour:02}"), secondary)
                }
                Period::Week => {
                    let date = range.start.date() + Duration::days(i64::from(i));
                    (date.format("%a").to_string(), date.day().to_string())
                }
                Period::Month => {
                    let date = range.start.date() + Duration::days(i64::from(i));
                    (date.day().to_string(), date.format("%b").to_string())
                }
                Period::Year => {
                    let month = NaiveDate::from_ymd_opt(anchor.year(), i + 1, 1)
                        .unwrap_or_else(|| range.start.date());
                    (month.format("%b").to_string(), month.format("%Y").to_string())
                }
            };
            HeaderCell {
                primary,
                secondary,
                width_px: cell_width_px,
            }
        })
        .collect()
}

/// A positioned task bar
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BarGeometry {
    pub left_px: f64,
    pub width_px: f64,
}

/// Minimum rendered bar width
const MIN_BAR_PX: f64 = 20.0;

/// Pixel rectangle for a `[start, end)` interval in the view.
///
/// `None` when the interval misses the view entirely (inclusive boundaries).
/// Day/week/month position by hour/day offset from the view start; the year
/// view positions by start/end month index only, day-of-month ignored.
pub fn bar_geometry(
    start_ms: Millis,
    end_ms: Millis,
    view: &ViewRange,
    period: Period,
    cell_width_px: f64,
) -> Option<BarGeometry> {
    if !view.overlaps(start_ms, end_ms) {
        return None;
    }

    let geometry = match period {
        Period::Day => {
            let offset_hours = (start_ms - view.start_ms()) as f64 / 3_600_000.0;
            let duration_hours = (end_ms - start_ms) as f64 / 3_600_000.0;
            BarGeometry {
                left_px: (offset_hours * cell_width_px).max(0.0),
                width_px: (duration_hours * cell_width_px).max(MIN_BAR_PX),
            }
        }
        Period::Week | Period::Month => {
            let offset_days = (start_ms - view.start_ms()) as f64 / 86_400_000.0;
            let duration_days = (end_ms - start_ms) as f64 / 86_400_000.0;
            BarGeometry {
                left_px: (offset_days * cell_width_px).max(0.0),
                width_px: (duration_days * cell_width_px).max(MIN_BAR_PX),
            }
        }
        Period::Year => {
            let start_month = f64::from(millis_to_datetime(start_ms).month0());
            let end_month = f64::from(millis_to_datetime(end_ms).month0());
            BarGeometry {
                left_px: (start_month * cell_width_px).max(0.0),
                width_px: ((end_month - start_month + 1.0) * cell_width_px).max(MIN_BAR_PX),
            }
        }
    };

    Some(geometry)
}

/// X position of the now indicator; day and week views only, `None` when
/// `now` falls outside the view
pub fn now_indicator_x(
    now: NaiveDateTime,
    view: &ViewRange,
    period: Period,
    cell_width_px: f64,
) -> Option<f64> {
    if !view.contains(now) {
        return None;
    }
    match period {
        Period::Day => {
            let hours = (now - view.start).num_milliseconds() as f64 / 3_600_000.0;
            Some(hours * cell_width_px)
        }
        Period::Week => {
            let days = (now - view.start).num_milliseconds() as f64 / 86_400_000.0;
            Some(days * cell_width_px)
        }
        Period::Month | Period::Year => None,
    }
}

/// The caption shown beside the navigation buttons
pub fn period_label(period: Period, anchor: NaiveDate) -> String {
    match period {
        Period::Day => anchor.format("%a %-d %b").to_string(),
        Period::Week => {
            let range = view_range(Period::Week, anchor);
            format!(
                "{}-{} {}",
                range.start.day(),
                range.end.day(),
                anchor.format("%b")
            )
        }
        Period::Month => anchor.format("%B %Y").to_string(),
        Period::Year => anchor.format("%Y").to_string(),
    }
}

/// Days in the anchor's calendar month
pub fn days_in_month(anchor: NaiveDate) -> u32 {
    let first = anchor.with_day(1).unwrap_or(anchor);
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    next.map_or(31, |n| (n - first).num_days() as u32)
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
}
