//! Working-hour bar segmentation.
//!
//! With a machine calendar on hand, a task bar is not drawn as one continuous
//! rectangle: it is split into the slices of the task interval that actually
//! fall inside working time, so closed nights, weekends and exception days
//! show as gaps.
//!
//! Granularity follows the view: per working window in the day view,
//! consecutive working days merged into one slice in the week and month
//! views, and per-month slices in the year view (which carries no
//! working-time shading at all).

use capplan_core::MachineCalendar;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::geometry::{days_in_month, Period, ViewRange};

/// One working-time slice of a task interval
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Split `[task_start, task_end]` into the working-time slices visible in the
/// view. An empty result means the task touches no working time there and its
/// bar is suppressed.
pub fn working_segments(
    task_start: NaiveDateTime,
    task_end: NaiveDateTime,
    period: Period,
    view: &ViewRange,
    calendar: &MachineCalendar,
) -> Vec<Segment> {
    match period {
        Period::Day => day_segments(task_start, task_end, view.start.date(), calendar),
        Period::Week => merged_day_segments(task_start, task_end, view.start.date(), 7, calendar),
        Period::Month => merged_day_segments(
            task_start,
            task_end,
            view.start.date(),
            days_in_month(view.start.date()),
            calendar,
        ),
        Period::Year => month_segments(task_start, task_end, view),
    }
}

/// Day view: one slice per working window intersecting the task
fn day_segments(
    task_start: NaiveDateTime,
    task_end: NaiveDateTime,
    day: NaiveDate,
    calendar: &MachineCalendar,
) -> Vec<Segment> {
    let day_begin = day.and_time(NaiveTime::MIN);
    let day_close = day_begin + Duration::days(1);
    if task_start >= day_close || task_end < day_begin {
        return Vec::new();
    }

    calendar
        .windows_for_date(day)
        .iter()
        .filter_map(|window| {
            let window_start = day_begin + Duration::minutes(i64::from(window.start.minutes()));
            let window_end = day_begin + Duration::minutes(window.end_minutes());
            clip(task_start, task_end, window_start, window_end)
        })
        .collect()
}

/// Week/month views: one slice per run of consecutive working days.
///
/// Each day contributes its first-window-start through last-window-end span
/// intersected with the task; adjacent days merge into a single slice,
/// closed days break the run.
fn merged_day_segments(
    task_start: NaiveDateTime,
    task_end: NaiveDateTime,
    view_first_day: NaiveDate,
    day_count: u32,
    calendar: &MachineCalendar,
) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut open: Option<(Segment, NaiveDate)> = None;

    for offset in 0..day_count {
        let day = view_first_day + Duration::days(i64::from(offset));
        let windows = calendar.windows_for_date(day);

        let slice = windows.first().and_then(|first| {
            let last = windows.last().unwrap_or(first);
            let day_begin = day.and_time(NaiveTime::MIN);
            let span_start = day_begin + Duration::minutes(i64::from(first.start.minutes()));
            let span_end = day_begin + Duration::minutes(last.end_minutes());
            clip(task_start, task_end, span_start, span_end)
        });

        match (slice, open.take()) {
            (Some(segment), Some((mut current, last_day))) => {
                if day == last_day + Duration::days(1) {
                    current.end = segment.end;
                    open = Some((current, day));
                } else {
                    segments.push(current);
                    open = Some((segment, day));
                }
            }
            (Some(segment), None) => open = Some((segment, day)),
            (None, Some((current, _))) => segments.push(current),
            (None, None) => {}
        }
    }

    if let Some((current, _)) = open {
        segments.push(current);
    }
    segments
}

/// Year view: one slice per calendar month the task touches inside the view;
/// a task inside a single month keeps its own bounds
fn month_segments(
    task_start: NaiveDateTime,
    task_end: NaiveDateTime,
    view: &ViewRange,
) -> Vec<Segment> {
    if task_start.year() == task_end.year() && task_start.month() == task_end.month() {
        return vec![Segment {
            start: task_start,
            end: task_end,
        }];
    }

    let from = task_start.max(view.start);
    let until = task_end.min(view.end);

    let mut segments = Vec::new();
    let mut month_first = from.date().with_day(1).unwrap_or(from.date());
    while month_first.and_time(NaiveTime::MIN) <= until {
        let month_close = month_first + Duration::days(i64::from(days_in_month(month_first)));

        if let Some(segment) = clip(
            task_start,
            task_end,
            month_first.and_time(NaiveTime::MIN),
            month_close.and_time(NaiveTime::MIN),
        ) {
            segments.push(segment);
        }
        month_first = month_close;
    }
    segments
}

fn clip(
    task_start: NaiveDateTime,
    task_end: NaiveDateTime,
    window_start: NaiveDateTime,
    window_end: NaiveDateTime,
) -> Option<Segment> {
    let start = task_start.max(window_start);
    let end = task_end.min(window_end);
    (start < end).then_some(Segment { start, end })
}
