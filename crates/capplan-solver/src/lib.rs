//! # capplan-solver
//!
//! Sequential auto-scheduler: places a machine's in-plan tasks back-to-back
//! through working time.
//!
//! # Algorithm
//!
//! 1. Sort the in-plan tasks by the chosen criterion (stable; ties keep
//!    their array position).
//! 2. Advance the cursor to the first working instant at or after the chosen
//!    start.
//! 3. For each task: reserve `remaining_hours` (falling back to
//!    `estimated_hours`, then 2h), start at the next working instant, end
//!    after consuming the reservation inside working windows, and move the
//!    cursor to that end.
//!
//! Task *n+1* therefore starts exactly where task *n* ends, modulo the jump
//! over non-working time. Without a calendar the placement degenerates to
//! naive back-to-back addition (7×24 operation).
//!
//! The two criteria treat `plan_order` asymmetrically, matching the planning
//! screen they serve: ordering by `plan_order` preserves the stored ranks,
//! while ordering by finish time rewrites them to the new 1-based rank.

use capplan_core::{
    datetime_to_millis, millis_to_datetime, CalendarError, MachineCalendar, Millis, Task, TaskKey,
};
use chrono::{Duration, NaiveDateTime};
use std::str::FromStr;
use thiserror::Error;

/// Errors during sequential scheduling
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The calendar search horizon ran out before working time was found.
    /// Tasks may have been partially re-timed when this is returned; callers
    /// that need all-or-nothing semantics schedule a copy and commit on
    /// success (the session layer does exactly that).
    #[error("cannot place '{task}': {source}")]
    CalendarExhausted {
        task: TaskKey,
        source: CalendarError,
    },
}

/// Ordering applied to the in-plan tasks before placement
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortCriterion {
    /// Ascending `plan_order`; stored ranks are preserved
    #[default]
    PlanOrder,
    /// Ascending `finish_time` (missing sorts last, treated as year 2099);
    /// `plan_order` is rewritten to the new 1-based rank
    FinishTime,
}

impl FromStr for SortCriterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" | "plan-order" | "plan_order" => Ok(Self::PlanOrder),
            "finish-time" | "finish_time" => Ok(Self::FinishTime),
            other => Err(format!(
                "unknown sort criterion '{other}' (expected 'order' or 'finish-time')"
            )),
        }
    }
}

/// Result of one scheduling run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    /// Keys of the tasks that received new timestamps, in placement order.
    /// Empty when there was nothing to schedule (not an error).
    pub placed: Vec<TaskKey>,
    /// Start of the first placement, when any
    pub window_start_ms: Option<Millis>,
    /// End of the last placement, when any
    pub window_end_ms: Option<Millis>,
}

impl ScheduleOutcome {
    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }
}

/// Sequential placement scheduler
pub struct SequentialScheduler;

impl SequentialScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Assign `[planned_start_ms, planned_end_ms)` to every in-plan task in
    /// `tasks`, sequentially from `start`.
    ///
    /// Out-of-plan tasks are never touched. With no calendar every instant is
    /// working time.
    pub fn schedule(
        &self,
        tasks: &mut [Task],
        start: NaiveDateTime,
        calendar: Option<&MachineCalendar>,
        criterion: SortCriterion,
    ) -> Result<ScheduleOutcome, ScheduleError> {
        let mut order: Vec<usize> = (0..tasks.len()).filter(|&i| tasks[i].in_plan).collect();
        if order.is_empty() {
            return Ok(ScheduleOutcome::default());
        }

        match criterion {
            SortCriterion::PlanOrder => {
                order.sort_by_key(|&i| tasks[i].plan_order.unwrap_or(0));
            }
            SortCriterion::FinishTime => {
                order.sort_by_key(|&i| tasks[i].finish_sort_key());
                for (rank, &i) in order.iter().enumerate() {
                    tasks[i].plan_order = Some(rank as u32 + 1);
                }
            }
        }

        let mut cursor = match calendar {
            Some(cal) => next_working(cal, start, &tasks[order[0]].key)?,
            None => start,
        };

        let mut outcome = ScheduleOutcome::default();

        for &i in &order {
            let duration_ms = tasks[i].scheduling_duration_ms();

            let (task_start, task_end) = match calendar {
                Some(cal) => {
                    let begin = next_working(cal, cursor, &tasks[i].key)?;
                    let end = cal
                        .advance_by_working_duration(begin, duration_ms)
                        .map_err(|source| ScheduleError::CalendarExhausted {
                            task: tasks[i].key.clone(),
                            source,
                        })?;
                    (begin, end)
                }
                None => (cursor, cursor + Duration::milliseconds(duration_ms)),
            };

            tasks[i].planned_start_ms = Some(datetime_to_millis(task_start));
            tasks[i].planned_end_ms = Some(datetime_to_millis(task_end));
            cursor = task_end;

            outcome.placed.push(tasks[i].key.clone());
            if outcome.window_start_ms.is_none() {
                outcome.window_start_ms = Some(datetime_to_millis(task_start));
            }
            outcome.window_end_ms = Some(datetime_to_millis(task_end));
        }

        Ok(outcome)
    }

    /// Convenience entry point over epoch-millisecond inputs
    pub fn schedule_from_millis(
        &self,
        tasks: &mut [Task],
        start_ms: Millis,
        calendar: Option<&MachineCalendar>,
        criterion: SortCriterion,
    ) -> Result<ScheduleOutcome, ScheduleError> {
        self.schedule(tasks, millis_to_datetime(start_ms), calendar, criterion)
    }
}

impl Default for SequentialScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn next_working(
    calendar: &MachineCalendar,
    from: NaiveDateTime,
    task: &str,
) -> Result<NaiveDateTime, ScheduleError> {
    calendar
        .next_working_instant(from)
        .map_err(|source| ScheduleError::CalendarExhausted {
            task: task.to_string(),
            source,
        })
}
