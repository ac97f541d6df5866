//! # capplan-core
//!
//! Core domain model and working-calendar arithmetic for the capplan
//! capacity-planning engine.
//!
//! This crate provides:
//! - Domain types: `Task`, `MachineCalendar`, `TaskPatch`, `PlanUpdate`
//! - Working-time queries: membership, next working instant, duration
//!   consumption across working windows
//! - Error types shared by the solver and session crates
//!
//! ## Example
//!
//! ```rust
//! use capplan_core::Task;
//!
//! let task = Task::new("TI-1042")
//!     .name("Mill housing blanks")
//!     .remaining(6.5)
//!     .in_plan(1);
//! assert_eq!(task.scheduling_hours(), 6.5);
//! ```

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub mod calendar;

pub use calendar::{
    CalendarError, ClockTime, MachineCalendar, WeekTemplate, WorkException, WorkingWindow,
    SEARCH_HORIZON_DAYS,
};

// ============================================================================
// Type Aliases & Constants
// ============================================================================

/// Unique identifier for a planning task
pub type TaskKey = String;

/// Epoch timestamp in milliseconds, in the deployment's single display zone
pub type Millis = i64;

/// One hour in milliseconds
pub const HOUR_MS: Millis = 3_600_000;

/// Scheduling duration applied when a task carries neither a remaining nor an
/// estimated hour figure
pub const DEFAULT_REMAINING_HOURS: f64 = 2.0;

/// Sort key for tasks without a finish time: 2099-12-31T00:00
pub const FINISH_TIME_FALLBACK_MS: Millis = 4_102_358_400_000;

/// Convert an epoch-millisecond timestamp to a naive datetime.
///
/// Timestamps and calendar windows share one configured zone, so no offset
/// arithmetic happens here or anywhere else in the engine.
pub fn millis_to_datetime(ms: Millis) -> NaiveDateTime {
    NaiveDateTime::UNIX_EPOCH + Duration::milliseconds(ms)
}

/// Convert a naive datetime back to epoch milliseconds.
pub fn datetime_to_millis(at: NaiveDateTime) -> Millis {
    (at - NaiveDateTime::UNIX_EPOCH).num_milliseconds()
}

// ============================================================================
// Task
// ============================================================================

/// A planning unit for one machine.
///
/// Field names match the backend wire contract exactly; only the scheduling
/// fields (`in_plan`, `plan_order`, `planned_start_ms`, `planned_end_ms`,
/// `plan_locked`) are ever mutated by planning operations.
///
/// Invariant: when `in_plan` is false, `plan_order` and both planned
/// timestamps are `None` and `plan_locked` is false.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, stable across sessions
    pub key: TaskKey,
    /// Display label
    #[serde(default)]
    pub name: String,
    /// Optional reference to the parent job order
    #[serde(default)]
    pub job_no: Option<String>,
    /// Owning machine, when the backend scopes the task to one
    #[serde(default)]
    pub machine_fk: Option<i64>,
    /// Estimated effort in hours
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    /// Remaining effort in hours; falls back to `estimated_hours`
    #[serde(default)]
    pub remaining_hours: Option<f64>,
    /// Requested finish instant, used by the finish-time sort criterion
    #[serde(default)]
    pub finish_time: Option<Millis>,
    /// Only in-plan tasks are scheduled and rendered
    #[serde(default)]
    pub in_plan: bool,
    /// Dense 1-based rank among the machine's in-plan tasks
    #[serde(default)]
    pub plan_order: Option<u32>,
    /// Scheduled start, epoch milliseconds
    #[serde(default)]
    pub planned_start_ms: Option<Millis>,
    /// Scheduled end (exclusive), epoch milliseconds
    #[serde(default)]
    pub planned_end_ms: Option<Millis>,
    /// Display hint only: locked tasks still participate in geometry and
    /// scheduling
    #[serde(default)]
    pub plan_locked: bool,
    /// Completion percentage for bar fills and tooltips; never consulted by
    /// the scheduler
    #[serde(default)]
    pub progress_percent: Option<u8>,
}

impl Task {
    /// Create a new task with the given key
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            job_no: None,
            machine_fk: None,
            estimated_hours: None,
            remaining_hours: None,
            finish_time: None,
            in_plan: false,
            plan_order: None,
            planned_start_ms: None,
            planned_end_ms: None,
            plan_locked: false,
            progress_percent: None,
        }
    }

    /// Set the display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the parent job-order reference
    pub fn job_no(mut self, job_no: impl Into<String>) -> Self {
        self.job_no = Some(job_no.into());
        self
    }

    /// Set the estimated hours
    pub fn estimated(mut self, hours: f64) -> Self {
        self.estimated_hours = Some(hours);
        self
    }

    /// Set the remaining hours
    pub fn remaining(mut self, hours: f64) -> Self {
        self.remaining_hours = Some(hours);
        self
    }

    /// Set the requested finish instant
    pub fn finish_time(mut self, at: Millis) -> Self {
        self.finish_time = Some(at);
        self
    }

    /// Put the task in the plan at the given order
    pub fn in_plan(mut self, order: u32) -> Self {
        self.in_plan = true;
        self.plan_order = Some(order);
        self
    }

    /// Set both planned timestamps
    pub fn planned(mut self, start_ms: Millis, end_ms: Millis) -> Self {
        self.planned_start_ms = Some(start_ms);
        self.planned_end_ms = Some(end_ms);
        self
    }

    /// Mark the plan entry as locked
    pub fn locked(mut self) -> Self {
        self.plan_locked = true;
        self
    }

    /// Hours the scheduler should reserve for this task:
    /// `remaining_hours`, else `estimated_hours`, else 2h.
    pub fn scheduling_hours(&self) -> f64 {
        self.remaining_hours
            .or(self.estimated_hours)
            .unwrap_or(DEFAULT_REMAINING_HOURS)
    }

    /// Scheduling duration in milliseconds
    pub fn scheduling_duration_ms(&self) -> Millis {
        (self.scheduling_hours() * HOUR_MS as f64).round() as Millis
    }

    /// Whether both planned timestamps are present
    pub fn has_schedule(&self) -> bool {
        self.planned_start_ms.is_some() && self.planned_end_ms.is_some()
    }

    /// Finish-time sort key; tasks without one sort last (year 2099)
    pub fn finish_sort_key(&self) -> Millis {
        self.finish_time.unwrap_or(FINISH_TIME_FALLBACK_MS)
    }

    /// Remove the task from the plan, clearing every scheduling field
    pub fn clear_plan(&mut self) {
        self.in_plan = false;
        self.plan_order = None;
        self.planned_start_ms = None;
        self.planned_end_ms = None;
        self.plan_locked = false;
    }
}

// ============================================================================
// Save Payloads
// ============================================================================

/// One entry of the save payload.
///
/// Either a full scheduling payload (`in_plan: true` plus whatever scheduling
/// fields are set) or the minimal removal `{key, in_plan: false}`; absent
/// fields are omitted from the JSON entirely.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub key: TaskKey,
    pub in_plan: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_fk: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_start_ms: Option<Millis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_end_ms: Option<Millis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_locked: Option<bool>,
}

impl TaskPatch {
    /// The minimal removal payload: `{key, in_plan: false}`
    pub fn removal(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            in_plan: false,
            machine_fk: None,
            name: None,
            planned_start_ms: None,
            planned_end_ms: None,
            plan_order: None,
            plan_locked: None,
        }
    }

    /// The full scheduling payload for an in-plan task
    pub fn from_task(task: &Task) -> Self {
        Self {
            key: task.key.clone(),
            in_plan: true,
            machine_fk: task.machine_fk,
            name: if task.name.is_empty() {
                None
            } else {
                Some(task.name.clone())
            },
            planned_start_ms: task.planned_start_ms,
            planned_end_ms: task.planned_end_ms,
            plan_order: task.plan_order,
            plan_locked: Some(task.plan_locked),
        }
    }
}

/// The save-plan request body: `{"items": [...]}`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanUpdate {
    pub items: Vec<TaskPatch>,
}

impl PlanUpdate {
    pub fn new(items: Vec<TaskPatch>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scheduling_hours_fallback_chain() {
        let both = Task::new("a").estimated(5.0).remaining(3.0);
        assert_eq!(both.scheduling_hours(), 3.0);

        let estimated_only = Task::new("b").estimated(5.0);
        assert_eq!(estimated_only.scheduling_hours(), 5.0);

        let neither = Task::new("c");
        assert_eq!(neither.scheduling_hours(), DEFAULT_REMAINING_HOURS);
    }

    #[test]
    fn scheduling_duration_in_millis() {
        let task = Task::new("a").remaining(2.5);
        assert_eq!(task.scheduling_duration_ms(), 2 * HOUR_MS + HOUR_MS / 2);
    }

    #[test]
    fn clear_plan_resets_every_scheduling_field() {
        let mut task = Task::new("a")
            .in_plan(3)
            .planned(1_000, 2_000)
            .locked();
        task.clear_plan();

        assert!(!task.in_plan);
        assert_eq!(task.plan_order, None);
        assert_eq!(task.planned_start_ms, None);
        assert_eq!(task.planned_end_ms, None);
        assert!(!task.plan_locked);
    }

    #[test]
    fn finish_sort_key_missing_sorts_last() {
        let with = Task::new("a").finish_time(1_700_000_000_000);
        let without = Task::new("b");
        assert!(with.finish_sort_key() < without.finish_sort_key());
        assert_eq!(without.finish_sort_key(), FINISH_TIME_FALLBACK_MS);
    }

    #[test]
    fn millis_roundtrip() {
        let ms: Millis = 1_771_200_000_000;
        assert_eq!(datetime_to_millis(millis_to_datetime(ms)), ms);
    }

    #[test]
    fn removal_patch_serializes_minimal() {
        let patch = TaskPatch::removal("TI-7");
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"key": "TI-7", "in_plan": false}));
    }

    #[test]
    fn full_patch_carries_scheduling_fields() {
        let task = Task::new("TI-9")
            .name("Deburr")
            .in_plan(2)
            .planned(10, 20)
            .locked();
        let patch = TaskPatch::from_task(&task);

        assert!(patch.in_plan);
        assert_eq!(patch.plan_order, Some(2));
        assert_eq!(patch.planned_start_ms, Some(10));
        assert_eq!(patch.planned_end_ms, Some(20));
        assert_eq!(patch.plan_locked, Some(true));
    }

    #[test]
    fn task_deserializes_from_sparse_payload() {
        let task: Task = serde_json::from_str(r#"{"key": "TI-1", "in_plan": false}"#).unwrap();
        assert_eq!(task.key, "TI-1");
        assert!(!task.in_plan);
        assert_eq!(task.plan_order, None);
        assert_eq!(task.estimated_hours, None);
    }
}
