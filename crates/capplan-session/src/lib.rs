//! # capplan-session
//!
//! Per-machine planning state and change tracking.
//!
//! A [`PlanningSession`] owns one machine's task list, the baseline snapshot
//! captured at load time (and after each successful save), and the machine
//! calendar. Every planning operation (add/remove from plan, drag-reorder,
//! inline edits, autoschedule) mutates the session in memory; nothing
//! reaches the backend until the host submits the minimal change set
//! computed by diffing tasks against the baseline.
//!
//! [`SessionController`](controller::SessionController) layers machine
//! selection on top: a busy guard against re-entrant switches and a
//! monotonically increasing selection generation that rejects stale load
//! responses.

use capplan_core::{MachineCalendar, Millis, PlanUpdate, Task, TaskKey, TaskPatch};
use capplan_solver::{ScheduleError, ScheduleOutcome, SequentialScheduler, SortCriterion};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use thiserror::Error;

pub mod controller;

pub use controller::{BackendError, PlanningBackend, SelectionToken, SessionController};

/// Session and selection errors
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("unknown task '{0}'")]
    UnknownTask(TaskKey),

    #[error("machine {0} is already selected")]
    AlreadySelected(i64),

    #[error("a machine selection is already in progress")]
    Busy,

    #[error("selection superseded by a newer machine switch")]
    Stale,

    #[error("no machine selected")]
    NoMachineSelected,

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("backend request failed: {0}")]
    Backend(String),
}

/// Where a dragged row lands relative to its drop target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
}

/// One machine's in-memory planning state
#[derive(Clone, Debug)]
pub struct PlanningSession {
    machine_id: i64,
    tasks: Vec<Task>,
    baseline: Vec<Task>,
    calendar: Option<MachineCalendar>,
    changed: BTreeSet<TaskKey>,
}

impl PlanningSession {
    /// Start a session from freshly loaded state; the baseline snapshot is
    /// captured here
    pub fn new(machine_id: i64, tasks: Vec<Task>, calendar: Option<MachineCalendar>) -> Self {
        Self {
            machine_id,
            baseline: tasks.clone(),
            tasks,
            calendar,
            changed: BTreeSet::new(),
        }
    }

    pub fn machine_id(&self) -> i64 {
        self.machine_id
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn calendar(&self) -> Option<&MachineCalendar> {
        self.calendar.as_ref()
    }

    /// In-plan tasks sorted by `plan_order` (missing treated as 0)
    pub fn planned_tasks(&self) -> Vec<&Task> {
        let mut planned: Vec<&Task> = self.tasks.iter().filter(|t| t.in_plan).collect();
        planned.sort_by_key(|t| t.plan_order.unwrap_or(0));
        planned
    }

    pub fn unplanned_tasks(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| !t.in_plan).collect()
    }

    pub fn task(&self, key: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.key == key)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn is_changed(&self, key: &str) -> bool {
        self.changed.contains(key)
    }

    // ========================================================================
    // Planning operations
    // ========================================================================

    /// Append a task to the plan at the next free order. Timestamps stay
    /// empty until the task is scheduled or edited.
    pub fn add_to_plan(&mut self, key: &str) -> Result<(), SessionError> {
        let next_order = self
            .tasks
            .iter()
            .filter(|t| t.in_plan)
            .filter_map(|t| t.plan_order)
            .max()
            .unwrap_or(0)
            + 1;

        let task = self.task_mut(key)?;
        task.in_plan = true;
        task.plan_order = Some(next_order);
        task.plan_locked = false;
        task.planned_start_ms = None;
        task.planned_end_ms = None;

        self.mark_changed(key);
        Ok(())
    }

    /// Take a task out of the plan, clearing every scheduling field
    pub fn remove_from_plan(&mut self, key: &str) -> Result<(), SessionError> {
        self.task_mut(key)?.clear_plan();
        self.mark_changed(key);
        Ok(())
    }

    /// Move a dragged task next to a target task and renumber the whole plan
    /// densely from 1
    pub fn reorder(
        &mut self,
        dragged: &str,
        target: &str,
        position: InsertPosition,
    ) -> Result<(), SessionError> {
        let mut order: Vec<TaskKey> = self
            .planned_tasks()
            .iter()
            .map(|t| t.key.clone())
            .collect();

        let dragged_idx = order
            .iter()
            .position(|k| k == dragged)
            .ok_or_else(|| SessionError::UnknownTask(dragged.to_string()))?;
        order.remove(dragged_idx);

        let target_idx = order
            .iter()
            .position(|k| k == target)
            .ok_or_else(|| SessionError::UnknownTask(target.to_string()))?;
        let insert_at = match position {
            InsertPosition::Before => target_idx,
            InsertPosition::After => target_idx + 1,
        };
        order.insert(insert_at, dragged.to_string());

        for (rank, key) in order.iter().enumerate() {
            let new_order = Some(rank as u32 + 1);
            let renumbered = {
                let task = self.task_mut(key)?;
                if task.plan_order == new_order {
                    false
                } else {
                    task.plan_order = new_order;
                    true
                }
            };
            if renumbered {
                self.mark_changed(key);
            }
        }
        Ok(())
    }

    /// Inline edit of the planned window
    pub fn set_schedule(
        &mut self,
        key: &str,
        start_ms: Option<Millis>,
        end_ms: Option<Millis>,
    ) -> Result<(), SessionError> {
        let task = self.task_mut(key)?;
        task.planned_start_ms = start_ms;
        task.planned_end_ms = end_ms;
        self.mark_changed(key);
        Ok(())
    }

    /// Toggle the lock flag; a display hint only, scheduling ignores it
    pub fn set_plan_locked(&mut self, key: &str, locked: bool) -> Result<(), SessionError> {
        self.task_mut(key)?.plan_locked = locked;
        self.mark_changed(key);
        Ok(())
    }

    /// Run the sequential auto-scheduler over the in-plan tasks.
    ///
    /// The run happens on a scratch copy and commits only on success, so a
    /// calendar-exhaustion error leaves the session untouched. An empty
    /// outcome means there was nothing to schedule.
    pub fn autoschedule(
        &mut self,
        start: NaiveDateTime,
        criterion: SortCriterion,
    ) -> Result<ScheduleOutcome, SessionError> {
        let mut scratch = self.tasks.clone();
        let outcome = SequentialScheduler::new().schedule(
            &mut scratch,
            start,
            self.calendar.as_ref(),
            criterion,
        )?;

        self.tasks = scratch;
        for key in &outcome.placed {
            self.mark_changed(key);
        }
        Ok(outcome)
    }

    // ========================================================================
    // Change tracking
    // ========================================================================

    /// The minimal patch list reconciling the backend with local state.
    ///
    /// New in-plan tasks post in full; tasks whose persisted fields differ
    /// from the baseline post in full unless the only semantic change is
    /// leaving the plan, which posts the minimal removal; baseline tasks that
    /// vanished while in plan post a removal too, duplicate-guarded.
    pub fn change_set(&self) -> Vec<TaskPatch> {
        let mut patches = Vec::new();
        let mut processed: BTreeSet<&str> = BTreeSet::new();

        for task in &self.tasks {
            match self.baseline.iter().find(|b| b.key == task.key) {
                None => {
                    if task.in_plan {
                        patches.push(TaskPatch::from_task(task));
                        processed.insert(task.key.as_str());
                    }
                }
                Some(original) => {
                    let differs = task.in_plan != original.in_plan
                        || task.plan_order != original.plan_order
                        || task.planned_start_ms != original.planned_start_ms
                        || task.planned_end_ms != original.planned_end_ms
                        || task.plan_locked != original.plan_locked;
                    if differs {
                        if original.in_plan && !task.in_plan {
                            patches.push(TaskPatch::removal(&task.key));
                        } else {
                            patches.push(TaskPatch::from_task(task));
                        }
                        processed.insert(task.key.as_str());
                    }
                }
            }
        }

        for original in &self.baseline {
            if processed.contains(original.key.as_str()) {
                continue;
            }
            let still_planned = self
                .tasks
                .iter()
                .find(|t| t.key == original.key)
                .is_some_and(|t| t.in_plan);
            if original.in_plan && !still_planned {
                patches.push(TaskPatch::removal(&original.key));
            }
        }

        patches
    }

    /// The change set wrapped as the save-plan request body
    pub fn plan_update(&self) -> PlanUpdate {
        PlanUpdate::new(self.change_set())
    }

    /// Reset the baseline to the current state after a successful save
    pub fn mark_saved(&mut self) {
        self.baseline = self.tasks.clone();
        self.changed.clear();
    }

    fn mark_changed(&mut self, key: &str) {
        self.changed.insert(key.to_string());
    }

    fn task_mut(&mut self, key: &str) -> Result<&mut Task, SessionError> {
        self.tasks
            .iter_mut()
            .find(|t| t.key == key)
            .ok_or_else(|| SessionError::UnknownTask(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capplan_core::{WorkingWindow, HOUR_MS};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn session_with(tasks: Vec<Task>) -> PlanningSession {
        PlanningSession::new(7, tasks, None)
    }

    #[test]
    fn fresh_session_has_an_empty_change_set() {
        let session = session_with(vec![
            Task::new("a").in_plan(1).planned(10, 20),
            Task::new("b"),
        ]);
        assert!(session.change_set().is_empty());
        assert!(!session.has_unsaved_changes());
    }

    #[test]
    fn add_to_plan_takes_the_next_order() {
        let mut session = session_with(vec![
            Task::new("a").in_plan(1),
            Task::new("b").in_plan(4),
            Task::new("c"),
        ]);

        session.add_to_plan("c").unwrap();

        let c = session.task("c").unwrap();
        assert!(c.in_plan);
        assert_eq!(c.plan_order, Some(5));
        assert_eq!(c.planned_start_ms, None);
        assert!(session.is_changed("c"));
    }

    #[test]
    fn removal_emits_the_minimal_patch() {
        let mut session = session_with(vec![Task::new("A").in_plan(1)]);
        session.remove_from_plan("A").unwrap();

        let patches = session.change_set();
        assert_eq!(patches, vec![TaskPatch::removal("A")]);

        let json = serde_json::to_value(&patches[0]).unwrap();
        assert_eq!(json, serde_json::json!({"key": "A", "in_plan": false}));
    }

    #[test]
    fn reorder_renumbers_densely() {
        let mut session = session_with(vec![
            Task::new("a").in_plan(1),
            Task::new("b").in_plan(2),
            Task::new("c").in_plan(3),
        ]);

        session
            .reorder("c", "a", InsertPosition::Before)
            .unwrap();

        let keys: Vec<&str> = session.planned_tasks().iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
        assert_eq!(session.task("c").unwrap().plan_order, Some(1));
        assert_eq!(session.task("a").unwrap().plan_order, Some(2));
        assert_eq!(session.task("b").unwrap().plan_order, Some(3));
    }

    #[test]
    fn reorder_after_target() {
        let mut session = session_with(vec![
            Task::new("a").in_plan(1),
            Task::new("b").in_plan(2),
            Task::new("c").in_plan(3),
        ]);

        session.reorder("a", "b", InsertPosition::After).unwrap();

        let keys: Vec<&str> = session.planned_tasks().iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn reorder_rejects_unknown_keys() {
        let mut session = session_with(vec![Task::new("a").in_plan(1)]);
        assert_eq!(
            session.reorder("ghost", "a", InsertPosition::After),
            Err(SessionError::UnknownTask("ghost".into()))
        );
    }

    #[test]
    fn change_set_posts_full_payload_for_field_edits() {
        let mut session = session_with(vec![Task::new("a").in_plan(1).planned(10, 20)]);
        session.set_schedule("a", Some(30), Some(40)).unwrap();

        let patches = session.change_set();
        assert_eq!(patches.len(), 1);
        assert!(patches[0].in_plan);
        assert_eq!(patches[0].planned_start_ms, Some(30));
        assert_eq!(patches[0].planned_end_ms, Some(40));
    }

    #[test]
    fn change_set_ignores_non_persisted_edits() {
        let mut session = session_with(vec![Task::new("a").in_plan(1)]);
        // Mutating nothing but the dirty flag leaves the diff empty
        session.mark_changed("a");
        assert!(session.has_unsaved_changes());
        assert!(session.change_set().is_empty());
    }

    #[test]
    fn vanished_planned_tasks_emit_removals() {
        let mut session = session_with(vec![
            Task::new("kept").in_plan(1),
            Task::new("dropped").in_plan(2),
        ]);
        session.tasks.retain(|t| t.key != "dropped");

        let patches = session.change_set();
        assert_eq!(patches, vec![TaskPatch::removal("dropped")]);
    }

    #[test]
    fn new_in_plan_tasks_post_in_full() {
        let mut session = session_with(vec![Task::new("a").in_plan(1)]);
        session
            .tasks
            .push(Task::new("fresh").name("New job").in_plan(2));

        let patches = session.change_set();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].key, "fresh");
        assert!(patches[0].in_plan);
        assert_eq!(patches[0].plan_order, Some(2));
    }

    #[test]
    fn mark_saved_resets_the_baseline() {
        let mut session = session_with(vec![Task::new("a").in_plan(1)]);
        session.set_plan_locked("a", true).unwrap();
        assert_eq!(session.change_set().len(), 1);

        session.mark_saved();
        assert!(session.change_set().is_empty());
        assert!(!session.has_unsaved_changes());
    }

    #[test]
    fn autoschedule_places_and_marks_tasks() {
        let mut session = session_with(vec![
            Task::new("a").remaining(2.0).in_plan(1),
            Task::new("b").remaining(3.0).in_plan(2),
            Task::new("idle"),
        ]);

        let outcome = session
            .autoschedule(at(2026, 2, 2, 9, 0), SortCriterion::PlanOrder)
            .unwrap();

        assert_eq!(outcome.placed.len(), 2);
        let a = session.task("a").unwrap();
        let b = session.task("b").unwrap();
        assert_eq!(b.planned_start_ms, a.planned_end_ms);
        assert_eq!(
            b.planned_end_ms.unwrap() - a.planned_start_ms.unwrap(),
            5 * HOUR_MS
        );
        assert!(session.is_changed("a"));
        assert!(!session.is_changed("idle"));
        assert_eq!(session.change_set().len(), 2);
    }

    #[test]
    fn autoschedule_failure_leaves_state_untouched() {
        // A calendar with no working time at all
        let closed = MachineCalendar::new("Europe/Istanbul");
        let mut session = PlanningSession::new(
            7,
            vec![Task::new("a").remaining(2.0).in_plan(1).planned(10, 20)],
            Some(closed),
        );

        let err = session
            .autoschedule(at(2026, 2, 2, 9, 0), SortCriterion::PlanOrder)
            .unwrap_err();

        assert!(matches!(err, SessionError::Schedule(_)));
        let a = session.task("a").unwrap();
        assert_eq!(a.planned_start_ms, Some(10));
        assert_eq!(a.planned_end_ms, Some(20));
        assert!(session.change_set().is_empty());
    }

    #[test]
    fn autoschedule_nothing_to_schedule_is_empty() {
        let mut session = session_with(vec![Task::new("idle")]);
        let outcome = session
            .autoschedule(at(2026, 2, 2, 9, 0), SortCriterion::PlanOrder)
            .unwrap();
        assert!(outcome.is_empty());
        assert!(!session.has_unsaved_changes());
    }

    #[test]
    fn autoschedule_respects_the_session_calendar() {
        let calendar = MachineCalendar::new("Europe/Istanbul")
            .weekday(0, vec![WorkingWindow::new("09:00", "17:00").unwrap()]);
        let mut session = PlanningSession::new(
            7,
            vec![Task::new("a").remaining(2.0).in_plan(1)],
            Some(calendar),
        );

        // Saturday start snaps to Monday 09:00
        session
            .autoschedule(at(2026, 2, 7, 10, 0), SortCriterion::PlanOrder)
            .unwrap();

        let a = session.task("a").unwrap();
        assert_eq!(
            a.planned_start_ms.unwrap(),
            capplan_core::datetime_to_millis(at(2026, 2, 9, 9, 0))
        );
    }

    #[test]
    fn locked_tasks_are_still_rescheduled() {
        let mut session = session_with(vec![
            Task::new("locked").remaining(1.0).in_plan(1).planned(10, 20).locked(),
        ]);

        session
            .autoschedule(at(2026, 2, 2, 9, 0), SortCriterion::PlanOrder)
            .unwrap();

        let locked = session.task("locked").unwrap();
        assert!(locked.plan_locked);
        assert_ne!(locked.planned_start_ms, Some(10));
    }
}
