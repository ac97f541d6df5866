//! Machine selection and the backend seam.
//!
//! [`SessionController`] owns at most one live [`PlanningSession`] and
//! arbitrates machine switches. Two guards protect it:
//!
//! - a busy flag rejects re-entrant selection attempts while a load is in
//!   flight, and
//! - a monotonically increasing selection generation stamps every attempt;
//!   completing with a superseded token is rejected, so a slow response for
//!   machine A can never clobber the session of machine B.
//!
//! The backend is a trait with the three calls the planning screen needs.
//! Calendar load failure degrades to no calendar (7×24 scheduling); task
//! load failure fails the whole selection.

use capplan_core::{MachineCalendar, Task};
use std::fmt;
use thiserror::Error;

use crate::{PlanningSession, SessionError};

/// A failed backend request, flattened to the server's message
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The three backend calls behind the planning screen
pub trait PlanningBackend {
    /// All tasks of one machine, planned and unplanned
    fn load_tasks(&self, machine_id: i64) -> Result<Vec<Task>, BackendError>;

    /// The machine's working calendar
    fn load_calendar(&self, machine_id: i64) -> Result<MachineCalendar, BackendError>;

    /// Persist a change set; the body is `{"items": [...]}`
    fn save_plan(
        &self,
        machine_id: i64,
        update: &capplan_core::PlanUpdate,
    ) -> Result<(), BackendError>;
}

/// Proof of an in-flight selection attempt
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SelectionToken {
    machine_id: i64,
    generation: u64,
}

impl SelectionToken {
    pub fn machine_id(&self) -> i64 {
        self.machine_id
    }
}

impl fmt::Debug for SelectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionToken")
            .field("machine_id", &self.machine_id)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Owns the live planning session and arbitrates machine switches
#[derive(Debug, Default)]
pub struct SessionController {
    generation: u64,
    loading: bool,
    session: Option<PlanningSession>,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&PlanningSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut PlanningSession> {
        self.session.as_mut()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Start switching to a machine. Rejected while another load is in
    /// flight, and when the machine is already the live session.
    pub fn begin_selection(&mut self, machine_id: i64) -> Result<SelectionToken, SessionError> {
        if self.loading {
            return Err(SessionError::Busy);
        }
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.machine_id() == machine_id)
        {
            return Err(SessionError::AlreadySelected(machine_id));
        }

        self.generation += 1;
        self.loading = true;
        Ok(SelectionToken {
            machine_id,
            generation: self.generation,
        })
    }

    /// Install the loaded state for a selection attempt. A token from a
    /// superseded attempt is rejected and the live session stays as it is.
    pub fn complete_selection(
        &mut self,
        token: SelectionToken,
        tasks: Vec<Task>,
        calendar: Option<MachineCalendar>,
    ) -> Result<&mut PlanningSession, SessionError> {
        if token.generation != self.generation {
            return Err(SessionError::Stale);
        }

        self.loading = false;
        Ok(self
            .session
            .insert(PlanningSession::new(token.machine_id, tasks, calendar)))
    }

    /// Abandon a selection attempt after a failed load. Clears the live
    /// session the way the planning screen resets to "no machine".
    pub fn fail_selection(&mut self, token: SelectionToken) {
        if token.generation == self.generation {
            self.loading = false;
            self.session = None;
        }
    }

    /// Full machine switch against a backend: guarded begin, concurrentable
    /// loads, graceful calendar degradation, guarded completion.
    pub fn select_machine(
        &mut self,
        backend: &impl PlanningBackend,
        machine_id: i64,
    ) -> Result<&mut PlanningSession, SessionError> {
        let token = self.begin_selection(machine_id)?;

        let tasks = match backend.load_tasks(machine_id) {
            Ok(tasks) => tasks,
            Err(error) => {
                self.fail_selection(token);
                return Err(SessionError::Backend(error.to_string()));
            }
        };

        // No calendar is a degraded but workable state: 7x24 scheduling
        let calendar = backend.load_calendar(machine_id).ok();

        self.complete_selection(token, tasks, calendar)
    }

    /// Submit the live session's change set. Success resets the baseline;
    /// failure preserves local state and the pending change set for retry.
    /// Returns the number of patches submitted.
    pub fn save(&mut self, backend: &impl PlanningBackend) -> Result<usize, SessionError> {
        let session = self
            .session
            .as_mut()
            .ok_or(SessionError::NoMachineSelected)?;

        let update = session.plan_update();
        if update.is_empty() {
            return Ok(0);
        }

        backend
            .save_plan(session.machine_id(), &update)
            .map_err(|error| SessionError::Backend(error.to_string()))?;

        session.mark_saved();
        Ok(update.items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capplan_core::{PlanUpdate, TaskPatch};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    /// Canned backend with scriptable failures
    struct FakeBackend {
        tasks: Vec<Task>,
        fail_tasks: bool,
        fail_calendar: bool,
        fail_save: bool,
        saved: RefCell<Vec<PlanUpdate>>,
    }

    impl FakeBackend {
        fn with_tasks(tasks: Vec<Task>) -> Self {
            Self {
                tasks,
                fail_tasks: false,
                fail_calendar: false,
                fail_save: false,
                saved: RefCell::new(Vec::new()),
            }
        }
    }

    impl PlanningBackend for FakeBackend {
        fn load_tasks(&self, _machine_id: i64) -> Result<Vec<Task>, BackendError> {
            if self.fail_tasks {
                return Err(BackendError::new("tasks endpoint down"));
            }
            Ok(self.tasks.clone())
        }

        fn load_calendar(&self, _machine_id: i64) -> Result<MachineCalendar, BackendError> {
            if self.fail_calendar {
                return Err(BackendError::new("calendar endpoint down"));
            }
            Ok(MachineCalendar::default())
        }

        fn save_plan(&self, _machine_id: i64, update: &PlanUpdate) -> Result<(), BackendError> {
            if self.fail_save {
                return Err(BackendError::new("save rejected"));
            }
            self.saved.borrow_mut().push(update.clone());
            Ok(())
        }
    }

    #[test]
    fn select_machine_installs_a_session() {
        let backend = FakeBackend::with_tasks(vec![Task::new("a").in_plan(1)]);
        let mut controller = SessionController::new();

        let session = controller.select_machine(&backend, 7).unwrap();
        assert_eq!(session.machine_id(), 7);
        assert_eq!(session.tasks().len(), 1);
        assert!(session.calendar().is_some());
        assert!(!controller.is_loading());
    }

    #[test]
    fn reentrant_selection_is_rejected() {
        let mut controller = SessionController::new();
        let _token = controller.begin_selection(7).unwrap();

        assert_eq!(controller.begin_selection(8), Err(SessionError::Busy));
    }

    #[test]
    fn reselecting_the_live_machine_is_rejected() {
        let backend = FakeBackend::with_tasks(Vec::new());
        let mut controller = SessionController::new();
        controller.select_machine(&backend, 7).unwrap();

        assert_eq!(
            controller.begin_selection(7),
            Err(SessionError::AlreadySelected(7))
        );
    }

    #[test]
    fn stale_completion_cannot_clobber_a_newer_selection() {
        let mut controller = SessionController::new();

        let token_a = controller.begin_selection(7).unwrap();
        controller.fail_selection(token_a);
        let token_b = controller.begin_selection(8).unwrap();
        controller
            .complete_selection(token_b, vec![Task::new("b").in_plan(1)], None)
            .unwrap();

        // Machine 7's response arrives late
        let result = controller.complete_selection(token_a, vec![Task::new("a")], None);
        assert!(matches!(result, Err(SessionError::Stale)));
        assert_eq!(controller.session().unwrap().machine_id(), 8);
    }

    #[test]
    fn task_load_failure_fails_the_selection() {
        let mut backend = FakeBackend::with_tasks(Vec::new());
        backend.fail_tasks = true;
        let mut controller = SessionController::new();

        let result = controller.select_machine(&backend, 7);
        assert!(matches!(result, Err(SessionError::Backend(_))));
        assert!(controller.session().is_none());
        assert!(!controller.is_loading());
    }

    #[test]
    fn calendar_load_failure_degrades_to_7x24() {
        let mut backend = FakeBackend::with_tasks(vec![Task::new("a")]);
        backend.fail_calendar = true;
        let mut controller = SessionController::new();

        let session = controller.select_machine(&backend, 7).unwrap();
        assert!(session.calendar().is_none());
    }

    #[test]
    fn save_submits_only_the_change_set() {
        let backend = FakeBackend::with_tasks(vec![
            Task::new("a").in_plan(1),
            Task::new("b").in_plan(2),
        ]);
        let mut controller = SessionController::new();
        controller.select_machine(&backend, 7).unwrap();

        controller
            .session_mut()
            .unwrap()
            .remove_from_plan("b")
            .unwrap();

        let submitted = controller.save(&backend).unwrap();
        assert_eq!(submitted, 1);

        let saved = backend.saved.borrow();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].items, vec![TaskPatch::removal("b")]);

        // Baseline reset: an immediate re-save has nothing to send
        drop(saved);
        assert_eq!(controller.save(&backend).unwrap(), 0);
    }

    #[test]
    fn save_failure_preserves_the_change_set() {
        let mut backend = FakeBackend::with_tasks(vec![Task::new("a").in_plan(1)]);
        let mut controller = SessionController::new();
        controller.select_machine(&backend, 7).unwrap();
        controller
            .session_mut()
            .unwrap()
            .set_plan_locked("a", true)
            .unwrap();

        backend.fail_save = true;
        let result = controller.save(&backend);
        assert!(matches!(result, Err(SessionError::Backend(_))));

        // Retry after the backend recovers
        backend.fail_save = false;
        assert_eq!(controller.save(&backend).unwrap(), 1);
    }

    #[test]
    fn save_without_a_session_is_rejected() {
        let backend = FakeBackend::with_tasks(Vec::new());
        let mut controller = SessionController::new();
        assert_eq!(
            controller.save(&backend),
            Err(SessionError::NoMachineSelected)
        );
    }
}
