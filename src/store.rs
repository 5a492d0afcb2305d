//! Storage seams used by the generator and the scheduler.
//!
//! Calls are synchronous. Errors are passed through to the caller as-is;
//! nothing in the core retries or translates them.

use crate::model::{Task, TaskId, UserId};
use crate::routine::{Routine, RoutineId};
use anyhow::Result;

pub trait TaskStore {
    /// Persist a new task and return it with its assigned id.
    fn create_task(
        &self,
        title: &str,
        description: &str,
        user_id: UserId,
        parent_id: Option<TaskId>,
    ) -> Result<Task>;

    /// Persist the task's current state, bumping `updated_at`. Returns
    /// false when no stored task has this id.
    fn update_task(&self, task: &mut Task) -> Result<bool>;

    fn load_task(&self, id: TaskId) -> Result<Option<Task>>;

    fn load_user_tasks(&self, user_id: UserId, include_completed: bool) -> Result<Vec<Task>>;

    /// Delete a task together with its whole subtree.
    fn delete_task(&self, id: TaskId) -> Result<bool>;
}

pub trait RoutineStore {
    /// Persist a new routine, filling in its id.
    fn insert_routine(&self, routine: &mut Routine) -> Result<RoutineId>;

    fn load_routine(&self, id: RoutineId) -> Result<Option<Routine>>;

    /// Routines in a stable order (by id).
    fn load_user_routines(&self, user_id: UserId, active_only: bool) -> Result<Vec<Routine>>;

    fn update_routine(&self, routine: &Routine) -> Result<bool>;

    /// Tasks already generated by the routine are left alone.
    fn delete_routine(&self, id: RoutineId) -> Result<bool>;
}
