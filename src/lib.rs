//! Task planning with recurring routines.
//!
//! Tasks form trees (completing a parent completes its subtree) and live in
//! a local SQLite database. Routines pair a recurrence rule with task
//! templates; a generation pass turns every routine that fires on a date
//! into fresh tasks, at most once per date.

pub mod db;
pub mod error;
pub mod generator;
pub mod model;
pub mod recurrence;
pub mod routine;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod tasks;
pub mod validate;

pub use db::Database;
pub use model::{Priority, Task, TaskId, TaskTree, UserId};
pub use routine::{RepeatKind, RepeatRule, Routine, RoutineId, TaskTemplate, WeekdaySet};
pub use scheduler::Scheduler;
pub use session::Session;
pub use store::{RoutineStore, TaskStore};
