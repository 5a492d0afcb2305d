use chrono::NaiveDate;
use thiserror::Error;

/// Rejected user input. Raised when tasks, routines, tags or users are
/// created or edited, never by the recurrence evaluator or the generator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("{field} cannot be longer than {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} has an invalid format: {reason}")]
    Format {
        field: &'static str,
        reason: &'static str,
    },

    #[error("repeat interval must be at least 1")]
    ZeroInterval,

    #[error("a custom routine needs at least one weekday")]
    NoCustomDays,

    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error("unknown {kind} '{value}'")]
    Unknown { kind: &'static str, value: String },
}
