use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use routinely::{Priority, RepeatKind};
use std::path::PathBuf;
use structopt::StructOpt;

fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
}

fn parse_time(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s, "%H:%M")
}

/// `YYYY-MM-DD` (due at midnight) or `YYYY-MM-DD HH:MM`.
fn parse_due(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .or_else(|_| parse_date(s).map(|d| d.and_time(NaiveTime::MIN)))
}

#[derive(Debug, StructOpt)]
pub enum TaskCommand {
    /// Write a new task.
    Add {
        /// The task title.
        #[structopt()]
        title: String,

        #[structopt(short, long, default_value = "")]
        description: String,

        /// Nest the task under this one.
        #[structopt(long)]
        parent: Option<i64>,

        /// low, medium, high or urgent.
        #[structopt(short, long, default_value = "medium")]
        priority: Priority,

        /// Due date, "YYYY-MM-DD" or "YYYY-MM-DD HH:MM".
        #[structopt(long, parse(try_from_str = parse_due))]
        due: Option<NaiveDateTime>,

        #[structopt(short, long)]
        tag: Vec<String>,
    },
    /// Show the task tree.
    List {
        /// Include completed tasks.
        #[structopt(short, long)]
        all: bool,
    },
    /// Complete a task and all of its subtasks.
    Done { id: i64 },
    /// Re-open a completed task.
    Undo { id: i64 },
    /// Remove a task and all of its subtasks.
    Rm { id: i64 },
    /// Find tasks by title or description.
    Search { query: String },
    /// List open tasks past their due date.
    Overdue,
    /// Attach a tag to a task.
    Tag { id: i64, name: String },
    /// Detach a tag from a task.
    Untag { id: i64, name: String },
}

#[derive(Debug, StructOpt)]
pub enum RoutineCommand {
    /// Create a routine.
    Add {
        name: String,

        #[structopt(short, long, default_value = "")]
        description: String,

        /// daily, weekly, monthly, weekdays, weekends or custom.
        #[structopt(short, long, default_value = "daily")]
        repeat: RepeatKind,

        /// Repeat every N days, weeks or months.
        #[structopt(long, default_value = "1")]
        every: u32,

        /// Weekdays for custom routines (mon, tue, ...).
        #[structopt(long, use_delimiter = true)]
        days: Vec<Weekday>,

        /// First day the routine may fire (default: today).
        #[structopt(long, parse(try_from_str = parse_date))]
        start: Option<NaiveDate>,

        /// Last day the routine may fire.
        #[structopt(long, parse(try_from_str = parse_date))]
        end: Option<NaiveDate>,

        /// Time of day generated tasks are due ("HH:MM").
        #[structopt(long, parse(try_from_str = parse_time))]
        at: Option<NaiveTime>,

        /// Task template title, repeatable.
        #[structopt(short, long)]
        template: Vec<String>,
    },
    /// List routines.
    List {
        /// Include inactive routines.
        #[structopt(short, long)]
        all: bool,
    },
    /// Show a routine with its templates and next dates.
    Show {
        id: i64,

        /// How many upcoming dates to show.
        #[structopt(short, long, default_value = "5")]
        next: usize,
    },
    /// Append a task template to a routine.
    TemplateAdd {
        id: i64,
        title: String,

        #[structopt(short, long, default_value = "")]
        description: String,
    },
    /// Remove a task template from a routine by title.
    TemplateRm { id: i64, title: String },
    Activate { id: i64 },
    Deactivate { id: i64 },
    /// Delete a routine. Tasks it already generated are kept.
    Rm { id: i64 },
}

#[derive(Debug, StructOpt)]
pub enum TagCommand {
    /// Create a tag or change its color.
    Add {
        name: String,

        /// "#RRGGBB"
        #[structopt(short, long, default_value = "#3498DB")]
        color: String,

        #[structopt(short, long, default_value = "")]
        description: String,
    },
    List,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Manage tasks.
    Task {
        #[structopt(subcommand)]
        cmd: TaskCommand,
    },
    /// Manage routines.
    Routine {
        #[structopt(subcommand)]
        cmd: RoutineCommand,
    },
    /// Manage tags.
    Tag {
        #[structopt(subcommand)]
        cmd: TagCommand,
    },
    /// Generate the tasks owed by the user's routines.
    Generate {
        /// Date to generate for (default: today).
        #[structopt(long, parse(try_from_str = parse_date))]
        date: Option<NaiveDate>,
    },
}

#[derive(Debug, StructOpt)]
#[structopt(name = "routinely", about = "A minimalistic task planner with recurring routines.")]
pub struct CommandLineArgs {
    #[structopt(subcommand)]
    pub action: Command,

    /// Use a different database file.
    #[structopt(parse(from_os_str), short = "f", long)]
    pub db_file: Option<PathBuf>,

    /// Act as this user.
    #[structopt(short, long)]
    pub user: Option<String>,

    /// Log debug output to stderr.
    #[structopt(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_accepts_date_or_date_time() {
        assert_eq!(
            parse_due("2024-03-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_due("2024-03-01 07:45").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(7, 45, 0).unwrap()
        );
        assert!(parse_due("tomorrow").is_err());
    }

    #[test]
    fn routine_add_parses_custom_days() {
        let args = CommandLineArgs::from_iter(&[
            "routinely", "routine", "add", "Gym", "--repeat", "custom", "--days", "mon,thu", "--at", "18:30",
            "-t", "Warm up", "-t", "Lift",
        ]);
        match args.action {
            Command::Routine {
                cmd: RoutineCommand::Add { repeat, days, at, template, .. },
            } => {
                assert_eq!(repeat, RepeatKind::Custom);
                assert_eq!(days, vec![Weekday::Mon, Weekday::Thu]);
                assert_eq!(at, NaiveTime::from_hms_opt(18, 30, 0));
                assert_eq!(template, vec!["Warm up", "Lift"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
