use crate::generator;
use crate::model::{Task, UserId};
use crate::routine::{RepeatRule, Routine, RoutineId};
use crate::session::Session;
use crate::store::{RoutineStore, TaskStore};
use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};
use tracing::{debug, info};

/// Entry point for routine management and for the daily generation pass.
pub struct Scheduler<'a> {
    tasks: &'a dyn TaskStore,
    routines: &'a dyn RoutineStore,
}

impl<'a> Scheduler<'a> {
    pub fn new(tasks: &'a dyn TaskStore, routines: &'a dyn RoutineStore) -> Scheduler<'a> {
        Scheduler { tasks, routines }
    }

    /// Create and store an active routine starting today.
    pub fn create_routine(
        &self,
        session: &Session,
        name: &str,
        description: &str,
        rule: RepeatRule,
    ) -> Result<Routine> {
        let mut routine = Routine::new(name, description, session.user_id, Local::now());
        routine.rule = rule;
        self.routines.insert_routine(&mut routine)?;
        Ok(routine)
    }

    /// Store a routine assembled by the caller. It is validated first.
    pub fn insert_routine(&self, routine: &mut Routine) -> Result<RoutineId> {
        self.routines.insert_routine(routine)
    }

    pub fn routine(&self, id: RoutineId) -> Result<Option<Routine>> {
        self.routines.load_routine(id)
    }

    pub fn user_routines(&self, user_id: UserId, active_only: bool) -> Result<Vec<Routine>> {
        self.routines.load_user_routines(user_id, active_only)
    }

    pub fn update_routine(&self, routine: &Routine) -> Result<bool> {
        self.routines.update_routine(routine)
    }

    pub fn delete_routine(&self, id: RoutineId) -> Result<bool> {
        self.routines.delete_routine(id)
    }

    pub fn activate(&self, id: RoutineId) -> Result<bool> {
        self.set_active(id, true)
    }

    pub fn deactivate(&self, id: RoutineId) -> Result<bool> {
        self.set_active(id, false)
    }

    fn set_active(&self, id: RoutineId, active: bool) -> Result<bool> {
        match self.routines.load_routine(id)? {
            Some(mut routine) => {
                routine.active = active;
                self.routines.update_routine(&routine)
            }
            None => Ok(false),
        }
    }

    /// Run every active routine of the session's user for `target` (today
    /// when `None`) and return the generated tasks, routine by routine.
    pub fn generate_for_user(&self, session: &Session, target: Option<NaiveDate>) -> Result<Vec<Task>> {
        self.generate_for_user_at(session, target, Local::now())
    }

    /// Same as [`Scheduler::generate_for_user`] with an explicit clock.
    ///
    /// A routine is written back only when it produced tasks. The first
    /// storage error aborts the pass; routines handled before it keep
    /// their generated tasks.
    pub fn generate_for_user_at(
        &self,
        session: &Session,
        target: Option<NaiveDate>,
        now: DateTime<Local>,
    ) -> Result<Vec<Task>> {
        let routines = self.routines.load_user_routines(session.user_id, true)?;
        let mut all = Vec::new();
        for mut routine in routines {
            let generated = generator::generate_at(&mut routine, self.tasks, target, now)?;
            if !generated.is_empty() {
                self.routines.update_routine(&routine)?;
            }
            debug!(routine = %routine.name, count = generated.len(), "routine evaluated");
            all.extend(generated);
        }
        info!(user = %session.username, count = all.len(), "generation pass finished");
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::TaskId;
    use crate::routine::RepeatKind;
    use crate::validate::MAX_TEMPLATE_TITLE_LEN;
    use anyhow::anyhow;
    use chrono::{TimeZone, Weekday};
    use std::cell::Cell;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(d: NaiveDate, h: u32) -> DateTime<Local> {
        Local.from_local_datetime(&d.and_hms_opt(h, 0, 0).unwrap()).unwrap()
    }

    fn store_routine(db: &Database, session: &Session, name: &str, rule: RepeatRule, templates: &[&str]) -> Routine {
        let mut routine = Routine::new(name, "", session.user_id, at(date(2024, 1, 1), 8));
        routine.rule = rule;
        for t in templates {
            routine.add_template(t, "");
        }
        db.insert_routine(&mut routine).unwrap();
        routine
    }

    #[test]
    fn generation_pass_covers_every_firing_routine() {
        let db = Database::open_in_memory().unwrap();
        let session = Session::login(&db, "tester").unwrap();
        let scheduler = Scheduler::new(&db, &db);
        let morning = store_routine(&db, &session, "Morning", RepeatRule::new(RepeatKind::Daily), &["A", "B"]);
        let weekend = store_routine(&db, &session, "Weekend", RepeatRule::new(RepeatKind::Weekends), &["Clean"]);
        let tuesday = store_routine(&db, &session, "Tuesday", RepeatRule::on([Weekday::Tue]), &["Gym"]);

        // 2024-03-05 is a Tuesday.
        let day = date(2024, 3, 5);
        let now = at(day, 6);
        let tasks = scheduler.generate_for_user_at(&session, Some(day), now).unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Morning - 2024-03-05", "A", "B", "Gym - 2024-03-05"]);

        let stored = |r: &Routine| db.load_routine(r.id.unwrap()).unwrap().unwrap().last_generated;
        assert_eq!(stored(&morning), Some(now));
        assert_eq!(stored(&tuesday), Some(now));
        assert_eq!(stored(&weekend), None);

        let again = scheduler.generate_for_user_at(&session, Some(day), at(day, 12)).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn other_users_and_inactive_routines_are_skipped() {
        let db = Database::open_in_memory().unwrap();
        let session = Session::login(&db, "tester").unwrap();
        let other = Session::login(&db, "someone").unwrap();
        let scheduler = Scheduler::new(&db, &db);
        store_routine(&db, &other, "Theirs", RepeatRule::new(RepeatKind::Daily), &["X"]);
        let mine = store_routine(&db, &session, "Mine", RepeatRule::new(RepeatKind::Daily), &["Y"]);
        assert!(scheduler.deactivate(mine.id.unwrap()).unwrap());

        let day = date(2024, 3, 5);
        assert!(scheduler.generate_for_user_at(&session, Some(day), at(day, 6)).unwrap().is_empty());

        assert!(scheduler.activate(mine.id.unwrap()).unwrap());
        let tasks = scheduler.generate_for_user_at(&session, Some(day), at(day, 6)).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].user_id, session.user_id);
        assert!(!scheduler.activate(999).unwrap());
    }

    #[test]
    fn create_routine_validates_and_stores() {
        let db = Database::open_in_memory().unwrap();
        let session = Session::login(&db, "tester").unwrap();
        let scheduler = Scheduler::new(&db, &db);

        assert!(scheduler
            .create_routine(&session, "   ", "", RepeatRule::default())
            .is_err());
        let routine = scheduler
            .create_routine(&session, " Evening ", " wind down ", RepeatRule::new(RepeatKind::Weekdays))
            .unwrap();
        assert_eq!(routine.name, "Evening");
        assert_eq!(routine.description, "wind down");
        assert_eq!(routine.start_date, Local::now().date_naive());

        let listed = scheduler.user_routines(session.user_id, false).unwrap();
        assert_eq!(listed, vec![routine.clone()]);
        assert!(scheduler.delete_routine(routine.id.unwrap()).unwrap());
        assert!(scheduler.routine(routine.id.unwrap()).unwrap().is_none());
    }

    #[test]
    fn deleting_a_routine_keeps_its_tasks() {
        let db = Database::open_in_memory().unwrap();
        let session = Session::login(&db, "tester").unwrap();
        let scheduler = Scheduler::new(&db, &db);
        let routine = store_routine(&db, &session, "Morning", RepeatRule::default(), &["Stretch"]);
        let day = date(2024, 3, 5);
        scheduler.generate_for_user_at(&session, Some(day), at(day, 6)).unwrap();

        assert!(scheduler.delete_routine(routine.id.unwrap()).unwrap());
        assert_eq!(db.load_user_tasks(session.user_id, true).unwrap().len(), 1);
    }

    #[test]
    fn over_long_templates_never_reach_the_generation_pass() {
        let db = Database::open_in_memory().unwrap();
        let session = Session::login(&db, "tester").unwrap();
        let scheduler = Scheduler::new(&db, &db);

        let mut long = Routine::new("Long", "", session.user_id, at(date(2024, 1, 1), 8));
        long.add_template(&"x".repeat(195), "");
        assert!(scheduler.insert_routine(&mut long).is_err());
        assert!(scheduler.user_routines(session.user_id, false).unwrap().is_empty());

        let mut longest = Routine::new("Longest", "", session.user_id, at(date(2024, 1, 1), 8));
        longest.add_template(&"x".repeat(MAX_TEMPLATE_TITLE_LEN), "");
        scheduler.insert_routine(&mut longest).unwrap();
        store_routine(&db, &session, "Other", RepeatRule::default(), &["Stretch"]);

        let day = date(2024, 3, 1);
        let tasks = scheduler.generate_for_user_at(&session, Some(day), at(day, 6)).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title.chars().count(), 200);
        assert_eq!(tasks[1].title, "Stretch - 2024-03-01");
    }

    /// Delegates to the database until `budget` tasks have been created.
    struct LimitedTasks<'a> {
        db: &'a Database,
        budget: Cell<usize>,
    }

    impl TaskStore for LimitedTasks<'_> {
        fn create_task(&self, title: &str, description: &str, user_id: UserId, parent_id: Option<TaskId>) -> Result<Task> {
            if self.budget.get() == 0 {
                return Err(anyhow!("disk full"));
            }
            self.budget.set(self.budget.get() - 1);
            self.db.create_task(title, description, user_id, parent_id)
        }
        fn update_task(&self, task: &mut Task) -> Result<bool> {
            self.db.update_task(task)
        }
        fn load_task(&self, id: TaskId) -> Result<Option<Task>> {
            self.db.load_task(id)
        }
        fn load_user_tasks(&self, user_id: UserId, include_completed: bool) -> Result<Vec<Task>> {
            self.db.load_user_tasks(user_id, include_completed)
        }
        fn delete_task(&self, id: TaskId) -> Result<bool> {
            self.db.delete_task(id)
        }
    }

    #[test]
    fn storage_failure_aborts_the_pass_but_keeps_earlier_routines() {
        let db = Database::open_in_memory().unwrap();
        let session = Session::login(&db, "tester").unwrap();
        let first = store_routine(&db, &session, "First", RepeatRule::default(), &["Stretch"]);
        let second = store_routine(&db, &session, "Second", RepeatRule::default(), &["Read"]);
        let tasks = LimitedTasks {
            db: &db,
            budget: Cell::new(1),
        };
        let scheduler = Scheduler::new(&tasks, &db);

        let day = date(2024, 3, 1);
        let now = at(day, 6);
        let err = scheduler.generate_for_user_at(&session, Some(day), now).unwrap_err();
        assert_eq!(err.to_string(), "disk full");

        let stored = |r: &Routine| db.load_routine(r.id.unwrap()).unwrap().unwrap().last_generated;
        assert_eq!(stored(&first), Some(now));
        assert_eq!(stored(&second), None);
        let titles: Vec<String> = db
            .load_user_tasks(session.user_id, true)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["Stretch - 2024-03-01"]);

        // A retry only picks up what is still missing.
        let retry = Scheduler::new(&db, &db)
            .generate_for_user_at(&session, Some(day), at(day, 7))
            .unwrap();
        assert_eq!(retry.len(), 1);
        assert_eq!(retry[0].title, "Read - 2024-03-01");
    }

    #[test]
    fn stale_copies_of_a_routine_both_generate() {
        let db = Database::open_in_memory().unwrap();
        let session = Session::login(&db, "tester").unwrap();
        let routine = store_routine(&db, &session, "Morning", RepeatRule::default(), &["Stretch"]);
        let id = routine.id.unwrap();

        // Two passes that loaded the routine before either wrote it back.
        let mut a = db.load_routine(id).unwrap().unwrap();
        let mut b = db.load_routine(id).unwrap().unwrap();
        let day = date(2024, 3, 1);
        assert_eq!(generator::generate_at(&mut a, &db, Some(day), at(day, 6)).unwrap().len(), 1);
        assert_eq!(generator::generate_at(&mut b, &db, Some(day), at(day, 6)).unwrap().len(), 1);
        db.update_routine(&a).unwrap();
        db.update_routine(&b).unwrap();

        assert_eq!(db.load_user_tasks(session.user_id, true).unwrap().len(), 2);
        assert!(Scheduler::new(&db, &db)
            .generate_for_user_at(&session, Some(day), at(day, 7))
            .unwrap()
            .is_empty());
    }
}
