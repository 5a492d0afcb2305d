use crate::model::{Priority, Tag, Task, TaskId, UserId, DEFAULT_TAG_COLOR};
use crate::routine::{RepeatKind, RepeatRule, Routine, RoutineId, TaskTemplate, WeekdaySet};
use crate::store::{RoutineStore, TaskStore};
use crate::validate;
use anyhow::{anyhow, Context, Result};
use chrono::Local;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Map;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

const TASK_COLUMNS: &str = "id, title, description, completed, parent_id, user_id, priority, \
     due_at, created_at, updated_at, completed_at, properties";

const ROUTINE_COLUMNS: &str = "id, user_id, name, description, repeat_type, repeat_interval, \
     custom_days, is_active, created_at, last_generated, start_date, end_date, preferred_time, templates";

/// SQLite-backed store for users, tags, tasks and routines.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `path`, creating the file, its directory and its
    /// tables when they do not exist yet.
    pub fn open(path: &Path) -> Result<Database> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory {}.", dir.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}.", path.display()))?;
        debug!(path = %path.display(), "database opened");
        Database::init(conn)
    }

    pub fn open_in_memory() -> Result<Database> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database.")?;
        Database::init(conn)
    }

    fn init(conn: Connection) -> Result<Database> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys.")?;
        init_schema(&conn)?;
        Ok(Database { conn })
    }

    /// Return the id of `username`, creating the user on first use.
    pub fn ensure_user(&self, username: &str) -> Result<UserId> {
        let username = validate::username(username)?;
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO users (username, created_at) VALUES (?1, ?2)",
                params![username, Local::now()],
            )
            .context("Failed to insert user to database.")?;
        let id = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![username],
                |row| row.get::<_, UserId>(0),
            )
            .context("Failed to fetch user from database.")?;
        if inserted > 0 {
            info!(user_id = id, %username, "user created");
        }
        Ok(id)
    }

    /// Insert a tag or update the color and description of an existing one.
    pub fn save_tag(&self, tag: &Tag) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO tags (name, color, description, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET color = excluded.color, description = excluded.description",
                params![tag.name, tag.color, tag.description, Local::now()],
            )
            .with_context(|| format!("Failed to save tag '{}'.", tag.name))?;
        Ok(())
    }

    pub fn tags(&self) -> Result<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, color, description FROM tags ORDER BY name")
            .context("Failed to fetch tags from database.")?;
        let rows = stmt.query_map([], |row| {
            Ok(Tag {
                name: row.get(0)?,
                color: row.get(1)?,
                description: row.get(2)?,
            })
        })?;
        let tags = rows
            .collect::<rusqlite::Result<Vec<Tag>>>()
            .context("Failed to read tags from database.")?;
        Ok(tags)
    }

    fn tag_id(&self, name: &str) -> Result<i64> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO tags (name, color, description, created_at) VALUES (?1, ?2, '', ?3)",
                params![name, DEFAULT_TAG_COLOR, Local::now()],
            )
            .with_context(|| format!("Failed to create tag '{}'.", name))?;
        let id = self
            .conn
            .query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| row.get(0))
            .with_context(|| format!("Failed to fetch tag '{}'.", name))?;
        Ok(id)
    }

    fn write_task_tags(&self, task_id: TaskId, tags: &BTreeSet<String>) -> Result<()> {
        self.conn
            .execute("DELETE FROM task_tags WHERE task_id = ?1", params![task_id])
            .context("Failed to clear task tags.")?;
        for name in tags {
            let tag_id = self.tag_id(name)?;
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO task_tags (task_id, tag_id) VALUES (?1, ?2)",
                    params![task_id, tag_id],
                )
                .context("Failed to link tag to task.")?;
        }
        Ok(())
    }

    fn read_task_tags(&self, task_id: TaskId) -> Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.name FROM tags t JOIN task_tags tt ON t.id = tt.tag_id WHERE tt.task_id = ?1",
        )?;
        let names = stmt
            .query_map(params![task_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<String>>>()
            .context("Failed to read task tags.")?;
        Ok(names)
    }

    fn with_tags(&self, mut tasks: Vec<Task>) -> Result<Vec<Task>> {
        for task in tasks.iter_mut() {
            task.tags = self.read_task_tags(task.id)?;
        }
        Ok(tasks)
    }
}

/// Create every table and index. Safe to run on an existing database.
pub fn init_schema(db: &Connection) -> Result<()> {
    db.execute(
        "CREATE TABLE IF NOT EXISTS users (
                  id              INTEGER PRIMARY KEY AUTOINCREMENT,
                  username        TEXT UNIQUE NOT NULL,
                  created_at      TEXT NOT NULL
                  )",
        [],
    )
    .context("Failed to create users table.")?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS tasks (
                  id              INTEGER PRIMARY KEY AUTOINCREMENT,
                  title           TEXT NOT NULL,
                  description     TEXT NOT NULL DEFAULT '',
                  completed       INTEGER NOT NULL DEFAULT 0,
                  parent_id       INTEGER REFERENCES tasks (id) ON DELETE CASCADE,
                  user_id         INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
                  priority        INTEGER NOT NULL DEFAULT 2,
                  due_at          TEXT,
                  created_at      TEXT NOT NULL,
                  updated_at      TEXT NOT NULL,
                  completed_at    TEXT,
                  properties      TEXT
                  )",
        [],
    )
    .context("Failed to create tasks table.")?;

    db.execute("CREATE INDEX IF NOT EXISTS task_user ON tasks (user_id)", [])
        .context("Failed to create user index on tasks table.")?;
    db.execute("CREATE INDEX IF NOT EXISTS task_parent ON tasks (parent_id)", [])
        .context("Failed to create parent index on tasks table.")?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS tags (
                  id              INTEGER PRIMARY KEY AUTOINCREMENT,
                  name            TEXT UNIQUE NOT NULL,
                  color           TEXT NOT NULL DEFAULT '#3498DB',
                  description     TEXT NOT NULL DEFAULT '',
                  created_at      TEXT NOT NULL
                  )",
        [],
    )
    .context("Failed to create tags table.")?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS task_tags (
                  task_id         INTEGER NOT NULL REFERENCES tasks (id) ON DELETE CASCADE,
                  tag_id          INTEGER NOT NULL REFERENCES tags (id) ON DELETE CASCADE,
                  PRIMARY KEY (task_id, tag_id)
                  )",
        [],
    )
    .context("Failed to create task_tags table.")?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS routines (
                  id              INTEGER PRIMARY KEY AUTOINCREMENT,
                  user_id         INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
                  name            TEXT NOT NULL,
                  description     TEXT NOT NULL DEFAULT '',
                  repeat_type     TEXT NOT NULL,
                  repeat_interval INTEGER NOT NULL DEFAULT 1,
                  custom_days     INTEGER NOT NULL DEFAULT 0,
                  is_active       INTEGER NOT NULL DEFAULT 1,
                  created_at      TEXT NOT NULL,
                  last_generated  TEXT,
                  start_date      TEXT NOT NULL,
                  end_date        TEXT,
                  preferred_time  TEXT,
                  templates       TEXT NOT NULL DEFAULT '[]'
                  )",
        [],
    )
    .context("Failed to create routines table.")?;

    db.execute("CREATE INDEX IF NOT EXISTS routine_user ON routines (user_id)", [])
        .context("Failed to create user index on routines table.")?;

    Ok(())
}

fn json_error(column: usize, err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

/// Return a task from a row in `TASK_COLUMNS` order. Tags are loaded
/// separately.
pub fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    let level: i64 = row.get(6)?;
    let properties = match row.get::<_, Option<String>>(11)? {
        Some(text) if !text.is_empty() => serde_json::from_str(&text).map_err(|e| json_error(11, e))?,
        _ => Map::new(),
    };
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        completed: row.get(3)?,
        parent_id: row.get(4)?,
        user_id: row.get(5)?,
        priority: Priority::from_level(level).ok_or(rusqlite::Error::IntegralValueOutOfRange(6, level))?,
        due_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        completed_at: row.get(10)?,
        tags: BTreeSet::new(),
        properties,
    })
}

/// Return a routine from a row in `ROUTINE_COLUMNS` order.
pub fn routine_from_row(row: &Row) -> rusqlite::Result<Routine> {
    let kind = row
        .get::<_, String>(4)?
        .parse::<RepeatKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let templates: Vec<TaskTemplate> =
        serde_json::from_str(&row.get::<_, String>(13)?).map_err(|e| json_error(13, e))?;
    Ok(Routine {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        rule: RepeatRule {
            kind,
            interval: row.get(5)?,
            custom_days: WeekdaySet::from_bits(row.get(6)?),
        },
        active: row.get(7)?,
        created_at: row.get(8)?,
        last_generated: row.get(9)?,
        start_date: row.get(10)?,
        end_date: row.get(11)?,
        preferred_time: row.get(12)?,
        templates,
    })
}

impl TaskStore for Database {
    fn create_task(
        &self,
        title: &str,
        description: &str,
        user_id: UserId,
        parent_id: Option<TaskId>,
    ) -> Result<Task> {
        let title = validate::task_title(title)?;
        let description = validate::sanitize(description);
        let mut task = Task::new(0, title, description, user_id, parent_id, Local::now());

        self.conn
            .execute(
                "INSERT INTO tasks (title, description, completed, parent_id, user_id, priority, due_at,
                                    created_at, updated_at, completed_at, properties)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    task.title,
                    task.description,
                    task.completed,
                    task.parent_id,
                    task.user_id,
                    task.priority.level(),
                    task.due_at,
                    task.created_at,
                    task.updated_at,
                    task.completed_at,
                    serde_json::to_string(&task.properties)?,
                ],
            )
            .with_context(|| format!("Failed to insert task '{}' to database.", task.title))?;
        task.id = self.conn.last_insert_rowid();

        info!(task_id = task.id, parent_id = ?task.parent_id, title = %task.title, "task created");
        Ok(task)
    }

    fn update_task(&self, task: &mut Task) -> Result<bool> {
        task.updated_at = Local::now();
        let changed = self
            .conn
            .execute(
                "UPDATE tasks SET title = ?1, description = ?2, completed = ?3, parent_id = ?4,
                                  priority = ?5, due_at = ?6, updated_at = ?7, completed_at = ?8,
                                  properties = ?9
                 WHERE id = ?10",
                params![
                    task.title,
                    task.description,
                    task.completed,
                    task.parent_id,
                    task.priority.level(),
                    task.due_at,
                    task.updated_at,
                    task.completed_at,
                    serde_json::to_string(&task.properties)?,
                    task.id,
                ],
            )
            .with_context(|| format!("Failed to update task {} in database.", task.id))?;

        if changed == 0 {
            warn!(task_id = task.id, "update of unknown task");
            return Ok(false);
        }
        self.write_task_tags(task.id, &task.tags)?;
        debug!(task_id = task.id, "task updated");
        Ok(true)
    }

    fn load_task(&self, id: TaskId) -> Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                params![id],
                task_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to obtain task {} from database.", id))?;
        match task {
            Some(mut task) => {
                task.tags = self.read_task_tags(task.id)?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    fn load_user_tasks(&self, user_id: UserId, include_completed: bool) -> Result<Vec<Task>> {
        let filter = if include_completed { "" } else { " AND completed = 0" };
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM tasks WHERE user_id = ?1{} ORDER BY id",
                TASK_COLUMNS, filter
            ))
            .context("Failed to fetch tasks from database.")?;
        let tasks = stmt
            .query_map(params![user_id], task_from_row)?
            .collect::<rusqlite::Result<Vec<Task>>>()
            .context("Failed to read tasks from database.")?;
        debug!(user_id, count = tasks.len(), "tasks loaded");
        self.with_tags(tasks)
    }

    fn delete_task(&self, id: TaskId) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .with_context(|| format!("Failed to remove task {} from database.", id))?;
        if deleted > 0 {
            info!(task_id = id, "task deleted");
        }
        Ok(deleted > 0)
    }
}

impl RoutineStore for Database {
    fn insert_routine(&self, routine: &mut Routine) -> Result<RoutineId> {
        routine.validate()?;
        self.conn
            .execute(
                "INSERT INTO routines (user_id, name, description, repeat_type, repeat_interval, custom_days,
                                       is_active, created_at, last_generated, start_date, end_date,
                                       preferred_time, templates)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    routine.user_id,
                    routine.name,
                    routine.description,
                    routine.rule.kind.as_str(),
                    routine.rule.interval,
                    routine.rule.custom_days.bits(),
                    routine.active,
                    routine.created_at,
                    routine.last_generated,
                    routine.start_date,
                    routine.end_date,
                    routine.preferred_time,
                    serde_json::to_string(&routine.templates)?,
                ],
            )
            .with_context(|| format!("Failed to insert routine '{}' to database.", routine.name))?;
        let id = self.conn.last_insert_rowid();
        routine.id = Some(id);
        info!(routine_id = id, name = %routine.name, rule = %routine.rule, "routine created");
        Ok(id)
    }

    fn load_routine(&self, id: RoutineId) -> Result<Option<Routine>> {
        let routine = self
            .conn
            .query_row(
                &format!("SELECT {} FROM routines WHERE id = ?1", ROUTINE_COLUMNS),
                params![id],
                routine_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to obtain routine {} from database.", id))?;
        Ok(routine)
    }

    fn load_user_routines(&self, user_id: UserId, active_only: bool) -> Result<Vec<Routine>> {
        let filter = if active_only { " AND is_active = 1" } else { "" };
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM routines WHERE user_id = ?1{} ORDER BY id",
                ROUTINE_COLUMNS, filter
            ))
            .context("Failed to fetch routines from database.")?;
        let routines = stmt
            .query_map(params![user_id], routine_from_row)?
            .collect::<rusqlite::Result<Vec<Routine>>>()
            .context("Failed to read routines from database.")?;
        debug!(user_id, count = routines.len(), active_only, "routines loaded");
        Ok(routines)
    }

    fn update_routine(&self, routine: &Routine) -> Result<bool> {
        let id = routine
            .id
            .ok_or_else(|| anyhow!("Routine '{}' has not been saved yet.", routine.name))?;
        routine.validate()?;
        let changed = self
            .conn
            .execute(
                "UPDATE routines SET name = ?1, description = ?2, repeat_type = ?3, repeat_interval = ?4,
                                     custom_days = ?5, is_active = ?6, last_generated = ?7, start_date = ?8,
                                     end_date = ?9, preferred_time = ?10, templates = ?11
                 WHERE id = ?12",
                params![
                    routine.name,
                    routine.description,
                    routine.rule.kind.as_str(),
                    routine.rule.interval,
                    routine.rule.custom_days.bits(),
                    routine.active,
                    routine.last_generated,
                    routine.start_date,
                    routine.end_date,
                    routine.preferred_time,
                    serde_json::to_string(&routine.templates)?,
                    id,
                ],
            )
            .with_context(|| format!("Failed to update routine {} in database.", id))?;
        if changed == 0 {
            warn!(routine_id = id, "update of unknown routine");
        }
        Ok(changed > 0)
    }

    fn delete_routine(&self, id: RoutineId) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM routines WHERE id = ?1", params![id])
            .with_context(|| format!("Failed to remove routine {} from database.", id))?;
        if deleted > 0 {
            info!(routine_id = id, "routine deleted");
        }
        Ok(deleted > 0)
    }
}
