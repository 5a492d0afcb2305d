use crate::error::ValidationError;
use crate::validate;
use chrono::{DateTime, Local, NaiveDateTime};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub type TaskId = i64;
pub type UserId = i64;

pub const DEFAULT_TAG_COLOR: &str = "#3498DB";

/// Task priority, stored as its level (1 to 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
    Urgent = 4,
}

impl Priority {
    pub fn level(self) -> i64 {
        self as i64
    }

    pub fn from_level(level: i64) -> Option<Priority> {
        match level {
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            3 => Some(Priority::High),
            4 => Some(Priority::Urgent),
            _ => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        };
        f.write_str(label)
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "1" => Ok(Priority::Low),
            "medium" | "2" => Ok(Priority::Medium),
            "high" | "3" => Ok(Priority::High),
            "urgent" | "4" => Ok(Priority::Urgent),
            _ => Err(ValidationError::Unknown {
                kind: "priority",
                value: s.to_string(),
            }),
        }
    }
}

/// A label that can be attached to any number of tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub color: String,
    pub description: String,
}

impl Tag {
    pub fn new(name: &str) -> Result<Tag, ValidationError> {
        Ok(Tag {
            name: validate::tag_name(name)?,
            color: DEFAULT_TAG_COLOR.to_string(),
            description: String::new(),
        })
    }

    pub fn with_color(mut self, color: &str) -> Result<Tag, ValidationError> {
        self.color = validate::hex_color(color)?;
        Ok(self)
    }
}

/// A single task, saved as an entry in the tasks table.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub priority: Priority,
    /// Wall-clock due time in the user's calendar.
    pub due_at: Option<NaiveDateTime>,
    pub user_id: UserId,
    pub parent_id: Option<TaskId>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    pub completed_at: Option<DateTime<Local>>,
    pub tags: BTreeSet<String>,
    pub properties: Map<String, Value>,
}

/// The state of a task at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Done,
    Overdue,
    Pending,
}

impl Task {
    /// A fresh, incomplete task. Only the store hands out ids, so this is
    /// meant to be called right after the row has been inserted.
    pub fn new(
        id: TaskId,
        title: String,
        description: String,
        user_id: UserId,
        parent_id: Option<TaskId>,
        now: DateTime<Local>,
    ) -> Task {
        Task {
            id,
            title,
            description,
            completed: false,
            priority: Priority::default(),
            due_at: None,
            user_id,
            parent_id,
            created_at: now,
            updated_at: now,
            completed_at: None,
            tags: BTreeSet::new(),
            properties: Map::new(),
        }
    }

    /// Marks this task alone; cascading to children is the job of [`TaskTree`].
    pub fn mark_completed(&mut self, completed: bool, now: DateTime<Local>) {
        self.completed = completed;
        self.completed_at = if completed { Some(now) } else { None };
        self.updated_at = now;
    }

    pub fn is_overdue(&self, now: DateTime<Local>) -> bool {
        match self.due_at {
            Some(due) if !self.completed => now.naive_local() > due,
            _ => false,
        }
    }

    pub fn state(&self, now: DateTime<Local>) -> TaskState {
        if self.completed {
            TaskState::Done
        } else if self.is_overdue(now) {
            TaskState::Overdue
        } else {
            TaskState::Pending
        }
    }

    pub fn set_property(&mut self, key: &str, value: Value, now: DateTime<Local>) {
        self.properties.insert(key.to_string(), value);
        self.updated_at = now;
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Returns false when the tag was already present.
    pub fn add_tag(&mut self, name: &str, now: DateTime<Local>) -> Result<bool, ValidationError> {
        let name = validate::tag_name(name)?;
        let added = self.tags.insert(name);
        if added {
            self.updated_at = now;
        }
        Ok(added)
    }

    pub fn remove_tag(&mut self, name: &str, now: DateTime<Local>) -> bool {
        let removed = self.tags.remove(name.trim());
        if removed {
            self.updated_at = now;
        }
        removed
    }
}

/// Arena of tasks keyed by id. Parent/child links are kept as ids so the
/// tree never holds references into itself.
#[derive(Debug, Default, Clone)]
pub struct TaskTree {
    tasks: BTreeMap<TaskId, Task>,
    children: BTreeMap<TaskId, Vec<TaskId>>,
}

impl TaskTree {
    pub fn new() -> TaskTree {
        TaskTree::default()
    }

    /// Build the hierarchy from a flat list. Tasks whose parent is not in
    /// the list become roots.
    pub fn from_tasks<I: IntoIterator<Item = Task>>(tasks: I) -> TaskTree {
        let mut tree = TaskTree::new();
        for task in tasks {
            tree.tasks.insert(task.id, task);
        }
        tree.relink();
        tree
    }

    fn relink(&mut self) {
        self.children.clear();
        for task in self.tasks.values() {
            if let Some(parent) = task.parent_id {
                if self.tasks.contains_key(&parent) {
                    self.children.entry(parent).or_default().push(task.id);
                }
            }
        }
    }

    pub fn insert(&mut self, task: Task) {
        self.tasks.insert(task.id, task);
        self.relink();
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn children(&self, id: TaskId) -> &[TaskId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| match t.parent_id {
                Some(parent) => !self.tasks.contains_key(&parent),
                None => true,
            })
            .map(|t| t.id)
            .collect()
    }

    /// Every task below `id`, in pre-order. Does not include `id` itself.
    pub fn descendants(&self, id: TaskId) -> Vec<TaskId> {
        let mut out = Vec::new();
        let mut stack: Vec<TaskId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// Completion flows downward: completing a task completes its whole
    /// subtree, re-opening it only touches the task itself. Returns the ids
    /// that changed so the caller can persist them.
    pub fn mark_completed(&mut self, id: TaskId, completed: bool, now: DateTime<Local>) -> Vec<TaskId> {
        if !self.tasks.contains_key(&id) {
            return Vec::new();
        }
        let mut touched = vec![id];
        if completed {
            touched.extend(self.descendants(id));
        }
        for task_id in &touched {
            if let Some(task) = self.tasks.get_mut(task_id) {
                task.mark_completed(completed, now);
            }
        }
        touched
    }

    /// Fraction of direct children completed, 1.0 for a completed task and
    /// 0.0 for an open leaf.
    pub fn completion_percentage(&self, id: TaskId) -> Option<f64> {
        let task = self.tasks.get(&id)?;
        let children = self.children(id);
        if task.completed {
            return Some(1.0);
        }
        if children.is_empty() {
            return Some(0.0);
        }
        let done = children
            .iter()
            .filter_map(|c| self.tasks.get(c))
            .filter(|c| c.completed)
            .count();
        Some(done as f64 / children.len() as f64)
    }

    /// Re-parents `child` under `parent`. Refuses links that would make a
    /// task its own ancestor.
    pub fn attach(&mut self, child: TaskId, parent: TaskId) -> bool {
        if child == parent
            || !self.tasks.contains_key(&parent)
            || self.descendants(child).contains(&parent)
        {
            return false;
        }
        match self.tasks.get_mut(&child) {
            Some(task) => task.parent_id = Some(parent),
            None => return false,
        }
        self.relink();
        true
    }

    pub fn detach(&mut self, child: TaskId) -> bool {
        match self.tasks.get_mut(&child) {
            Some(task) if task.parent_id.is_some() => task.parent_id = None,
            _ => return false,
        }
        self.relink();
        true
    }

    /// Removes `id` and everything below it, deepest tasks first.
    pub fn remove_subtree(&mut self, id: TaskId) -> Vec<Task> {
        if !self.tasks.contains_key(&id) {
            return Vec::new();
        }
        let mut order = vec![id];
        order.extend(self.descendants(id));
        let removed = order
            .into_iter()
            .rev()
            .filter_map(|t| self.tasks.remove(&t))
            .collect();
        self.relink();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn task(id: TaskId, parent: Option<TaskId>) -> Task {
        Task::new(id, format!("task {}", id), String::new(), 1, parent, now())
    }

    // 1 -> (2 -> (4), 3)
    fn sample_tree() -> TaskTree {
        TaskTree::from_tasks(vec![task(4, Some(2)), task(1, None), task(2, Some(1)), task(3, Some(1))])
    }

    #[test]
    fn hierarchy_is_built_from_flat_list() {
        let tree = sample_tree();
        assert_eq!(tree.roots(), vec![1]);
        assert_eq!(tree.children(1), &[2, 3]);
        assert_eq!(tree.descendants(1), vec![2, 4, 3]);
    }

    #[test]
    fn orphans_become_roots() {
        let tree = TaskTree::from_tasks(vec![task(1, None), task(5, Some(99))]);
        assert_eq!(tree.roots(), vec![1, 5]);
    }

    #[test]
    fn completing_a_parent_cascades_to_all_descendants() {
        let mut tree = sample_tree();
        let touched = tree.mark_completed(1, true, now());
        assert_eq!(touched, vec![1, 2, 4, 3]);
        assert!(tree.iter().all(|t| t.completed && t.completed_at.is_some()));
    }

    #[test]
    fn reopening_does_not_cascade() {
        let mut tree = sample_tree();
        tree.mark_completed(1, true, now());
        let touched = tree.mark_completed(1, false, now());
        assert_eq!(touched, vec![1]);
        assert!(!tree.get(1).unwrap().completed);
        assert!(tree.get(2).unwrap().completed);
    }

    #[test]
    fn completion_percentage_counts_direct_children() {
        let mut tree = sample_tree();
        assert_eq!(tree.completion_percentage(1), Some(0.0));
        tree.mark_completed(3, true, now());
        assert_eq!(tree.completion_percentage(1), Some(0.5));
        assert_eq!(tree.completion_percentage(3), Some(1.0));
        assert_eq!(tree.completion_percentage(4), Some(0.0));
        tree.mark_completed(1, true, now());
        assert_eq!(tree.completion_percentage(1), Some(1.0));
        assert_eq!(tree.completion_percentage(42), None);
    }

    #[test]
    fn attach_refuses_cycles() {
        let mut tree = sample_tree();
        assert!(!tree.attach(1, 4));
        assert!(!tree.attach(2, 2));
        assert!(tree.attach(4, 3));
        assert_eq!(tree.children(3), &[4]);
        assert!(tree.children(2).is_empty());
        assert!(tree.detach(4));
        assert_eq!(tree.roots(), vec![1, 4]);
    }

    #[test]
    fn remove_subtree_returns_deepest_first() {
        let mut tree = sample_tree();
        let removed: Vec<TaskId> = tree.remove_subtree(2).iter().map(|t| t.id).collect();
        assert_eq!(removed, vec![4, 2]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.children(1), &[3]);
    }

    #[test]
    fn overdue_ignores_completed_tasks() {
        let mut t = task(1, None);
        assert!(!t.is_overdue(now()));
        t.due_at = Some(NaiveDate::from_ymd_opt(2024, 2, 28).unwrap().and_hms_opt(8, 0, 0).unwrap());
        assert!(t.is_overdue(now()));
        assert_eq!(t.state(now()), TaskState::Overdue);
        t.mark_completed(true, now());
        assert!(!t.is_overdue(now()));
        assert_eq!(t.state(now()), TaskState::Done);
    }

    #[test]
    fn priorities_parse_and_order() {
        assert_eq!("Urgent".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!(Priority::Low < Priority::High);
        assert_eq!(Priority::from_level(2), Some(Priority::Medium));
        assert_eq!(Priority::from_level(7), None);
        assert!("someday".parse::<Priority>().is_err());
    }

    #[test]
    fn tags_are_validated() {
        let mut t = task(1, None);
        assert_eq!(t.add_tag(" health ", now()), Ok(true));
        assert_eq!(t.add_tag("health", now()), Ok(false));
        assert!(t.add_tag("no/slashes", now()).is_err());
        assert!(t.remove_tag("health", now()));
        assert!(t.tags.is_empty());
    }
}
