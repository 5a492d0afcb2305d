use crate::model::{Task, TaskId, TaskTree, UserId};
use crate::store::TaskStore;
use crate::validate;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use tracing::info;

/// Tree-aware task operations on top of a [`TaskStore`].
pub struct TaskManager<'a> {
    store: &'a dyn TaskStore,
}

impl<'a> TaskManager<'a> {
    pub fn new(store: &'a dyn TaskStore) -> TaskManager<'a> {
        TaskManager { store }
    }

    pub fn create_task(
        &self,
        title: &str,
        description: &str,
        user_id: UserId,
        parent_id: Option<TaskId>,
    ) -> Result<Task> {
        self.store.create_task(title, description, user_id, parent_id)
    }

    /// Like [`TaskManager::create_task`], but every tag is checked before
    /// anything is written.
    pub fn create_tagged(
        &self,
        title: &str,
        description: &str,
        user_id: UserId,
        parent_id: Option<TaskId>,
        tags: &[String],
    ) -> Result<Task> {
        let tags = tags
            .iter()
            .map(|name| validate::tag_name(name))
            .collect::<Result<Vec<_>, _>>()?;
        let mut task = self.store.create_task(title, description, user_id, parent_id)?;
        if !tags.is_empty() {
            task.tags.extend(tags);
            self.store.update_task(&mut task)?;
        }
        Ok(task)
    }

    pub fn task(&self, id: TaskId) -> Result<Option<Task>> {
        self.store.load_task(id)
    }

    pub fn update(&self, task: &mut Task) -> Result<bool> {
        self.store.update_task(task)
    }

    pub fn tree(&self, user_id: UserId, include_completed: bool) -> Result<TaskTree> {
        Ok(TaskTree::from_tasks(self.store.load_user_tasks(user_id, include_completed)?))
    }

    /// Mark a task done (together with its whole subtree) or open again
    /// (only the task itself). Returns the ids written back.
    pub fn complete(&self, user_id: UserId, id: TaskId, completed: bool) -> Result<Vec<TaskId>> {
        let mut tree = self.tree(user_id, true)?;
        if tree.get(id).is_none() {
            return Err(anyhow!("Task {} not found.", id));
        }
        let touched = tree.mark_completed(id, completed, Local::now());
        for task_id in &touched {
            if let Some(task) = tree.get_mut(*task_id) {
                self.store.update_task(task)?;
            }
        }
        info!(task_id = id, completed, count = touched.len(), "completion changed");
        Ok(touched)
    }

    /// Delete a task and everything below it.
    pub fn delete(&self, id: TaskId) -> Result<bool> {
        self.store.delete_task(id)
    }

    /// Case-insensitive match on title or description. An empty query
    /// matches nothing.
    pub fn search(&self, user_id: UserId, query: &str) -> Result<Vec<Task>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let tasks = self.store.load_user_tasks(user_id, true)?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.title.to_lowercase().contains(&query) || t.description.to_lowercase().contains(&query))
            .collect())
    }

    pub fn overdue(&self, user_id: UserId, now: DateTime<Local>) -> Result<Vec<Task>> {
        let tasks = self.store.load_user_tasks(user_id, false)?;
        Ok(tasks.into_iter().filter(|t| t.is_overdue(now)).collect())
    }

    pub fn tag(&self, id: TaskId, name: &str) -> Result<bool> {
        let mut task = self.require(id)?;
        if !task.add_tag(name, Local::now())? {
            return Ok(false);
        }
        self.store.update_task(&mut task)
    }

    pub fn untag(&self, id: TaskId, name: &str) -> Result<bool> {
        let mut task = self.require(id)?;
        if !task.remove_tag(name, Local::now()) {
            return Ok(false);
        }
        self.store.update_task(&mut task)
    }

    fn require(&self, id: TaskId) -> Result<Task> {
        self.store
            .load_task(id)?
            .ok_or_else(|| anyhow!("Task {} not found.", id))
    }
}
