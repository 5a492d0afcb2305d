use crate::model::Task;
use crate::recurrence;
use crate::routine::Routine;
use crate::store::TaskStore;
use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};
use tracing::{debug, info, warn};

/// Generate the tasks `routine` owes for `target` (today when `None`),
/// stamping `last_generated` with the current instant.
pub fn generate(routine: &mut Routine, store: &dyn TaskStore, target: Option<NaiveDate>) -> Result<Vec<Task>> {
    generate_at(routine, store, target, Local::now())
}

/// Same as [`generate`] with an explicit clock.
///
/// Several templates are grouped under a parent titled
/// `"{routine} - {date}"`; a single template gets the date appended to its
/// own title instead. Returns nothing, and changes nothing, when the routine
/// does not fire. Persisting the routine's new `last_generated` is left to
/// the caller.
pub fn generate_at(
    routine: &mut Routine,
    store: &dyn TaskStore,
    target: Option<NaiveDate>,
    now: DateTime<Local>,
) -> Result<Vec<Task>> {
    let target = target.unwrap_or_else(|| now.date_naive());
    if !recurrence::should_fire(routine, Some(target)) {
        debug!(routine = %routine.name, %target, "routine does not fire");
        return Ok(Vec::new());
    }

    let stamp = target.format("%Y-%m-%d").to_string();
    let single = routine.templates.len() == 1;
    let mut generated = Vec::with_capacity(routine.templates.len() + 1);

    let parent_id = if routine.templates.len() > 1 {
        let parent = store.create_task(
            &format!("{} - {}", routine.name, stamp),
            &routine.description,
            routine.user_id,
            None,
        )?;
        let id = parent.id;
        generated.push(parent);
        Some(id)
    } else {
        None
    };

    for template in &routine.templates {
        let title = if single {
            format!("{} - {}", template.title, stamp)
        } else {
            template.title.clone()
        };
        let mut task = store.create_task(&title, &template.description, routine.user_id, parent_id)?;

        let mut dirty = false;
        for (key, value) in &template.extra {
            task.set_property(key, value.clone(), now);
            dirty = true;
        }
        if let Some(at) = routine.preferred_time {
            task.due_at = Some(target.and_time(at));
            dirty = true;
        }
        if dirty && !store.update_task(&mut task)? {
            warn!(task_id = task.id, "generated task vanished before its update");
        }
        generated.push(task);
    }

    routine.last_generated = Some(now);
    info!(
        routine = %routine.name,
        %target,
        count = generated.len(),
        "routine generated tasks"
    );
    Ok(generated)
}
