use crate::cli::{RoutineCommand, TagCommand, TaskCommand};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, NaiveDate};
use humantime::format_duration;
use prettytable::Table;
use routinely::model::{Tag, Task, TaskId, TaskState, TaskTree};
use routinely::recurrence;
use routinely::routine::{RepeatKind, RepeatRule, Routine, RoutineId};
use routinely::tasks::TaskManager;
use routinely::{Database, Scheduler, Session};
use std::time::Duration as STDDuration;

const TITLE_WIDTH: usize = 40;

pub fn task(db: &Database, session: &Session, cmd: TaskCommand) -> Result<()> {
    let manager = TaskManager::new(db);
    let now = Local::now();
    match cmd {
        TaskCommand::Add {
            title,
            description,
            parent,
            priority,
            due,
            tag,
        } => {
            if let Some(parent) = parent {
                owned_task(&manager, session, parent)?;
            }
            let mut task = manager.create_tagged(&title, &description, session.user_id, parent, &tag)?;
            task.priority = priority;
            task.due_at = due;
            manager.update(&mut task)?;
            println!("{}. {}", task.id, task.title);
        }
        TaskCommand::List { all } => {
            let tree = manager.tree(session.user_id, all)?;
            if tree.is_empty() {
                println!("No tasks. Use 'routinely task add' to write one.");
            } else {
                print_tree(&tree, now);
            }
        }
        TaskCommand::Done { id } => {
            let touched = manager.complete(session.user_id, id, true)?;
            println!("Completed {} task(s).", touched.len());
        }
        TaskCommand::Undo { id } => {
            manager.complete(session.user_id, id, false)?;
            println!("Task {} is open again.", id);
        }
        TaskCommand::Rm { id } => {
            owned_task(&manager, session, id)?;
            manager.delete(id)?;
            println!("Task {} removed.", id);
        }
        TaskCommand::Search { query } => print_tasks(&manager.search(session.user_id, &query)?, now),
        TaskCommand::Overdue => print_tasks(&manager.overdue(session.user_id, now)?, now),
        TaskCommand::Tag { id, name } => {
            owned_task(&manager, session, id)?;
            if !manager.tag(id, &name)? {
                println!("Task {} is already tagged '{}'.", id, name.trim());
            }
        }
        TaskCommand::Untag { id, name } => {
            owned_task(&manager, session, id)?;
            if !manager.untag(id, &name)? {
                println!("Task {} is not tagged '{}'.", id, name.trim());
            }
        }
    }
    Ok(())
}

pub fn routine(db: &Database, session: &Session, cmd: RoutineCommand) -> Result<()> {
    let scheduler = Scheduler::new(db, db);
    match cmd {
        RoutineCommand::Add {
            name,
            description,
            repeat,
            every,
            days,
            start,
            end,
            at,
            template,
        } => {
            if repeat != RepeatKind::Custom && !days.is_empty() {
                println!("--days only applies to custom routines, ignoring it.");
            }
            let mut routine = Routine::new(&name, &description, session.user_id, Local::now());
            routine.rule = RepeatRule::with_days(repeat, every, days);
            if let Some(start) = start {
                routine.start_date = start;
            }
            routine.end_date = end;
            routine.preferred_time = at;
            for title in &template {
                routine.add_template(title, "");
            }
            let id = scheduler.insert_routine(&mut routine)?;
            println!("{}. {} ({})", id, routine.name, routine.rule);
        }
        RoutineCommand::List { all } => {
            let routines = scheduler.user_routines(session.user_id, !all)?;
            if routines.is_empty() {
                println!("No routines. Use 'routinely routine add' to create one.");
            } else {
                print_routines(&routines);
            }
        }
        RoutineCommand::Show { id, next } => {
            let routine = owned_routine(&scheduler, session, id)?;
            print_routine(&routine, recurrence::today(), next);
        }
        RoutineCommand::TemplateAdd { id, title, description } => {
            let mut routine = owned_routine(&scheduler, session, id)?;
            routine.add_template(&title, &description);
            scheduler.update_routine(&routine)?;
            println!("{} now has {} template(s).", routine.name, routine.templates.len());
        }
        RoutineCommand::TemplateRm { id, title } => {
            let mut routine = owned_routine(&scheduler, session, id)?;
            if routine.remove_template(&title) {
                scheduler.update_routine(&routine)?;
                println!("{} now has {} template(s).", routine.name, routine.templates.len());
            } else {
                println!("{} has no template '{}'.", routine.name, title);
            }
        }
        RoutineCommand::Activate { id } => {
            owned_routine(&scheduler, session, id)?;
            scheduler.activate(id)?;
            println!("Routine {} is active.", id);
        }
        RoutineCommand::Deactivate { id } => {
            owned_routine(&scheduler, session, id)?;
            scheduler.deactivate(id)?;
            println!("Routine {} is paused.", id);
        }
        RoutineCommand::Rm { id } => {
            owned_routine(&scheduler, session, id)?;
            scheduler.delete_routine(id)?;
            println!("Routine {} removed.", id);
        }
    }
    Ok(())
}

pub fn tag(db: &Database, cmd: TagCommand) -> Result<()> {
    match cmd {
        TagCommand::Add {
            name,
            color,
            description,
        } => {
            let mut tag = Tag::new(&name)?.with_color(&color)?;
            tag.description = description.trim().to_string();
            db.save_tag(&tag)?;
            println!("{} {}", tag.name, tag.color);
        }
        TagCommand::List => {
            let mut table = Table::new();
            table.add_row(row!["tag", "color", "description"]);
            for tag in db.tags()? {
                table.add_row(row![tag.name, tag.color, tag.description]);
            }
            table.printstd();
        }
    }
    Ok(())
}

pub fn generate(db: &Database, session: &Session, date: Option<NaiveDate>) -> Result<()> {
    let scheduler = Scheduler::new(db, db);
    let tasks = scheduler.generate_for_user(session, date)?;
    if tasks.is_empty() {
        println!("Nothing to generate.");
    } else {
        print_tasks(&tasks, Local::now());
    }
    Ok(())
}

fn owned_task(manager: &TaskManager, session: &Session, id: TaskId) -> Result<Task> {
    match manager.task(id)? {
        Some(task) if task.user_id == session.user_id => Ok(task),
        _ => Err(anyhow!("Task {} not found.", id)),
    }
}

fn owned_routine(scheduler: &Scheduler, session: &Session, id: RoutineId) -> Result<Routine> {
    match scheduler.routine(id)? {
        Some(routine) if routine.user_id == session.user_id => Ok(routine),
        _ => Err(anyhow!("Routine {} not found.", id)),
    }
}

fn print_tree(tree: &TaskTree, now: DateTime<Local>) {
    let mut table = Table::new();
    table.add_row(row!["id", "task", "priority", "due", "state", "progress", "tags"]);

    let mut stack: Vec<(TaskId, usize)> = tree.roots().into_iter().rev().map(|id| (id, 0)).collect();
    while let Some((id, depth)) = stack.pop() {
        if let Some(task) = tree.get(id) {
            let progress = tree.completion_percentage(id).unwrap_or(0.0);
            table.add_row(row![
                task.id,
                indent(&task.title, depth),
                task.priority,
                fmt_due(task, now),
                fmt_state(task, now),
                format!("{:.0}%", progress * 100.0),
                fmt_tags(task)
            ]);
        }
        stack.extend(tree.children(id).iter().rev().map(|child| (*child, depth + 1)));
    }

    table.printstd();
}

fn print_tasks(tasks: &[Task], now: DateTime<Local>) {
    if tasks.is_empty() {
        println!("No matching tasks.");
        return;
    }
    let mut table = Table::new();
    table.add_row(row!["id", "task", "parent", "due", "state", "tags"]);
    for task in tasks {
        let parent = task.parent_id.map(|p| p.to_string()).unwrap_or_default();
        table.add_row(row![
            task.id,
            textwrap::fill(&task.title, TITLE_WIDTH),
            parent,
            fmt_due(task, now),
            fmt_state(task, now),
            fmt_tags(task)
        ]);
    }
    table.printstd();
}

fn print_routines(routines: &[Routine]) {
    let mut table = Table::new();
    table.add_row(row!["id", "routine", "repeat", "active", "from", "until", "at", "templates", "last run"]);
    for routine in routines {
        table.add_row(row![
            routine.id.map(|id| id.to_string()).unwrap_or_default(),
            textwrap::fill(&routine.name, TITLE_WIDTH),
            routine.rule,
            if routine.active { "yes" } else { "no" },
            routine.start_date,
            routine.end_date.map(|d| d.to_string()).unwrap_or_default(),
            routine.preferred_time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default(),
            routine.templates.len(),
            routine
                .last_generated
                .map(|t| t.format("%F %R").to_string())
                .unwrap_or_else(|| "never".to_string())
        ]);
    }
    table.printstd();
}

fn print_routine(routine: &Routine, today: NaiveDate, next: usize) {
    print_routines(std::slice::from_ref(routine));
    if !routine.description.is_empty() {
        println!("{}", textwrap::fill(&routine.description, TITLE_WIDTH * 2));
    }

    let mut table = Table::new();
    table.add_row(row!["#", "template", "description"]);
    for (i, template) in routine.templates.iter().enumerate() {
        table.add_row(row![i + 1, template.title, textwrap::fill(&template.description, TITLE_WIDTH)]);
    }
    table.printstd();

    let upcoming = recurrence::upcoming(routine, today, next);
    if upcoming.is_empty() {
        println!("No upcoming dates.");
    } else {
        let dates: Vec<String> = upcoming.iter().map(|d| d.format("%a %F").to_string()).collect();
        println!("Next: {}", dates.join(", "));
    }
}

fn indent(title: &str, depth: usize) -> String {
    let wrapped = textwrap::fill(title, TITLE_WIDTH);
    let pad = "  ".repeat(depth);
    wrapped
        .lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn fmt_due(task: &Task, now: DateTime<Local>) -> String {
    let due = match task.due_at {
        Some(due) => due,
        None => return String::new(),
    };
    let label = due.format("%F %R").to_string();
    if !task.is_overdue(now) {
        return label;
    }
    let late = (now.naive_local() - due).num_minutes().max(0) as u64;
    format!("{} ({} late)", label, format_duration(STDDuration::from_secs(late * 60)))
}

fn fmt_state(task: &Task, now: DateTime<Local>) -> &'static str {
    match task.state(now) {
        TaskState::Done => "done",
        TaskState::Overdue => "overdue",
        TaskState::Pending => "pending",
    }
}

fn fmt_tags(task: &Task) -> String {
    task.tags.iter().cloned().collect::<Vec<_>>().join(", ")
}
