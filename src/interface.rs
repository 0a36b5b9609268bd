use std::io::{BufRead, Write};
use std::time::Duration as STDDuration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use humantime::format_duration;
use prettytable::Table;

use crate::cli::ShellCommand;
use crate::client::{TodoApi, TodoApp, CATEGORIES};
use crate::model::{NewTodo, Todo};

const TASK_WIDTH: usize = 40;

const SHELL_HELP: &str = "Commands: add <text> [-c category] [-d YYYY-MM-DD], toggle <n>, rm <n>, \
clear, status <all|completed|pending>, category [name], type [text], search [text], \
refresh, help, quit";

/// Render the whole view: the active filters, the todo table and the
/// loading, error and empty-list notices.
pub fn render<A: TodoApi>(app: &TodoApp<A>) -> String {
    render_at(app, Utc::now())
}

fn render_at<A: TodoApi>(app: &TodoApp<A>, now: DateTime<Utc>) -> String {
    let filter = app.filter();
    let mut view = format!(
        "Status: {}  Category: {}  Search: {}\n",
        filter.status,
        filter.category.as_deref().unwrap_or("All"),
        filter.search.as_deref().map_or_else(|| "-".to_string(), |s| format!("\"{}\"", s)),
    );
    if app.search_input() != filter.search.as_deref().unwrap_or("") {
        view.push_str(&format!("(typed: \"{}\", use `search` to apply)\n", app.search_input()));
    }

    if !app.todos().is_empty() {
        let mut table = Table::new();
        table.add_row(row!["#", "done", "task", "category", "due", "age"]);
        for (index, todo) in app.todos().iter().enumerate() {
            table.add_row(row![
                index + 1,
                fmt_completed(todo),
                textwrap::fill(&todo.task, TASK_WIDTH),
                todo.category,
                fmt_due_date(todo),
                fmt_age(todo.created_at, now)
            ]);
        }
        view.push_str(&table.to_string());
    }

    if app.loading() {
        view.push_str("Loading...\n");
    }
    if let Some(error) = app.error() {
        view.push_str(&format!("Error: {}\n", error));
    }
    if !app.loading() && app.todos().is_empty() {
        view.push_str("No todos yet. Add one above!\n");
    }
    view
}

fn fmt_completed(todo: &Todo) -> &'static str {
    if todo.completed {
        "[x]"
    } else {
        "[ ]"
    }
}

fn fmt_due_date(todo: &Todo) -> String {
    todo.due_date
        .map(|due| due.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Time since creation, to the minute.
fn fmt_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - created_at).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }
    let minutes = (seconds / 60) as u64;
    format!("{} ago", format_duration(STDDuration::from_secs(minutes * 60)))
}

/// Identifier of the todo shown at a 1-based position. Sets the view error
/// when there is none.
fn id_at<A: TodoApi>(app: &mut TodoApp<A>, position: usize) -> Option<String> {
    let id = position
        .checked_sub(1)
        .and_then(|index| app.todos().get(index))
        .map(|todo| todo.id.clone());
    if id.is_none() {
        app.set_error(format!("No todo at position {}.", position));
    }
    id
}

/// Toggle the todo shown at `position`.
pub fn toggle_at<A: TodoApi>(app: &mut TodoApp<A>, position: usize) {
    if let Some(id) = id_at(app, position) {
        app.toggle(&id);
    }
}

/// Delete the todo shown at `position`.
pub fn remove_at<A: TodoApi>(app: &mut TodoApp<A>, position: usize) {
    if let Some(id) = id_at(app, position) {
        app.remove(&id);
    }
}

pub fn new_todo(words: Vec<String>, category: Option<String>, due: Option<String>) -> NewTodo {
    NewTodo {
        task: Some(words.join(" ")),
        category,
        due_date: due,
    }
}

/// Perform one shell command. Returns false when the shell should stop.
pub fn apply<A: TodoApi>(app: &mut TodoApp<A>, command: ShellCommand) -> bool {
    match command {
        ShellCommand::Add {
            words,
            category,
            due,
        } => {
            app.add(new_todo(words, category, due));
        }
        ShellCommand::Toggle { position } => toggle_at(app, position),
        ShellCommand::Rm { position } => remove_at(app, position),
        ShellCommand::Clear => app.clear_completed(),
        ShellCommand::Status { status } => app.set_status(status),
        ShellCommand::Category { name } => app.set_category(name),
        ShellCommand::Type { words } => app.set_search_input(words.join(" ")),
        ShellCommand::Search { words } => {
            if !words.is_empty() {
                app.set_search_input(words.join(" "));
            }
            app.search();
        }
        ShellCommand::Refresh => app.refresh(),
        ShellCommand::Quit => return false,
    }
    true
}

/// Run the interactive shell: load the list, then read one command per line
/// and re-render after each, until `quit` or end of input.
pub fn run_shell<A, R, W>(app: &mut TodoApp<A>, input: R, mut out: W) -> anyhow::Result<()>
where
    A: TodoApi,
    R: BufRead,
    W: Write,
{
    app.mount();
    write!(out, "{}", render(app))?;
    writeln!(out, "{}", SHELL_HELP)?;
    writeln!(out, "Categories: {}", CATEGORIES.join(", "))?;
    prompt(&mut out)?;

    for line in input.lines() {
        let line = line.context("Failed to read a command.")?;
        match line.trim() {
            "help" => writeln!(out, "{}", SHELL_HELP)?,
            _ => match ShellCommand::parse_line(&line) {
                Ok(None) => {}
                Ok(Some(command)) => {
                    if !apply(app, command) {
                        return Ok(());
                    }
                    write!(out, "{}", render(app))?;
                }
                Err(message) => writeln!(out, "{}", message)?,
            },
        }
        prompt(&mut out)?;
    }
    Ok(())
}

fn prompt<W: Write>(out: &mut W) -> anyhow::Result<()> {
    write!(out, "> ")?;
    out.flush().context("Failed to write to the terminal.")?;
    Ok(())
}
