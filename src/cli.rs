use std::path::PathBuf;
use std::time::Duration;

use humantime::parse_duration;
use structopt::StructOpt;

use crate::model::StatusFilter;

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Run the todo API server.
    Serve {
        /// Address to listen on.
        #[structopt(long, env = "TODOS_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on.
        #[structopt(short, long, env = "PORT", default_value = "5000")]
        port: u16,

        /// Use a different database file.
        #[structopt(parse(from_os_str), short, long, env = "TODOS_DATABASE")]
        database: Option<PathBuf>,
    },
    /// List todos.
    List {
        /// all, completed or pending.
        #[structopt(short, long, default_value = "all")]
        status: StatusFilter,

        /// Only show this category.
        #[structopt(short, long)]
        category: Option<String>,

        /// Only show todos whose text contains this (case-insensitive).
        #[structopt(long)]
        search: Option<String>,
    },
    /// Add a todo.
    Add {
        /// The task text.
        #[structopt(required = true)]
        words: Vec<String>,

        /// General, Work, Personal, Shopping or any other label.
        #[structopt(short, long)]
        category: Option<String>,

        /// Due date, YYYY-MM-DD.
        #[structopt(short, long)]
        due: Option<String>,
    },
    /// Mark the todo at a list position as done, or as not done again.
    Toggle {
        #[structopt()]
        position: usize,
    },
    /// Delete the todo at a list position.
    Rm {
        #[structopt()]
        position: usize,
    },
    /// Delete every completed todo.
    Clear,
    /// Check that the server is up.
    Ping,
    /// Interactive session.
    Shell,
}

#[derive(Debug, StructOpt)]
#[structopt(name = "todos", about = "A minimal task tracker.")]
pub struct CommandLineArgs {
    #[structopt(subcommand)]
    pub action: Command,

    /// Base URL of the todo API.
    #[structopt(long, env = "TODOS_API", default_value = "http://localhost:5000")]
    pub api: String,

    /// Request timeout (parse_duration).
    #[structopt(long, default_value = "10s", parse(try_from_str = parse_duration))]
    pub timeout: Duration,
}

/// A line typed in the interactive shell.
#[derive(Debug, StructOpt, PartialEq)]
#[structopt(name = "todos shell")]
pub enum ShellCommand {
    /// Add a todo: add <text> [-c category] [-d YYYY-MM-DD]
    Add {
        #[structopt(required = true)]
        words: Vec<String>,

        #[structopt(short, long)]
        category: Option<String>,

        #[structopt(short, long)]
        due: Option<String>,
    },
    /// Mark the todo at a position as done or not done.
    Toggle {
        #[structopt()]
        position: usize,
    },
    /// Delete the todo at a position.
    Rm {
        #[structopt()]
        position: usize,
    },
    /// Delete every completed todo.
    Clear,
    /// Show all, completed or pending todos.
    Status {
        #[structopt()]
        status: StatusFilter,
    },
    /// Show one category, or all of them without a name.
    Category {
        #[structopt()]
        name: Option<String>,
    },
    /// Set the search text without searching.
    Type {
        #[structopt()]
        words: Vec<String>,
    },
    /// Search for the given text, or for the text set with `type`.
    Search {
        #[structopt()]
        words: Vec<String>,
    },
    /// Reload the list.
    Refresh,
    /// Leave the shell.
    Quit,
}

impl ShellCommand {
    /// Parse one shell line. `Ok(None)` for a blank line; the error carries
    /// clap's usage or help text.
    pub fn parse_line(line: &str) -> Result<Option<ShellCommand>, String> {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return Ok(None);
        }
        ShellCommand::from_iter_safe(std::iter::once("todos").chain(words))
            .map(Some)
            .map_err(|e| e.message)
    }
}
