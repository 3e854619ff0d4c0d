//! Task registry: named shell commands loaded from a YAML file
//!
//! The registry is immutable after load; changing the task file requires a
//! process restart.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// A named, pre-configured shell command.
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub name: String,
    pub command: String,
}

/// Immutable collection of tasks keyed by case-insensitive name.
#[derive(Debug, Default, Deserialize)]
pub struct TaskBook {
    #[serde(default)]
    tasks: Vec<Task>,
}

impl TaskBook {
    /// Read and parse the YAML task file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("can't load task file {}", path.display()))?;
        let book: TaskBook = serde_yaml::from_str(&raw).context("can't parse task file")?;
        log::info!("loaded {} tasks from {}", book.tasks.len(), path.display());
        Ok(book)
    }

    /// Build a registry from an in-memory task list.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Look up a task command by name, ignoring ASCII case. On duplicate
    /// names the first entry wins.
    pub fn command(&self, name: &str) -> Option<&str> {
        self.tasks
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.command.as_str())
    }
}
