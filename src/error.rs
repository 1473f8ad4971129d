use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while composing the task graph. These surface before any
/// task runs.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task '{0}' is not registered")]
    UnknownTask(String),

    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Cycle detected in task graph at '{0}'")]
    Cycle(String),
}

/// Failure of a task run, as reported by the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Task '{name}' failed:\n{source}")]
    Task {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Task '{0}' panicked: {1}")]
    Panicked(String, String),

    #[error("Run cancelled before task '{0}' started")]
    Cancelled(String),
}

impl RunError {
    /// Name of the leaf task the failure originated from.
    pub fn task(&self) -> &str {
        match self {
            RunError::Task { name, .. } => name,
            RunError::Panicked(name, _) => name,
            RunError::Cancelled(name) => name,
        }
    }
}

/// Failures of external tools (renderer, shell commands).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("No command configured for {0}")]
    Empty(String),

    #[error("Couldn't start '{program}':\n{source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {}", describe_exit(.code))]
    Failed { program: String, code: Option<i32> },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when compiling stylesheets.
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Sass compilation failed for {} stylesheet(s):\n{}", .0.len(), format_failures(.0))]
    Compile(Vec<(Utf8PathBuf, String)>),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

fn format_failures(failures: &[(Utf8PathBuf, String)]) -> String {
    failures
        .iter()
        .map(|(path, message)| format!("{path}: {message}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors produced by the CSS post-processing chain.
#[derive(Debug, Error)]
pub enum PostError {
    #[error("Expected file '{0}' does not exist")]
    NotFound(Utf8PathBuf),

    #[error("CSS error in '{path}': {message}")]
    Css { path: Utf8PathBuf, message: String },

    #[error("Invalid browser targets {0:?}: {1}")]
    Targets(Vec<String>, String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),

    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    #[error(transparent)]
    PathFormat(#[from] camino::FromPathBufError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read '{0}':\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Couldn't parse '{0}':\n{1}")]
    Toml(Utf8PathBuf, toml::de::Error),

    #[error("Couldn't parse '{0}':\n{1}")]
    Json(Utf8PathBuf, serde_json::Error),

    #[error("Missing project {0}; set it in [project] or package.json")]
    Missing(&'static str),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't resolve watch path '{0}':\n{1}")]
    Resolve(String, std::io::Error),

    #[error("Couldn't bind {0}:\n{1}")]
    Bind(String, std::io::Error),
}
