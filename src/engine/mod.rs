//! The task graph.
//!
//! A task is a named unit of work. Leaf tasks wrap an async [`Action`];
//! composite tasks are built with [`Registry::sequence`] and
//! [`Registry::parallel`] out of tasks registered before them, so the graph
//! is acyclic by construction.
//!
//! ## Handles
//!
//! Registration returns a [`TaskHandle`], a `Copy` token naming the node in
//! the graph. Names only exist for the command line and for log output; the
//! code wires tasks together with handles. A handle remembers which registry
//! issued it, so passing it to another registry fails the same way an
//! unknown name does.

mod diagnostics;
mod registry;
mod runner;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use petgraph::graph::NodeIndex;
pub use tokio_util::sync::CancellationToken;

pub use crate::engine::diagnostics::{Diagnostics, TaskExecution};
pub use crate::engine::registry::Registry;
pub use crate::engine::runner::Runner;

/// The mode in which the pipeline is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A one-time run; failures abort.
    Build,
    /// A continuous watch run; failures are logged.
    Watch,
}

/// Future returned by an action.
pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// The work behind a leaf task.
///
/// Implemented for every `Fn(TaskContext) -> impl Future<Output =
/// anyhow::Result<()>>`, so plain async closures can be registered.
pub trait Action: Send + Sync {
    fn call(&self, context: TaskContext) -> TaskFuture;
}

impl<F, Fut> Action for F
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call(&self, context: TaskContext) -> TaskFuture {
        Box::pin(self(context))
    }
}

/// Everything an action gets to see while it runs.
#[derive(Clone)]
pub struct TaskContext {
    /// Name of the running task.
    pub name: Arc<str>,
    /// Cancelled when the whole run is being shut down.
    pub cancel: CancellationToken,
    /// The runner, so long-running tasks can trigger other tasks.
    pub runner: Runner,
}

impl TaskContext {
    pub fn mode(&self) -> Mode {
        self.runner.mode()
    }
}

/// A typed reference to a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub(crate) registry: u32,
    pub(crate) index: NodeIndex,
}

impl TaskHandle {
    /// Returns the underlying `NodeIndex` of the task in the graph.
    pub fn index(&self) -> NodeIndex {
        self.index
    }
}

/// A member of a composition: either a handle or a registered name.
#[derive(Debug, Clone, Copy)]
pub enum TaskRef<'a> {
    Handle(TaskHandle),
    Name(&'a str),
}

impl From<TaskHandle> for TaskRef<'_> {
    fn from(handle: TaskHandle) -> Self {
        TaskRef::Handle(handle)
    }
}

impl<'a> From<&'a str> for TaskRef<'a> {
    fn from(name: &'a str) -> Self {
        TaskRef::Name(name)
    }
}

impl<'a> From<&'a String> for TaskRef<'a> {
    fn from(name: &'a String) -> Self {
        TaskRef::Name(name)
    }
}

/// What a node of the graph does when run.
pub(crate) enum Work {
    Action(Arc<dyn Action>),
    Sequence(Vec<NodeIndex>),
    Parallel(Vec<NodeIndex>),
}

pub(crate) struct Task {
    pub name: Arc<str>,
    pub work: Work,
}

impl Task {
    pub(crate) fn kind(&self) -> &'static str {
        match self.work {
            Work::Action(_) => "task",
            Work::Sequence(_) => "sequence",
            Work::Parallel(_) => "parallel",
        }
    }
}
