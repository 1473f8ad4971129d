use std::future::Future;
use std::pin::Pin;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use petgraph::graph::NodeIndex;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::engine::{
    CancellationToken, Diagnostics, Mode, Registry, TaskContext, TaskExecution, TaskHandle, Work,
};
use crate::error::{GraphError, RunError};

type RunFuture = Pin<Box<dyn Future<Output = Result<(), RunError>> + Send + 'static>>;

type Shared = Arc<Mutex<Diagnostics>>;

/// Executes tasks from a [`Registry`].
///
/// Cloning is cheap; every clone shares the same registry and cancellation
/// token. Sequences run their members one at a time and stop at the first
/// failure. Parallel groups spawn every member onto a [`JoinSet`] in
/// declaration order and only finish once all members have finished; the
/// first failure observed is returned, the rest are logged.
///
/// In [`Mode::Watch`] a failing action is logged at `error` as soon as it
/// returns, since a long-running sibling can keep its group open until the
/// run is cancelled. In [`Mode::Build`] failures are only returned.
///
/// The cancellation token is checked between sequence steps. An action
/// which already started is never interrupted by the runner; long-running
/// actions are expected to watch [`TaskContext::cancel`] themselves.
#[derive(Clone)]
pub struct Runner {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    mode: Mode,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(registry: Registry, mode: Mode) -> Result<Self, GraphError> {
        Self::with_cancel(registry, mode, CancellationToken::new())
    }

    pub fn with_cancel(
        registry: Registry,
        mode: Mode,
        cancel: CancellationToken,
    ) -> Result<Self, GraphError> {
        registry.check()?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                mode,
                cancel,
            }),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Runs a task to completion.
    pub async fn run(&self, handle: TaskHandle) -> Result<Diagnostics, RunError> {
        if !self.inner.registry.contains(handle) {
            return Err(RunError::Task {
                name: format!("#{}", handle.index.index()),
                source: GraphError::UnknownTask(format!("#{}", handle.index.index())).into(),
            });
        }

        let diagnostics = Shared::default();
        self.clone()
            .execute(handle.index, diagnostics.clone())
            .await?;

        let mut diagnostics = diagnostics.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(std::mem::take(&mut *diagnostics))
    }

    /// Runs a task looked up by its name.
    pub async fn run_named(&self, name: &str) -> anyhow::Result<Diagnostics> {
        let handle = self.inner.registry.lookup(name)?;
        Ok(self.run(handle).await?)
    }

    fn execute(self, index: NodeIndex, diagnostics: Shared) -> RunFuture {
        Box::pin(async move {
            let start = Instant::now();
            let task = &self.inner.registry.graph[index];
            let name = task.name.clone();

            let result = match &task.work {
                Work::Action(_) => self.execute_action(index).await,
                Work::Sequence(members) => {
                    self.execute_sequence(&name, members, &diagnostics).await
                }
                Work::Parallel(members) => {
                    self.execute_parallel(&name, members, &diagnostics).await
                }
            };

            diagnostics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(
                    index,
                    TaskExecution {
                        start,
                        duration: start.elapsed(),
                        ok: result.is_ok(),
                    },
                );

            result
        })
    }

    async fn execute_action(&self, index: NodeIndex) -> Result<(), RunError> {
        let task = &self.inner.registry.graph[index];
        let Work::Action(action) = &task.work else {
            unreachable!("execute_action called on a composite task");
        };

        let name = task.name.clone();
        let context = TaskContext {
            name: name.clone(),
            cancel: self.inner.cancel.clone(),
            runner: self.clone(),
        };

        let span = tracing::info_span!("task", name = %name);
        span.pb_set_style(&crate::utils::style_task());
        span.pb_set_message(&format!("Running {name}"));

        let start = Instant::now();
        tracing::debug!(task = %name, "starting");

        // Spawned so a panic stays contained in the task it came from.
        let future = action.call(context).instrument(span);
        let result = match tokio::spawn(future).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(RunError::Task {
                name: name.to_string(),
                source,
            }),
            Err(err) => Err(RunError::Panicked(name.to_string(), panic_message(err))),
        };

        match &result {
            Ok(()) => tracing::info!("finished '{name}' {}", crate::utils::as_overhead(start)),
            Err(err) => match self.inner.mode {
                Mode::Watch => tracing::error!(task = %name, "{err}"),
                Mode::Build => tracing::debug!(task = %name, "failed"),
            },
        }

        result
    }

    async fn execute_sequence(
        &self,
        name: &str,
        members: &[NodeIndex],
        diagnostics: &Shared,
    ) -> Result<(), RunError> {
        for &member in members {
            let member_name = &self.inner.registry.graph[member].name;

            if self.inner.cancel.is_cancelled() {
                return Err(RunError::Cancelled(member_name.to_string()));
            }

            if let Err(err) = self.clone().execute(member, diagnostics.clone()).await {
                tracing::debug!(sequence = name, step = %member_name, "aborting sequence");
                return Err(err);
            }
        }

        Ok(())
    }

    async fn execute_parallel(
        &self,
        name: &str,
        members: &[NodeIndex],
        diagnostics: &Shared,
    ) -> Result<(), RunError> {
        let mut set = JoinSet::new();
        let mut names = HashMap::new();
        for &member in members {
            let task = set.spawn(self.clone().execute(member, diagnostics.clone()));
            names.insert(task.id(), self.inner.registry.graph[member].name.clone());
        }

        let mut first = None;
        while let Some(joined) = set.join_next_with_id().await {
            let result = match joined {
                Ok((_, result)) => result,
                Err(err) => {
                    let member = names.get(&err.id()).map_or(name, |member| &**member);
                    Err(RunError::Panicked(member.to_string(), panic_message(err)))
                }
            };

            if let Err(err) = result {
                if first.is_none() {
                    first = Some(err);
                } else if self.inner.mode == Mode::Build {
                    tracing::warn!(group = name, "another member failed: {err}");
                }
            }
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return String::from("task was cancelled");
    }

    let panic = err.into_panic();
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown payload")
    }
}
