//! Development server and file watching.
//!
//! [`Watcher`] maps globs to triggers: re-running a task from the registry,
//! or telling connected browsers to refresh. [`DevServer`] serves the
//! rendered site over HTTP, injects the reload client into HTML pages, and
//! runs a [`Watcher`] with both kinds of bindings armed.
//!
//! Everything here is fail-soft: a rebuild that fails is logged and the
//! watcher keeps going.

pub mod http;
mod reload;
mod watch;

use std::collections::HashSet;
use std::time::Duration;

use camino::Utf8PathBuf;
use notify::RecursiveMode;
use notify_debouncer_full::{DebounceEventResult, new_debouncer};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::engine::{Mode, TaskContext, TaskHandle};
use crate::error::WatchError;

pub use crate::live::reload::{ReloadHub, ReloadKind};
pub use crate::live::watch::{collapse_watch_paths, resolve_watch_path};

use crate::live::watch::{Binding, Dispatch, drive};

/// Window in which `notify-debouncer-full` merges raw events for one path.
const NOTIFY_WINDOW: Duration = Duration::from_millis(50);

/// What a binding does once its files settle.
#[derive(Debug, Clone, Copy)]
pub enum Trigger {
    /// Run a task through the runner.
    Task(TaskHandle),
    /// Notify browsers through the reload hub.
    Reload(ReloadKind),
}

/// Globs watched together, and what to do when they change.
#[derive(Debug, Clone)]
pub struct WatchSpec {
    pub globs: Vec<String>,
    pub trigger: Trigger,
}

/// A set of watch bindings sharing one file watcher.
#[derive(Debug, Clone)]
pub struct Watcher {
    debounce: Duration,
    specs: Vec<WatchSpec>,
}

impl Watcher {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            specs: Vec::new(),
        }
    }

    /// Re-runs `task` when a file matching any of `globs` changes.
    pub fn task<S: Into<String>>(mut self, globs: impl IntoIterator<Item = S>, task: TaskHandle) -> Self {
        self.specs.push(WatchSpec {
            globs: globs.into_iter().map(Into::into).collect(),
            trigger: Trigger::Task(task),
        });
        self
    }

    /// Notifies browsers when a file matching any of `globs` changes.
    pub fn reload<S: Into<String>>(mut self, globs: impl IntoIterator<Item = S>, kind: ReloadKind) -> Self {
        self.specs.push(WatchSpec {
            globs: globs.into_iter().map(Into::into).collect(),
            trigger: Trigger::Reload(kind),
        });
        self
    }

    pub fn specs(&self) -> &[WatchSpec] {
        &self.specs
    }

    /// Watches until the run is cancelled.
    ///
    /// Globs whose static root does not exist are skipped with a warning.
    /// Reload bindings need a `hub`; without one they are skipped too.
    pub async fn run(self, ctx: &TaskContext, hub: Option<ReloadHub>) -> Result<(), WatchError> {
        let cancel = ctx.cancel.clone();
        let mode = ctx.mode();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = new_debouncer(NOTIFY_WINDOW, None, move |result: DebounceEventResult| {
            // Receiver gone means we are shutting down.
            let _ = tx.send(result);
        })?;

        let mut roots = HashSet::new();
        let mut dispatch = Dispatch::default();
        let mut loops = JoinSet::new();

        for spec in self.specs {
            let mut patterns = Vec::new();
            for glob in &spec.globs {
                match resolve_watch_path(glob) {
                    Ok((root, pattern)) => {
                        roots.insert(root);
                        patterns.push(pattern);
                    }
                    Err(e) => tracing::warn!("not watching: {e}"),
                }
            }

            if patterns.is_empty() {
                continue;
            }

            match spec.trigger {
                Trigger::Task(task) => {
                    let runner = ctx.runner.clone();
                    let label = runner.registry().name(task).unwrap_or("?").to_string();
                    let (binding, events) = Binding::new(label.clone(), patterns);
                    dispatch.push(binding);

                    loops.spawn(drive(events, self.debounce, cancel.clone(), move || {
                        let runner = runner.clone();
                        let label = label.clone();
                        async move {
                            tracing::info!("change detected, running '{label}'");
                            match runner.run(task).await {
                                Ok(diagnostics) => {
                                    tracing::debug!("\n{}", diagnostics.summary(runner.registry()))
                                }
                                // the runner already logged the failing action
                                Err(_) if mode == Mode::Watch => {
                                    tracing::debug!("rebuild of '{label}' failed")
                                }
                                Err(e) => tracing::error!("{e}"),
                            }
                        }
                    }));
                }
                Trigger::Reload(kind) => {
                    let Some(hub) = hub.clone() else {
                        tracing::warn!(kind = kind.as_str(), "no reload hub, skipping binding");
                        continue;
                    };
                    let (binding, events) = Binding::new(kind.as_str(), patterns);
                    dispatch.push(binding);

                    loops.spawn(drive(events, self.debounce, cancel.clone(), move || {
                        hub.notify(kind);
                        std::future::ready(())
                    }));
                }
            }
        }

        for root in collapse_watch_paths(roots) {
            tracing::info!("watching {root}");
            debouncer.watch(&root, RecursiveMode::Recursive)?;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = rx.recv() => match result {
                    Some(Ok(events)) => {
                        for event in events {
                            for path in &event.event.paths {
                                dispatch.dispatch(path);
                            }
                        }
                    }
                    Some(Err(errors)) => {
                        for error in errors {
                            tracing::error!("watch error: {error}");
                        }
                    }
                    None => break,
                },
            }
        }

        drop(debouncer);
        drop(dispatch);
        while loops.join_next().await.is_some() {}

        Ok(())
    }
}

/// Static file server with live reload over the render output.
#[derive(Debug, Clone)]
pub struct DevServer {
    pub root: Utf8PathBuf,
    pub port: u16,
    pub watcher: Watcher,
}

impl DevServer {
    /// The standard reload bindings over the render output directory.
    pub fn new(root: impl Into<Utf8PathBuf>, port: u16, watcher: Watcher) -> Self {
        let root = root.into();
        let watcher = watcher
            .reload([format!("{root}/css/**/*.css")], ReloadKind::Css)
            .reload([format!("{root}/js/**/*.js")], ReloadKind::Js)
            .reload([format!("{root}/**/*.html")], ReloadKind::Page);

        Self {
            root,
            port,
            watcher,
        }
    }

    /// Creates the asset directories the reload bindings watch, so they are
    /// armed before the renderer first writes into them.
    fn prepare(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.root.join("css"))?;
        std::fs::create_dir_all(self.root.join("js"))
    }

    /// Serves and watches until the run is cancelled.
    pub async fn run(self, ctx: TaskContext) -> anyhow::Result<()> {
        self.prepare()?;

        let hub = ReloadHub::start()?;
        let listener = http::bind(self.port).await?;

        let stop = ctx.cancel.child_token();
        let server = tokio::spawn(http::serve(listener, self.root, hub.port(), stop.clone()));

        let watched = self.watcher.run(&ctx, Some(hub)).await;

        stop.cancel();
        server.await??;
        watched?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::engine::{Registry, Runner};

    use super::*;

    #[test]
    fn test_dev_server_arms_reload_bindings() {
        let mut registry = Registry::new();
        let sass = registry
            .register("sass", |_: TaskContext| async { anyhow::Ok(()) })
            .unwrap();

        let watcher = Watcher::new(Duration::from_millis(250)).task(["src/sass/**/*.scss"], sass);
        let server = DevServer::new("docs", 3000, watcher);

        let specs = server.watcher.specs();
        assert_eq!(specs.len(), 4);
        assert!(matches!(specs[0].trigger, Trigger::Task(handle) if handle == sass));

        let reloads: Vec<_> = specs[1..]
            .iter()
            .map(|spec| match spec.trigger {
                Trigger::Reload(kind) => (spec.globs[0].as_str(), kind),
                Trigger::Task(_) => panic!("expected a reload binding"),
            })
            .collect();

        assert_eq!(
            reloads,
            vec![
                ("docs/css/**/*.css", ReloadKind::Css),
                ("docs/js/**/*.js", ReloadKind::Js),
                ("docs/**/*.html", ReloadKind::Page),
            ]
        );
    }

    #[test]
    fn test_prepare_creates_asset_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().join("docs")).unwrap();

        let server = DevServer::new(root.clone(), 0, Watcher::new(Duration::from_millis(250)));
        server.prepare().unwrap();

        assert!(root.join("css").is_dir());
        assert!(root.join("js").is_dir());
        assert!(resolve_watch_path(&format!("{root}/js/**/*.js")).is_ok());
    }

    #[tokio::test]
    async fn test_file_change_reruns_bound_task() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().canonicalize().unwrap()).unwrap();
        let sass_dir = root.join("sass");
        std::fs::create_dir_all(&sass_dir).unwrap();

        let rebuilds = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        let sass = {
            let rebuilds = rebuilds.clone();
            registry
                .register("sass", move |_: TaskContext| {
                    let rebuilds = rebuilds.clone();
                    async move {
                        rebuilds.fetch_add(1, Ordering::SeqCst);
                        anyhow::Ok(())
                    }
                })
                .unwrap()
        };

        let runner = Runner::new(registry, Mode::Watch).unwrap();
        let ctx = TaskContext {
            name: "sass:watch".into(),
            cancel: runner.cancel_token(),
            runner: runner.clone(),
        };

        let watcher = Watcher::new(Duration::from_millis(200)).task([format!("{sass_dir}/**/*.scss")], sass);
        let watching = tokio::spawn(async move { watcher.run(&ctx, None).await });

        // let the watch get registered
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(sass_dir.join("a.scss"), "a { color: red; }").unwrap();
        std::fs::write(sass_dir.join("a.md"), "# not a stylesheet").unwrap();

        let rebuilt = tokio::time::timeout(Duration::from_secs(5), async {
            while rebuilds.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(rebuilt.is_ok(), "writing a.scss did not trigger a rebuild");

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(rebuilds.load(Ordering::SeqCst), 1);

        std::fs::write(root.join("notes.md"), "outside the binding").unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(rebuilds.load(Ordering::SeqCst), 1);

        runner.cancel_token().cancel();
        watching.await.unwrap().unwrap();
    }
}
