//! File watching.
//!
//! Events come from `notify` through `notify-debouncer-full`, whose handler
//! forwards them into a channel. A single dispatcher matches each changed
//! path against the bindings and pokes the channel of every binding that
//! matches. Each binding owns one coalescing loop ([`drive`]):
//!
//! ```text
//! Idle ──event──▶ Debouncing ──quiet for `debounce`──▶ Rebuilding ──▶ Idle
//!                    ▲   │ event                           │
//!                    │   └──────────(restart window)        │ event(s) seen
//!                    └──────────────────────────────────────┘
//! ```
//!
//! Events arriving while a rebuild is in flight are remembered as a single
//! flag, so however many arrive, exactly one follow-up rebuild runs.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use tokio::sync::mpsc;

use crate::engine::CancellationToken;
use crate::error::WatchError;

/// Glob filter of a binding, paired with the channel of its loop.
pub(crate) struct Binding {
    label: String,
    patterns: Vec<Pattern>,
    tx: mpsc::UnboundedSender<()>,
}

impl Binding {
    pub(crate) fn new(
        label: impl Into<String>,
        patterns: Vec<Pattern>,
    ) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let binding = Self {
            label: label.into(),
            patterns,
            tx,
        };
        (binding, rx)
    }

    fn matches(&self, path: &Path) -> bool {
        self.patterns.iter().any(|p| p.matches_path(path))
    }
}

/// Routes changed paths to the bindings watching them.
#[derive(Default)]
pub(crate) struct Dispatch {
    bindings: Vec<Binding>,
}

impl Dispatch {
    pub(crate) fn push(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    /// Notifies every binding matching `path`, returns how many did.
    pub(crate) fn dispatch(&self, path: &Path) -> usize {
        let mut hits = 0;
        for binding in &self.bindings {
            if binding.matches(path) {
                tracing::debug!(binding = %binding.label, path = %path.display(), "change");
                // A closed channel means the loop is gone, which only
                // happens during shutdown.
                let _ = binding.tx.send(());
                hits += 1;
            }
        }
        hits
    }
}

enum State {
    Idle,
    Debouncing,
    Rebuilding,
}

/// Coalescing loop of one binding. Returns when `cancel` fires or the
/// channel closes; a rebuild already started is awaited first.
pub(crate) async fn drive<F, Fut>(
    mut rx: mpsc::UnboundedReceiver<()>,
    debounce: Duration,
    cancel: CancellationToken,
    mut rebuild: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut state = State::Idle;

    loop {
        state = match state {
            State::Idle => tokio::select! {
                _ = cancel.cancelled() => return,
                event = rx.recv() => match event {
                    Some(()) => State::Debouncing,
                    None => return,
                },
            },
            State::Debouncing => tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(debounce) => State::Rebuilding,
                event = rx.recv() => match event {
                    Some(()) => State::Debouncing,
                    // Flush what was collected before leaving.
                    None => {
                        rebuild().await;
                        return;
                    }
                },
            },
            State::Rebuilding => {
                let mut pending = false;
                let mut closed = false;

                let work = rebuild();
                tokio::pin!(work);

                loop {
                    tokio::select! {
                        () = &mut work => break,
                        event = rx.recv(), if !closed => match event {
                            Some(()) => pending = true,
                            None => closed = true,
                        },
                    }
                }

                match (pending, closed) {
                    (true, _) => State::Debouncing,
                    (false, true) => return,
                    (false, false) => State::Idle,
                }
            }
        };
    }
}

/// Splits a glob into a canonical static root (to watch) and an absolute
/// pattern (to match event paths against).
///
/// The static root must exist. A glob without wildcards naming a file is
/// watched through its parent, so editors replacing the file atomically
/// are still seen.
pub fn resolve_watch_path(glob: impl AsRef<str>) -> Result<(Utf8PathBuf, Pattern), WatchError> {
    let glob = glob.as_ref();
    let path = Utf8Path::new(glob);

    let components: Vec<_> = path.components().collect();
    let split = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
        .unwrap_or(components.len());

    let root: Utf8PathBuf = components.iter().take(split).collect();
    let suffix: Utf8PathBuf = components.iter().skip(split).collect();

    let root = if root.as_str().is_empty() {
        Utf8PathBuf::from(".")
    } else {
        root
    };

    let absolute = root
        .canonicalize_utf8()
        .map_err(|e| WatchError::Resolve(glob.to_string(), e))?;

    let escaped = Pattern::escape(absolute.as_str());

    if suffix.as_str().is_empty() {
        if absolute.is_file() {
            let parent = absolute.parent().unwrap_or(&absolute).to_path_buf();
            return Ok((parent, Pattern::new(&escaped)?));
        }
        return Ok((absolute, Pattern::new(&format!("{escaped}/**/*"))?));
    }

    let pattern = Pattern::new(&format!("{escaped}/{suffix}"))?;
    Ok((absolute, pattern))
}

/// Reduces a set of watch roots to the minimal set: `/a` covers `/a/b`
/// because watches are recursive.
pub fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered: Vec<Utf8PathBuf> = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}
