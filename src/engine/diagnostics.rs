use std::collections::HashMap;
use std::fmt::Write;
use std::time::{Duration, Instant};

use console::style;
use petgraph::graph::NodeIndex;

use crate::engine::Registry;

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
    pub ok: bool,
}

/// Timings of every task that ran during one [`Runner::run`](crate::Runner::run),
/// composites included.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    pub execution_times: HashMap<NodeIndex, TaskExecution>,
}

impl Diagnostics {
    pub(crate) fn record(&mut self, index: NodeIndex, execution: TaskExecution) {
        self.execution_times.insert(index, execution);
    }

    /// Whether the given task ran (successfully or not).
    pub fn ran(&self, index: NodeIndex) -> bool {
        self.execution_times.contains_key(&index)
    }

    /// One line per task, in start order.
    pub fn summary(&self, registry: &Registry) -> String {
        let mut rows: Vec<_> = self.execution_times.iter().collect();
        rows.sort_by_key(|(index, exec)| (exec.start, index.index()));

        let width = rows
            .iter()
            .map(|(index, _)| registry.graph[**index].name.len())
            .max()
            .unwrap_or(0);

        let mut f = String::new();
        for (index, exec) in rows {
            let name = &registry.graph[*index].name;
            let mark = if exec.ok {
                style("ok").green()
            } else {
                style("failed").red()
            };
            let _ = writeln!(f, "{name:<width$}  {mark:>6}  {:.2?}", exec.duration);
        }
        f
    }
}
