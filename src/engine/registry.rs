use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use petgraph::Graph;
use petgraph::graph::NodeIndex;

use crate::engine::{Action, Task, TaskHandle, TaskRef, Work};
use crate::error::GraphError;

static REGISTRY_ID: AtomicU32 = AtomicU32::new(0);

/// The set of tasks known to a pipeline.
///
/// Edges point from a member to the composition that uses it.
pub struct Registry {
    id: u32,
    pub(crate) graph: Graph<Task, ()>,
    names: HashMap<Arc<str>, NodeIndex>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            id: REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            graph: Graph::new(),
            names: HashMap::new(),
        }
    }

    /// Adds a leaf task.
    pub fn register<A>(&mut self, name: &str, action: A) -> Result<TaskHandle, GraphError>
    where
        A: Action + 'static,
    {
        self.insert(name, Work::Action(Arc::new(action)), Vec::new())
    }

    /// Adds a task running `members` one after another.
    pub fn sequence<'a, I, R>(&mut self, name: &str, members: I) -> Result<TaskHandle, GraphError>
    where
        I: IntoIterator<Item = R>,
        R: Into<TaskRef<'a>>,
    {
        let members = self.resolve_all(members)?;
        self.insert(name, Work::Sequence(members.clone()), members)
    }

    /// Adds a task running `members` concurrently.
    pub fn parallel<'a, I, R>(&mut self, name: &str, members: I) -> Result<TaskHandle, GraphError>
    where
        I: IntoIterator<Item = R>,
        R: Into<TaskRef<'a>>,
    {
        let members = self.resolve_all(members)?;
        self.insert(name, Work::Parallel(members.clone()), members)
    }

    /// Finds a task by its name.
    pub fn lookup(&self, name: &str) -> Result<TaskHandle, GraphError> {
        self.names
            .get(name)
            .map(|&index| self.handle(index))
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))
    }

    /// Display name of a task.
    pub fn name(&self, handle: TaskHandle) -> Option<&str> {
        self.contains(handle)
            .then(|| self.graph[handle.index].name.as_ref())
    }

    /// Registered task names together with their kind, in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.graph
            .node_indices()
            .map(|index| (self.graph[index].name.as_ref(), self.graph[index].kind()))
    }

    /// Member names of a composition, in declaration order. Empty for leaf
    /// tasks and foreign handles.
    pub fn members(&self, handle: TaskHandle) -> Vec<&str> {
        if !self.contains(handle) {
            return Vec::new();
        }

        match &self.graph[handle.index].work {
            Work::Action(_) => Vec::new(),
            Work::Sequence(members) | Work::Parallel(members) => members
                .iter()
                .map(|&index| self.graph[index].name.as_ref())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub(crate) fn contains(&self, handle: TaskHandle) -> bool {
        handle.registry == self.id && handle.index.index() < self.graph.node_count()
    }

    /// Checks that the graph is a DAG.
    pub(crate) fn check(&self) -> Result<(), GraphError> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|_| ())
            .map_err(|cycle| GraphError::Cycle(self.graph[cycle.node_id()].name.to_string()))
    }

    fn handle(&self, index: NodeIndex) -> TaskHandle {
        TaskHandle {
            registry: self.id,
            index,
        }
    }

    fn resolve(&self, member: TaskRef) -> Result<NodeIndex, GraphError> {
        match member {
            TaskRef::Name(name) => self.lookup(name).map(|handle| handle.index),
            TaskRef::Handle(handle) if self.contains(handle) => Ok(handle.index),
            TaskRef::Handle(handle) => Err(GraphError::UnknownTask(format!(
                "#{} (handle from another registry)",
                handle.index.index()
            ))),
        }
    }

    fn resolve_all<'a, I, R>(&self, members: I) -> Result<Vec<NodeIndex>, GraphError>
    where
        I: IntoIterator<Item = R>,
        R: Into<TaskRef<'a>>,
    {
        members
            .into_iter()
            .map(|member| self.resolve(member.into()))
            .collect()
    }

    fn insert(
        &mut self,
        name: &str,
        work: Work,
        members: Vec<NodeIndex>,
    ) -> Result<TaskHandle, GraphError> {
        if self.names.contains_key(name) {
            return Err(GraphError::DuplicateTask(name.to_string()));
        }

        let name: Arc<str> = Arc::from(name);
        let index = self.graph.add_node(Task {
            name: name.clone(),
            work,
        });

        for member in members {
            self.graph.add_edge(member, index, ());
        }

        self.names.insert(name, index);
        Ok(self.handle(index))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Registry {
    /// Renders the registry as a Mermaid flowchart.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            let task = &self.graph[index];
            let name = task.name.replace('"', "\\\"");
            match task.work {
                Work::Action(_) => writeln!(f, "    {}[\"{}\"]", index.index(), name)?,
                Work::Sequence(_) => writeln!(f, "    {}[[\"{}\"]]", index.index(), name)?,
                Work::Parallel(_) => writeln!(f, "    {}{{\"{}\"}}", index.index(), name)?,
            }
        }

        for index in self.graph.node_indices() {
            match &self.graph[index].work {
                Work::Action(_) => {}
                Work::Sequence(members) => {
                    for (step, member) in members.iter().enumerate() {
                        writeln!(
                            f,
                            "    {} -- \"{}\" --> {}",
                            member.index(),
                            step + 1,
                            index.index()
                        )?;
                    }
                }
                Work::Parallel(members) => {
                    for member in members {
                        writeln!(f, "    {} --> {}", member.index(), index.index())?;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TaskContext;

    async fn noop(_: TaskContext) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_duplicate_name() {
        let mut registry = Registry::new();
        registry.register("sass", noop).unwrap();

        let err = registry.register("sass", noop).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateTask(name) if name == "sass"));
    }

    #[test]
    fn test_unknown_member_fails_at_composition() {
        let mut registry = Registry::new();
        registry.register("a", noop).unwrap();

        let err = registry.sequence("release", ["a", "b"]).unwrap_err();
        assert!(matches!(err, GraphError::UnknownTask(name) if name == "b"));

        // nothing half-registered
        assert!(registry.lookup("release").is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_foreign_handle_is_rejected() {
        let mut other = Registry::new();
        let foreign = other.register("a", noop).unwrap();

        let mut registry = Registry::new();
        registry.register("a", noop).unwrap();

        let err = registry.parallel("group", [foreign]).unwrap_err();
        assert!(matches!(err, GraphError::UnknownTask(_)));
    }

    #[test]
    fn test_lookup_and_names() {
        let mut registry = Registry::new();
        let a = registry.register("a", noop).unwrap();
        let b = registry.register("b", noop).unwrap();
        let seq = registry.sequence("ab", [a, b]).unwrap();
        let par = registry.parallel("both", ["a", "ab"]).unwrap();

        assert_eq!(registry.lookup("ab").unwrap(), seq);
        assert_eq!(registry.name(par), Some("both"));
        assert_eq!(registry.members(par), vec!["a", "ab"]);
        assert!(registry.members(a).is_empty());
        assert!(matches!(
            registry.lookup("missing"),
            Err(GraphError::UnknownTask(_))
        ));

        let tasks: Vec<_> = registry.tasks().collect();
        assert_eq!(
            tasks,
            vec![
                ("a", "task"),
                ("b", "task"),
                ("ab", "sequence"),
                ("both", "parallel")
            ]
        );
        assert!(registry.check().is_ok());
    }

    #[test]
    fn test_mermaid() {
        let mut registry = Registry::new();
        registry.register("a", noop).unwrap();
        registry.register("b", noop).unwrap();
        registry.sequence("release", ["a", "b"]).unwrap();

        let text = registry.to_string();
        assert!(text.starts_with("graph LR\n"));
        assert!(text.contains("2[[\"release\"]]"));
        assert!(text.contains("0 -- \"1\" --> 2"));
        assert!(text.contains("1 -- \"2\" --> 2"));
    }
}
