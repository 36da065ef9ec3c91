//! Task graph registry.
//!
//! Tasks are registered once at startup under a unique name, together with
//! the tasks they depend on. Running a task first runs its dependency closure
//! in waves: every task whose dependencies have completed is started, and the
//! whole wave is awaited before the next one. Members of a wave are
//! interleaved futures on the calling task.

mod catalog;
mod context;
mod error;
mod sequencer;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::{BoxFuture, FutureExt, join_all};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info};

pub use catalog::{BUILD, register_all, watch_rules};
pub use context::{Project, TaskContext};
pub use error::TaskError;
pub use sequencer::Sequencer;

type Action<C> = Arc<dyn Fn(C) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

enum Body<C> {
    /// An async closure
    Action(Action<C>),
    /// Dependencies only
    Group,
    /// Named tasks run one after another
    Sequence(Vec<String>),
}

struct Task<C> {
    name: String,
    dependencies: Vec<String>,
    body: Body<C>,
}

/// What a registered task does, for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Action,
    Group,
    Sequence,
}

/// Description of a registered task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: String,
    pub kind: TaskKind,
    pub dependencies: Vec<String>,
    /// Steps of a sequence task
    pub steps: Vec<String>,
}

/// Registry of named tasks, generic over the context handed to each body.
pub struct TaskRegistry<C> {
    tasks: Vec<Task<C>>,
    index: HashMap<String, usize>,
}

impl<C> Default for TaskRegistry<C> {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<C> TaskRegistry<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(
        &mut self,
        name: &str,
        dependencies: &[&str],
        body: Body<C>,
    ) -> Result<&mut Self, TaskError> {
        if self.index.contains_key(name) {
            return Err(TaskError::DuplicateTask(name.to_string()));
        }
        self.index.insert(name.to_string(), self.tasks.len());
        self.tasks.push(Task {
            name: name.to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            body,
        });
        Ok(self)
    }

    /// Register a task with an async body.
    pub fn register<F, Fut>(
        &mut self,
        name: &str,
        dependencies: &[&str],
        body: F,
    ) -> Result<&mut Self, TaskError>
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let action: Action<C> = Arc::new(move |ctx| body(ctx).boxed());
        self.insert(name, dependencies, Body::Action(action))
    }

    /// Register a task that only groups its dependencies.
    pub fn register_group(
        &mut self,
        name: &str,
        dependencies: &[&str],
    ) -> Result<&mut Self, TaskError> {
        self.insert(name, dependencies, Body::Group)
    }

    /// Register a task that runs `steps` strictly one after another.
    pub fn register_sequence(
        &mut self,
        name: &str,
        dependencies: &[&str],
        steps: &[&str],
    ) -> Result<&mut Self, TaskError> {
        let steps = steps.iter().map(|s| s.to_string()).collect();
        self.insert(name, dependencies, Body::Sequence(steps))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered tasks in registration order.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.tasks
            .iter()
            .map(|task| {
                let (kind, steps) = match &task.body {
                    Body::Action(_) => (TaskKind::Action, Vec::new()),
                    Body::Group => (TaskKind::Group, Vec::new()),
                    Body::Sequence(steps) => (TaskKind::Sequence, steps.clone()),
                };
                TaskInfo {
                    name: task.name.clone(),
                    kind,
                    dependencies: task.dependencies.clone(),
                    steps,
                }
            })
            .collect()
    }

    /// Check that every dependency and sequence step exists and that the
    /// dependency graph has no cycle.
    pub fn validate(&self) -> Result<(), TaskError> {
        for task in &self.tasks {
            let steps: &[String] = match &task.body {
                Body::Sequence(steps) => steps,
                _ => &[],
            };
            for dependency in task.dependencies.iter().chain(steps) {
                if !self.index.contains_key(dependency) {
                    return Err(TaskError::UnknownDependency {
                        task: task.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        let all: Vec<usize> = (0..self.tasks.len()).collect();
        self.graph(&all).map(|_| ())
    }

    /// Indices of `name` and everything it depends on, transitively.
    fn closure(&self, name: &str) -> Result<Vec<usize>, TaskError> {
        let root = *self
            .index
            .get(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;

        let mut seen = HashSet::from([root]);
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            let task = &self.tasks[current];
            for dependency in &task.dependencies {
                let index =
                    *self
                        .index
                        .get(dependency)
                        .ok_or_else(|| TaskError::UnknownDependency {
                            task: task.name.clone(),
                            dependency: dependency.clone(),
                        })?;
                if seen.insert(index) {
                    stack.push(index);
                }
            }
        }

        let mut members: Vec<usize> = seen.into_iter().collect();
        members.sort_unstable();
        Ok(members)
    }

    /// Dependency graph over `members`, with edges pointing from a dependency
    /// to its dependent. Fails on cycles.
    fn graph(&self, members: &[usize]) -> Result<DiGraph<usize, ()>, TaskError> {
        let mut graph = DiGraph::new();
        let nodes: HashMap<usize, NodeIndex> = members
            .iter()
            .map(|&member| (member, graph.add_node(member)))
            .collect();

        for &member in members {
            for dependency in &self.tasks[member].dependencies {
                if let Some(dep) = self.index.get(dependency).and_then(|i| nodes.get(i)) {
                    graph.add_edge(*dep, nodes[&member], ());
                }
            }
        }

        toposort(&graph, None)
            .map_err(|cycle| TaskError::Cycle(self.tasks[graph[cycle.node_id()]].name.clone()))?;
        Ok(graph)
    }

    /// Run `name` after its whole dependency closure.
    ///
    /// Every dependency runs exactly once per call. The first failure stops
    /// dependents from starting and is returned once its wave has finished.
    pub fn run<'a>(&'a self, name: &'a str, ctx: C) -> BoxFuture<'a, Result<(), TaskError>> {
        async move {
            let members = self.closure(name)?;
            let graph = self.graph(&members)?;

            let mut pending: HashMap<NodeIndex, usize> = graph
                .node_indices()
                .map(|node| {
                    let count = graph
                        .neighbors_directed(node, petgraph::Direction::Incoming)
                        .count();
                    (node, count)
                })
                .collect();

            while !pending.is_empty() {
                let wave: Vec<NodeIndex> = pending
                    .iter()
                    .filter(|(_, count)| **count == 0)
                    .map(|(node, _)| *node)
                    .collect();
                for node in &wave {
                    pending.remove(node);
                }

                let results = join_all(
                    wave.iter()
                        .map(|node| self.execute(graph[*node], ctx.clone())),
                )
                .await;
                if let Some(err) = results.into_iter().find_map(Result::err) {
                    return Err(err);
                }

                for node in &wave {
                    for dependent in graph.neighbors_directed(*node, petgraph::Direction::Outgoing)
                    {
                        if let Some(count) = pending.get_mut(&dependent) {
                            *count -= 1;
                        }
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn execute(&self, index: usize, ctx: C) -> Result<(), TaskError> {
        let task = &self.tasks[index];
        let started = Instant::now();
        match &task.body {
            Body::Group => {
                debug!(task = %task.name, "group complete");
                return Ok(());
            }
            Body::Action(action) => {
                info!(task = %task.name, "starting");
                action(ctx).await.map_err(|e| TaskError::Failed {
                    task: task.name.clone(),
                    message: format!("{e:#}"),
                })?;
            }
            Body::Sequence(steps) => {
                info!(task = %task.name, "starting sequence");
                Sequencer::new(self, steps.clone()).run(ctx).await?;
            }
        }
        info!(
            task = %task.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(name: &'static str) -> impl Fn(Log) -> BoxFuture<'static, anyhow::Result<()>> {
        move |log: Log| {
            async move {
                tokio::task::yield_now().await;
                log.lock().unwrap().push(name.to_string());
                Ok(())
            }
            .boxed()
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn position(log: &[String], name: &str) -> usize {
        log.iter().position(|n| n == name).unwrap()
    }

    #[tokio::test]
    async fn test_dependencies_run_first_and_once() {
        let mut registry = TaskRegistry::<Log>::new();
        registry.register("sass", &[], record("sass")).unwrap();
        registry.register("pages", &[], record("pages")).unwrap();
        registry.register("inline", &["sass", "pages"], record("inline")).unwrap();
        registry.register("publish", &["inline", "sass"], record("publish")).unwrap();

        let log = Log::default();
        registry.run("publish", log.clone()).await.unwrap();

        let log = entries(&log);
        assert_eq!(log.len(), 4);
        assert!(position(&log, "sass") < position(&log, "inline"));
        assert!(position(&log, "pages") < position(&log, "inline"));
        assert_eq!(log[3], "publish");
    }

    #[tokio::test]
    async fn test_group_runs_members() {
        let mut registry = TaskRegistry::<Log>::new();
        registry.register("styles", &[], record("styles")).unwrap();
        registry.register("scripts", &[], record("scripts")).unwrap();
        registry.register_group("build", &["styles", "scripts"]).unwrap();

        let log = Log::default();
        registry.run("build", log.clone()).await.unwrap();

        let mut log = entries(&log);
        log.sort();
        assert_eq!(log, vec!["scripts", "styles"]);
    }

    #[tokio::test]
    async fn test_failure_stops_dependents() {
        let mut registry = TaskRegistry::<Log>::new();
        registry
            .register("broken", &[], |_log: Log| async { anyhow::bail!("syntax error in app.scss") })
            .unwrap();
        registry.register("sibling", &[], record("sibling")).unwrap();
        registry.register("after", &["broken", "sibling"], record("after")).unwrap();

        let log = Log::default();
        let err = registry.run("after", log.clone()).await.unwrap_err();

        assert_eq!(err.task(), "broken");
        assert!(err.to_string().contains("syntax error in app.scss"));
        assert_eq!(entries(&log), vec!["sibling"]);
    }

    #[tokio::test]
    async fn test_sequence_is_strictly_ordered() {
        let mut registry = TaskRegistry::<Log>::new();
        registry.register("clean", &[], record("clean")).unwrap();
        registry.register("pages", &[], record("pages")).unwrap();
        registry.register("inline", &[], record("inline")).unwrap();
        registry
            .register_sequence("email", &[], &["clean", "pages", "inline"])
            .unwrap();

        let log = Log::default();
        registry.run("email", log.clone()).await.unwrap();

        assert_eq!(entries(&log), vec!["clean", "pages", "inline"]);
    }

    #[test]
    fn test_duplicate_and_unknown() {
        let mut registry = TaskRegistry::<Log>::new();
        registry.register_group("a", &[]).unwrap();
        assert!(matches!(
            registry.register_group("a", &[]),
            Err(TaskError::DuplicateTask(_))
        ));

        registry.register_group("b", &["missing"]).unwrap();
        assert!(matches!(
            registry.validate(),
            Err(TaskError::UnknownDependency { dependency, .. }) if dependency == "missing"
        ));
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let registry = TaskRegistry::<Log>::new();
        let err = registry.run("nope", Log::default()).await.unwrap_err();
        assert!(matches!(err, TaskError::UnknownTask(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_cycle_detected_before_running() {
        let mut registry = TaskRegistry::<Log>::new();
        registry.register("a", &["b"], record("a")).unwrap();
        registry.register("b", &["a"], record("b")).unwrap();

        assert!(matches!(registry.validate(), Err(TaskError::Cycle(_))));
        let log = Log::default();
        assert!(matches!(
            registry.run("a", log.clone()).await,
            Err(TaskError::Cycle(_))
        ));
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_task_listing() {
        let mut registry = TaskRegistry::<Log>::new();
        registry.register("x", &[], record("x")).unwrap();
        registry.register_sequence("seq", &["x"], &["x"]).unwrap();

        let tasks = registry.tasks();
        assert_eq!(tasks[0].kind, TaskKind::Action);
        assert_eq!(tasks[1].kind, TaskKind::Sequence);
        assert_eq!(tasks[1].dependencies, vec!["x"]);
        assert_eq!(tasks[1].steps, vec!["x"]);
    }
}
