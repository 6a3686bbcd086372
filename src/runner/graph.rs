//! Dependency graph construction and ordering
//!
//! The graph is built from the registry once, up front. Cycles and
//! unknown dependency names are load-time errors; nothing executes if
//! the graph does not build. Traversal helpers keep every ordering
//! deterministic: nodes are visited in ascending name order and
//! topological ties break by task name.

use crate::error::{GraphError, GraphResult};
use crate::registry::TaskRegistry;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// DFS coloring state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// A validated, acyclic task dependency graph
///
/// An edge A -> B means A must complete before B runs; internally the
/// graph stores both directions.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// task -> names it depends on, sorted
    dependencies: BTreeMap<String, Vec<String>>,
    /// task -> names that depend on it, sorted
    dependents: BTreeMap<String, Vec<String>>,
}

impl TaskGraph {
    /// Build and validate the graph for a registry
    pub fn build(registry: &TaskRegistry) -> GraphResult<Self> {
        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for task in registry.iter() {
            dependencies.entry(task.name.clone()).or_default();
            dependents.entry(task.name.clone()).or_default();
        }

        for task in registry.iter() {
            for dep in &task.dependencies {
                if !dependencies.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        task: task.name.clone(),
                        dependency: dep.clone(),
                    });
                }
                let deps = dependencies.entry(task.name.clone()).or_default();
                if !deps.contains(dep) {
                    deps.push(dep.clone());
                }
                let rev = dependents.entry(dep.clone()).or_default();
                if !rev.contains(&task.name) {
                    rev.push(task.name.clone());
                }
            }
        }

        for deps in dependencies.values_mut() {
            deps.sort();
        }
        for deps in dependents.values_mut() {
            deps.sort();
        }

        let graph = TaskGraph {
            dependencies,
            dependents,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// DFS white/gray/black cycle detection
    ///
    /// A back-edge to a gray node is the cycle signal; the error carries
    /// the cycle as an ordered task-name list.
    fn check_acyclic(&self) -> GraphResult<()> {
        let mut colors: BTreeMap<&str, Color> = self
            .dependencies
            .keys()
            .map(|name| (name.as_str(), Color::White))
            .collect();
        let mut stack: Vec<&str> = Vec::new();

        for name in self.dependencies.keys() {
            if colors[name.as_str()] == Color::White {
                self.visit(name, &mut colors, &mut stack)?;
            }
        }

        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        colors: &mut BTreeMap<&'a str, Color>,
        stack: &mut Vec<&'a str>,
    ) -> GraphResult<()> {
        colors.insert(name, Color::Gray);
        stack.push(name);

        if let Some(deps) = self.dependencies.get(name) {
            for dep in deps {
                match colors[dep.as_str()] {
                    Color::White => self.visit(dep, colors, stack)?,
                    Color::Gray => {
                        let start = stack
                            .iter()
                            .position(|n| *n == dep.as_str())
                            .unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(dep.clone());
                        return Err(GraphError::CyclicDependency(cycle));
                    }
                    Color::Black => {}
                }
            }
        }

        stack.pop();
        colors.insert(name, Color::Black);
        Ok(())
    }

    /// Whether a task is a node in the graph
    pub fn contains(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
    }

    /// All task names, ascending
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }

    /// Direct dependencies of a task
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.dependencies.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct dependents of a task
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.dependents.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The dependency closure of the given roots: the roots plus every
    /// task reachable through dependency edges
    pub fn closure(&self, roots: &[String]) -> BTreeSet<String> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<&str> = roots.iter().map(String::as_str).collect();

        while let Some(name) = queue.pop_front() {
            if seen.insert(name.to_string()) {
                for dep in self.dependencies_of(name) {
                    queue.push_back(dep);
                }
            }
        }

        seen
    }

    /// Every task that transitively depends on `name`
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<&str> = self
            .dependents_of(name)
            .iter()
            .map(String::as_str)
            .collect();

        while let Some(current) = queue.pop_front() {
            if seen.insert(current.to_string()) {
                for dependent in self.dependents_of(current) {
                    queue.push_back(dependent);
                }
            }
        }

        seen
    }

    /// Topological order over a subset of tasks
    ///
    /// Kahn's algorithm with a sorted ready set, so ties always break by
    /// ascending task name and the same subset yields the same order.
    pub fn topo_order(&self, subset: &BTreeSet<String>) -> Vec<String> {
        let mut remaining_deps: BTreeMap<&str, usize> = BTreeMap::new();
        for name in subset {
            let count = self
                .dependencies_of(name)
                .iter()
                .filter(|dep| subset.contains(*dep))
                .count();
            remaining_deps.insert(name.as_str(), count);
        }

        let mut ready: BTreeSet<&str> = remaining_deps
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(subset.len());
        while let Some(name) = ready.iter().next().copied() {
            ready.remove(name);
            order.push(name.to_string());

            for dependent in self.dependents_of(name) {
                if let Some(count) = remaining_deps.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }

        order
    }
}
