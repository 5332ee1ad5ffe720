//! # Dependency Graph
//!
//! Arena of module names with edges by index, `module → dependency`.
//! Used to order batch start/stop and to find transitive dependencies.
//!
//! Edges to names that are not nodes of the graph are ignored: the graph
//! only orders what it was built from. Callers check unknown or non-running
//! dependencies separately.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Graph errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyError {
    /// The listed modules form a cycle, in dependency order, with the first
    /// module repeated at the end.
    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("unknown module `{0}`")]
    UnknownModule(String),
}

/// Result of ordering a graph that may contain cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialOrder {
    /// Nodes whose dependencies can all be satisfied, dependencies first.
    pub ordered: Vec<String>,
    /// Nodes on a cycle or depending on one, sorted by name.
    pub blocked: Vec<String>,
    /// One detected cycle, empty when `blocked` is empty.
    pub cycle: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: BTreeMap<String, usize>,
    // edges[i] = indices node i depends on
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build from `(module, dependencies)` pairs.
    pub fn from_modules<I, S, D>(modules: I) -> Self
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let declared: Vec<(String, Vec<String>)> = modules
            .into_iter()
            .map(|(name, deps)| (name.into(), deps.into_iter().map(Into::into).collect()))
            .collect();

        let mut graph = Self::default();
        for (name, _) in &declared {
            graph.add_node(name);
        }
        for (name, deps) in &declared {
            let from = graph.index[name];
            for dep in deps {
                if let Some(&to) = graph.index.get(dep) {
                    if !graph.edges[from].contains(&to) {
                        graph.edges[from].push(to);
                    }
                }
            }
        }
        graph
    }

    fn add_node(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        self.edges.push(Vec::new());
        idx
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Direct dependencies of `name` that are nodes of this graph.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.index
            .get(name)
            .map(|&idx| {
                self.edges[idx]
                    .iter()
                    .map(|&dep| self.names[dep].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every node, dependencies before dependents.
    ///
    /// Kahn's algorithm; among nodes that are ready at the same time the
    /// lexicographically smallest name goes first, so the order does not
    /// depend on insertion order.
    pub fn topological_order(&self) -> Result<Vec<String>, DependencyError> {
        let order = self.partial_order();
        if order.blocked.is_empty() {
            Ok(order.ordered)
        } else {
            Err(DependencyError::Cycle(order.cycle))
        }
    }

    /// Like [`topological_order`](Self::topological_order) but never fails:
    /// nodes that cannot be ordered are reported in `blocked`.
    pub fn partial_order(&self) -> PartialOrder {
        let n = self.names.len();
        let mut remaining: Vec<usize> = self.edges.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (from, deps) in self.edges.iter().enumerate() {
            for &to in deps {
                dependents[to].push(from);
            }
        }

        // Ready set keyed by name for determinism
        let mut ready: BTreeSet<(&str, usize)> = (0..n)
            .filter(|&i| remaining[i] == 0)
            .map(|i| (self.names[i].as_str(), i))
            .collect();

        let mut ordered = Vec::with_capacity(n);
        let mut placed = vec![false; n];
        while let Some(next) = ready.pop_first() {
            let (_, idx) = next;
            placed[idx] = true;
            ordered.push(self.names[idx].clone());
            for &dependent in &dependents[idx] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert((self.names[dependent].as_str(), dependent));
                }
            }
        }

        let mut blocked: Vec<String> = (0..n)
            .filter(|&i| !placed[i])
            .map(|i| self.names[i].clone())
            .collect();
        blocked.sort();

        let cycle = if blocked.is_empty() {
            Vec::new()
        } else {
            self.find_cycle(&placed)
        };

        PartialOrder {
            ordered,
            blocked,
            cycle,
        }
    }

    /// Walk unplaced nodes until one repeats. Every unplaced node has at
    /// least one unplaced dependency, so the walk always closes a cycle.
    fn find_cycle(&self, placed: &[bool]) -> Vec<String> {
        let Some(start) = (0..self.names.len())
            .filter(|&i| !placed[i])
            .min_by(|&a, &b| self.names[a].cmp(&self.names[b]))
        else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut current = start;
        loop {
            let Some(&next) = self.edges[current].iter().find(|&&dep| !placed[dep]) else {
                return Vec::new();
            };
            if let Some(pos) = path.iter().position(|&i| i == next) {
                let mut cycle: Vec<String> =
                    path[pos..].iter().map(|&i| self.names[i].clone()).collect();
                cycle.push(self.names[next].clone());
                return cycle;
            }
            path.push(next);
            current = next;
        }
    }

    /// Transitive dependencies of `name` followed by `name` itself,
    /// dependencies first.
    pub fn dependency_order(&self, name: &str) -> Result<Vec<String>, DependencyError> {
        let &root = self
            .index
            .get(name)
            .ok_or_else(|| DependencyError::UnknownModule(name.to_string()))?;

        let mut order = Vec::new();
        let mut done = vec![false; self.names.len()];
        let mut path = Vec::new();
        self.visit(root, &mut path, &mut done, &mut order)?;
        Ok(order)
    }

    /// Transitive dependencies of `name`, dependencies first, excluding
    /// `name` itself.
    pub fn transitive_dependencies(&self, name: &str) -> Result<Vec<String>, DependencyError> {
        let mut order = self.dependency_order(name)?;
        order.pop();
        Ok(order)
    }

    fn visit(
        &self,
        idx: usize,
        path: &mut Vec<usize>,
        done: &mut [bool],
        order: &mut Vec<String>,
    ) -> Result<(), DependencyError> {
        if done[idx] {
            return Ok(());
        }
        if let Some(pos) = path.iter().position(|&i| i == idx) {
            let mut cycle: Vec<String> =
                path[pos..].iter().map(|&i| self.names[i].clone()).collect();
            cycle.push(self.names[idx].clone());
            return Err(DependencyError::Cycle(cycle));
        }

        path.push(idx);
        let mut deps = self.edges[idx].clone();
        deps.sort_by(|&a, &b| self.names[a].cmp(&self.names[b]));
        for dep in deps {
            self.visit(dep, path, done, order)?;
        }
        path.pop();

        done[idx] = true;
        order.push(self.names[idx].clone());
        Ok(())
    }
}
