//! Cascade wiring between repositories.
//!
//! # Responsibility
//! - Declare which repository's End hooks may mutate which other
//!   repository, and reject cyclic wiring at startup.
//! - Bound recursive parent walks (group -> parent group) at runtime.
//!
//! # Invariants
//! - Self-edges are allowed: they model bounded ancestor walks.
//! - Any cycle between two or more distinct repositories is rejected.

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeGraphError {
    /// Edge references a repository that was never declared.
    UnknownRepository(&'static str),
    /// Edges form a cycle through distinct repositories.
    Cycle(Vec<&'static str>),
}

impl Display for CascadeGraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownRepository(name) => {
                write!(f, "unknown repository `{name}` in cascade graph")
            }
            Self::Cycle(path) => write!(f, "cascade cycle: {}", path.join(" -> ")),
        }
    }
}

impl Error for CascadeGraphError {}

/// Directed graph of cascade edges, `from` End hooks mutating `to`.
#[derive(Debug, Clone, Default)]
pub struct CascadeGraph {
    edges: BTreeMap<&'static str, BTreeSet<&'static str>>,
}

impl CascadeGraph {
    pub fn new(repositories: &[&'static str]) -> Self {
        Self {
            edges: repositories
                .iter()
                .map(|name| (*name, BTreeSet::new()))
                .collect(),
        }
    }

    pub fn edge(mut self, from: &'static str, to: &'static str) -> Self {
        self.edges.entry(from).or_default().insert(to);
        self
    }

    pub fn targets(&self, from: &str) -> impl Iterator<Item = &'static str> + '_ {
        self.edges.get(from).into_iter().flatten().copied()
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.get(from).is_some_and(|targets| targets.contains(to))
    }

    /// Checks that every endpoint is declared and that the graph is acyclic
    /// apart from self-edges.
    pub fn validate(&self) -> Result<(), CascadeGraphError> {
        for targets in self.edges.values() {
            if let Some(unknown) = targets.iter().find(|to| !self.edges.contains_key(*to)) {
                return Err(CascadeGraphError::UnknownRepository(*unknown));
            }
        }

        let mut done = BTreeSet::new();
        for start in self.edges.keys() {
            let mut path = Vec::new();
            self.visit(*start, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        node: &'static str,
        path: &mut Vec<&'static str>,
        done: &mut BTreeSet<&'static str>,
    ) -> Result<(), CascadeGraphError> {
        if done.contains(node) {
            return Ok(());
        }
        if let Some(position) = path.iter().position(|seen| *seen == node) {
            let mut cycle = path[position..].to_vec();
            cycle.push(node);
            return Err(CascadeGraphError::Cycle(cycle));
        }
        path.push(node);
        for next in self.targets(node).filter(|next| *next != node) {
            self.visit(next, path, done)?;
        }
        path.pop();
        done.insert(node);
        Ok(())
    }
}

/// Visited set of one recursive parent walk.
///
/// Carried in hook parameters so each recursive save knows which keys the
/// originating commit already passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorWalk<K> {
    trace: Uuid,
    visited: Vec<K>,
}

impl<K: Copy + Eq> AncestorWalk<K> {
    pub fn start(origin: K) -> Self {
        Self {
            trace: Uuid::new_v4(),
            visited: vec![origin],
        }
    }

    /// Correlation id shared by every step of the walk.
    pub fn trace(&self) -> Uuid {
        self.trace
    }

    /// Extends the walk from `node` to `parent`.
    ///
    /// Returns `None` for a self-parented node or a parent already visited.
    pub fn step(&self, node: K, parent: K) -> Option<Self> {
        if parent == node || self.visited.contains(&parent) {
            return None;
        }
        let mut visited = self.visited.clone();
        visited.push(parent);
        Some(Self {
            trace: self.trace,
            visited,
        })
    }

    pub fn visited(&self) -> &[K] {
        &self.visited
    }

    pub fn depth(&self) -> usize {
        self.visited.len()
    }
}
