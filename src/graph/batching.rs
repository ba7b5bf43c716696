// src/graph/batching.rs

//! Partition a discovered artifact forest into rebuild batches.
//!
//! Pure and deterministic: nodes are deduplicated by name and processed in
//! name order, so the same input set always yields the same plan.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info};

use crate::errors::{RebuildError, Result};

/// A discovered artifact and the artifact it is layered on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode<T> {
    pub name: String,
    pub parent: Option<String>,
    pub item: T,
}

impl<T> PlanNode<T> {
    pub fn new(name: impl Into<String>, parent: Option<String>, item: T) -> Self {
        Self {
            name: name.into(),
            parent,
            item,
        }
    }
}

/// A node after batching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedArtifact<T> {
    pub name: String,
    /// Nearest surviving ancestor, always in an earlier batch.
    pub depends_on: Option<String>,
    pub batch: usize,
    pub item: T,
}

/// Ordered rebuild waves. Batch `i` only depends on batches `< i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan<T> {
    batches: Vec<Vec<PlannedArtifact<T>>>,
}

impl<T> Default for BatchPlan<T> {
    fn default() -> Self {
        Self { batches: Vec::new() }
    }
}

impl<T> BatchPlan<T> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> &[Vec<PlannedArtifact<T>>] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<Vec<PlannedArtifact<T>>> {
        self.batches
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Number of artifacts across all batches.
    pub fn len(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    /// Artifacts in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &PlannedArtifact<T>> {
        self.batches.iter().flatten()
    }

    /// Names per batch, handy for logs and assertions.
    pub fn names(&self) -> Vec<Vec<&str>> {
        self.batches
            .iter()
            .map(|b| b.iter().map(|a| a.name.as_str()).collect())
            .collect()
    }
}

/// Order `nodes` into batches.
///
/// - Parent references outside the discovered set are dropped.
/// - A cycle among parent references is a `DependencyCycle` error.
/// - Nodes for which `allowed` is false are excluded. Their children are
///   kept and re-parented to the nearest allowed ancestor (or become roots).
/// - A node's batch is the length of its surviving ancestor chain.
pub fn batch_nodes<T>(
    nodes: Vec<PlanNode<T>>,
    allowed: impl Fn(&PlanNode<T>) -> bool,
) -> Result<BatchPlan<T>> {
    let mut by_name: BTreeMap<String, PlanNode<T>> = BTreeMap::new();
    for node in nodes {
        if by_name.contains_key(&node.name) {
            debug!(name = %node.name, "duplicate artifact in discovery result; keeping first");
            continue;
        }
        by_name.insert(node.name.clone(), node);
    }

    // Parents must be inside the discovered set.
    let parents: BTreeMap<String, Option<String>> = by_name
        .values()
        .map(|n| {
            let parent = n.parent.clone().filter(|p| by_name.contains_key(p) && *p != n.name);
            (n.name.clone(), parent)
        })
        .collect();

    ensure_acyclic(&parents)?;

    let denied: BTreeSet<String> = by_name
        .values()
        .filter(|n| !allowed(n))
        .map(|n| n.name.clone())
        .collect();
    for name in &denied {
        info!(artifact = %name, "artifact excluded from plan by rules");
    }

    let effective: BTreeMap<&str, Option<&str>> = parents
        .keys()
        .filter(|name| !denied.contains(*name))
        .map(|name| (name.as_str(), surviving_ancestor(name, &parents, &denied)))
        .collect();

    let mut depth: BTreeMap<&str, usize> = BTreeMap::new();
    for name in effective.keys().copied() {
        depth_of(name, &effective, &mut depth);
    }

    let mut batches: Vec<Vec<PlannedArtifact<T>>> = Vec::new();
    for (name, node) in by_name {
        if denied.contains(&name) {
            continue;
        }
        let batch = depth.get(name.as_str()).copied().unwrap_or(0);
        let depends_on = effective
            .get(name.as_str())
            .copied()
            .flatten()
            .map(str::to_string);
        if batches.len() <= batch {
            batches.resize_with(batch + 1, Vec::new);
        }
        batches[batch].push(PlannedArtifact {
            name,
            depends_on,
            batch,
            item: node.item,
        });
    }

    Ok(BatchPlan { batches })
}

fn ensure_acyclic(parents: &BTreeMap<String, Option<String>>) -> Result<()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for (name, parent) in parents {
        graph.add_node(name.as_str());
        if let Some(parent) = parent {
            graph.add_edge(parent.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_) => Ok(()),
        Err(cycle) => Err(RebuildError::DependencyCycle(format!(
            "artifact '{}' is its own ancestor",
            cycle.node_id()
        ))),
    }
}

fn surviving_ancestor<'a>(
    name: &str,
    parents: &'a BTreeMap<String, Option<String>>,
    denied: &BTreeSet<String>,
) -> Option<&'a str> {
    let mut current = parents.get(name).and_then(Option::as_deref);
    while let Some(candidate) = current {
        if !denied.contains(candidate) {
            return Some(candidate);
        }
        current = parents.get(candidate).and_then(Option::as_deref);
    }
    None
}

fn depth_of<'a>(
    name: &'a str,
    effective: &BTreeMap<&'a str, Option<&'a str>>,
    memo: &mut BTreeMap<&'a str, usize>,
) -> usize {
    if let Some(d) = memo.get(name) {
        return *d;
    }
    let d = match effective.get(name).copied().flatten() {
        Some(parent) => depth_of(parent, effective, memo) + 1,
        None => 0,
    };
    memo.insert(name, d);
    d
}
