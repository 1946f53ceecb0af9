//! Execution planning for the resource pipeline.
//!
//! The stage dependency chain (primary → {secondary, index}, transcript →
//! summary) is an explicit DAG evaluated in topological order, so adding a
//! new resource kind only means extending [`ResourceKind::dependencies`].

use std::collections::BTreeSet;

use crate::task::{ResourceKind, ResourceSelection};

/// Ordered list of stages to run for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    order: Vec<ResourceKind>,
}

impl StagePlan {
    /// Build the plan for a selection.
    ///
    /// The requested set is closed over dependencies first: requesting
    /// `secondary` without `primary` still schedules the primary stage,
    /// matching how a caller-facing "extract the audio" request has to fetch
    /// the media first. The aggregate status is computed over the requested
    /// set only, so closure additions never change the task outcome.
    pub fn for_selection(selection: &ResourceSelection) -> Self {
        let mut included: BTreeSet<ResourceKind> = BTreeSet::new();
        for kind in selection.requested() {
            include_with_dependencies(kind, &mut included);
        }
        Self {
            order: topological_order(&included),
        }
    }

    /// Stages in execution order.
    pub fn order(&self) -> &[ResourceKind] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn include_with_dependencies(kind: ResourceKind, out: &mut BTreeSet<ResourceKind>) {
    if out.insert(kind) {
        for dep in kind.dependencies() {
            include_with_dependencies(*dep, out);
        }
    }
}

/// Kahn's algorithm over the included kinds, breaking ties in declaration
/// order so the plan is deterministic.
fn topological_order(included: &BTreeSet<ResourceKind>) -> Vec<ResourceKind> {
    let mut order = Vec::with_capacity(included.len());
    let mut placed: BTreeSet<ResourceKind> = BTreeSet::new();

    while placed.len() < included.len() {
        let mut advanced = false;
        for kind in ResourceKind::ALL {
            if !included.contains(&kind) || placed.contains(&kind) {
                continue;
            }
            let ready = kind
                .dependencies()
                .iter()
                .all(|d| !included.contains(d) || placed.contains(d));
            if ready {
                order.push(kind);
                placed.insert(kind);
                advanced = true;
            }
        }
        // The static dependency table is acyclic; this guards a future edit
        // that accidentally introduces a cycle.
        assert!(advanced, "resource dependency graph contains a cycle");
    }

    order
}
