//! Candidate node ordering.

use std::collections::HashSet;

use shardgrid_core::{CandidateNode, NodeId};

/// Order `nodes` for placement: nodes not in `preferred` first, then the
/// preferred ones. Relative input order is kept inside each group.
///
/// Preferred nodes are the deployment's master nodes, so a re-placement
/// fills fresh nodes before touching ones that already host its namespaces.
pub fn rank(nodes: &[CandidateNode], preferred: &[NodeId]) -> Vec<CandidateNode> {
    let preferred: HashSet<&str> = preferred.iter().map(String::as_str).collect();
    let (masters, fresh): (Vec<_>, Vec<_>) = nodes
        .iter()
        .cloned()
        .partition(|n| preferred.contains(n.id.as_str()));

    fresh.into_iter().chain(masters).collect()
}
