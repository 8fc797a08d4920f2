//! Edge construction between organizational nodes and a goal.
//!
//! # Invariants
//! - Exactly one `owner` edge, always last.
//! - Role edges come out grouped by kind (departments, duties, users), and
//!   within a kind managers before participators, each in caller order.
//! - XIDs without a resolved node are skipped; repeated XIDs link once.

use crate::model::node::NodeId;
use crate::model::org::{normalize_xid, OrgKind, OrgMapping, OrgSet};
use crate::model::relation::{Edge, RelationKind};
use std::collections::HashSet;

/// Builds manager, participator and owner edges pointing at `goal`.
pub fn build_edges(
    goal: NodeId,
    manager: &OrgSet,
    participator: &OrgSet,
    creator: NodeId,
    mapping: &OrgMapping,
) -> Vec<Edge> {
    let mut edges = Vec::new();
    let mut linked = HashSet::new();

    for kind in OrgKind::ALL {
        for (set, relation) in [
            (manager, RelationKind::Manager),
            (participator, RelationKind::Participator),
        ] {
            for xid in set.ids(kind) {
                let Some(subject) = normalize_xid(xid)
                    .and_then(|normalized| mapping.get(kind).get(&normalized).copied())
                else {
                    continue;
                };
                if linked.insert((subject, relation)) {
                    edges.push(Edge::new(subject, relation, goal));
                }
            }
        }
    }

    edges.push(Edge::new(creator, RelationKind::Owner, goal));
    edges
}

/// Builds the goal's own outgoing `parent` and `tag_of` edges.
pub fn build_goal_links(goal: NodeId, parent: Option<NodeId>, tag: Option<NodeId>) -> Vec<Edge> {
    let mut edges = Vec::with_capacity(2);
    if let Some(parent) = parent {
        edges.push(Edge::new(goal, RelationKind::Parent, parent));
    }
    if let Some(tag) = tag {
        edges.push(Edge::new(goal, RelationKind::TagOf, tag));
    }
    edges
}
