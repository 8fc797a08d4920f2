//! Create-if-missing for organizational nodes.
//!
//! # Invariants
//! - At most one create mutation per kind per call, one entry per missing
//!   XID, submitted in XID order.
//! - After success every required XID has a node id in the mapping.
//! - Nothing is created when every required XID already resolved.

use crate::model::node::{GraphNode, NodeId};
use crate::model::org::{OrgKind, OrgMapping, OrgXids};
use crate::store::{Assigned, GraphTxn, StoreError, StoreResult};
use std::collections::{BTreeMap, BTreeSet};

/// Mapping after upsert, with the number of nodes created per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub mapping: OrgMapping,
    pub created: usize,
}

/// Upserts every kind in fixed order: departments, duties, users.
pub fn upsert_org_nodes<T: GraphTxn + ?Sized>(
    txn: &mut T,
    required: &OrgXids,
    existing: OrgMapping,
) -> StoreResult<UpsertOutcome> {
    let mut outcome = UpsertOutcome {
        mapping: existing,
        created: 0,
    };
    for kind in OrgKind::ALL {
        let resolved = std::mem::take(outcome.mapping.get_mut(kind));
        let (merged, created) = upsert_kind(txn, kind, required.get(kind), resolved)?;
        *outcome.mapping.get_mut(kind) = merged;
        outcome.created += created;
    }
    Ok(outcome)
}

/// Creates nodes for `required - keys(existing)` and merges the new ids.
///
/// Returns the merged mapping and how many nodes were submitted.
pub fn upsert_kind<T: GraphTxn + ?Sized>(
    txn: &mut T,
    kind: OrgKind,
    required: &BTreeSet<String>,
    mut existing: BTreeMap<String, NodeId>,
) -> StoreResult<(BTreeMap<String, NodeId>, usize)> {
    let missing: Vec<&String> = required
        .iter()
        .filter(|xid| !existing.contains_key(xid.as_str()))
        .collect();
    if missing.is_empty() {
        return Ok((existing, 0));
    }

    let nodes: Vec<GraphNode> = missing
        .iter()
        .map(|xid| GraphNode::org(kind, xid.as_str()))
        .collect();
    let assigned = txn.create_nodes(&nodes)?;

    for (index, xid) in missing.iter().enumerate() {
        let node_id = assigned.uid_at(index).ok_or_else(|| {
            StoreError::mutation(
                "create_nodes",
                format!(
                    "store assigned no id to {kind} placeholder {}",
                    Assigned::placeholder(index)
                ),
            )
        })?;
        existing.insert((*xid).clone(), node_id);
    }
    Ok((existing, missing.len()))
}
