//! External-id resolution against the graph store.
//!
//! # Invariants
//! - One composite read per call; no mutation.
//! - XIDs without a stored node are absent from the mapping, not errors.
//! - Store failures propagate; no partial mapping is returned.

use crate::model::node::{NodeId, NodeKind};
use crate::model::org::{OrgKind, OrgMapping, OrgXids};
use crate::store::{GraphTxn, QueryVars, StoreError, StoreResult};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

pub(crate) const DEPT_XIDS_VAR: &str = "$dept_xids";
pub(crate) const DUTY_XIDS_VAR: &str = "$duty_xids";
pub(crate) const USER_XIDS_VAR: &str = "$user_xids";

const RESOLVE_ORG_NODES_QUERY: &str = "SELECT kind, xid, node_id
  FROM graph_nodes
 WHERE kind = 'department'
   AND xid IN (SELECT value FROM json_each($dept_xids))
UNION ALL
SELECT kind, xid, node_id
  FROM graph_nodes
 WHERE kind = 'duty'
   AND xid IN (SELECT value FROM json_each($duty_xids))
UNION ALL
SELECT kind, xid, node_id
  FROM graph_nodes
 WHERE kind = 'user'
   AND xid IN (SELECT value FROM json_each($user_xids))
ORDER BY node_id ASC;";

const RESOLVE_GOAL_NODE_QUERY: &str = "SELECT node_id
  FROM graph_nodes
 WHERE kind = 'goal'
   AND xid = $goal_xid
   AND node_id <> CAST($exclude_node_id AS INTEGER)
 ORDER BY node_id DESC
 LIMIT 1;";

#[derive(Debug, Deserialize)]
struct OrgNodeRow {
    kind: String,
    xid: String,
    node_id: NodeId,
}

#[derive(Debug, Deserialize)]
struct NodeIdRow {
    node_id: NodeId,
}

/// Resolves department, duty and user XIDs to stored node ids.
pub fn resolve_org_nodes<T: GraphTxn + ?Sized>(txn: &T, xids: &OrgXids) -> StoreResult<OrgMapping> {
    let mut mapping = OrgMapping::default();
    if xids.is_empty() {
        return Ok(mapping);
    }

    let rows: Vec<OrgNodeRow> = decode_rows(txn.query(RESOLVE_ORG_NODES_QUERY, &org_vars(xids))?)?;
    for row in rows {
        let kind = NodeKind::parse(&row.kind)
            .and_then(OrgKind::from_node_kind)
            .ok_or_else(|| {
                StoreError::InvalidData(format!(
                    "unexpected node kind `{}` in org resolution",
                    row.kind
                ))
            })?;
        // Oldest node wins should duplicates ever predate the unique index.
        mapping.get_mut(kind).entry(row.xid).or_insert(row.node_id);
    }

    debug!(
        "event=org_resolve module=service status=ok requested={} resolved={}",
        xids.len(),
        mapping.len()
    );
    Ok(mapping)
}

/// Latest goal node carrying `xid`, ignoring `exclude`.
pub fn resolve_goal_node<T: GraphTxn + ?Sized>(
    txn: &T,
    xid: &str,
    exclude: NodeId,
) -> StoreResult<Option<NodeId>> {
    let mut vars = QueryVars::new();
    vars.insert("$goal_xid".to_string(), xid.to_string());
    vars.insert("$exclude_node_id".to_string(), exclude.as_raw().to_string());

    let rows: Vec<NodeIdRow> = decode_rows(txn.query(RESOLVE_GOAL_NODE_QUERY, &vars)?)?;
    Ok(rows.into_iter().next().map(|row| row.node_id))
}

/// Binds one JSON term list per kind, the shape the XID filters expect.
pub(crate) fn org_vars(xids: &OrgXids) -> QueryVars {
    let mut vars = QueryVars::new();
    vars.insert(DEPT_XIDS_VAR.to_string(), xid_terms(&xids.department));
    vars.insert(DUTY_XIDS_VAR.to_string(), xid_terms(&xids.duty));
    vars.insert(USER_XIDS_VAR.to_string(), xid_terms(&xids.user));
    vars
}

fn xid_terms(xids: &BTreeSet<String>) -> String {
    Value::from(xids.iter().cloned().collect::<Vec<_>>()).to_string()
}

pub(crate) fn decode_rows<R: DeserializeOwned>(value: Value) -> StoreResult<Vec<R>> {
    serde_json::from_value(value)
        .map_err(|err| StoreError::InvalidData(format!("cannot decode store rows: {err}")))
}
