//! Visibility closure over manager/participator/owner/parent edges.
//!
//! # Invariants
//! - Traversal is bounded by `max_depth` edge hops and terminates on cyclic
//!   parent chains; each reachable goal appears once.
//! - Results are ordered by `updated_at` ascending (node id breaks ties).
//! - No resolvable seed or no reachable goal yields an empty list.

use crate::model::goal::{GoalState, GoalSummary, TagRef};
use crate::model::node::NodeId;
use crate::model::org::OrgXids;
use crate::service::resolver::{decode_rows, org_vars};
use crate::store::{GraphTxn, StoreError, StoreResult};
use serde::Deserialize;

/// Traversal bound used when the caller configures none.
pub const DEFAULT_VISIBILITY_DEPTH: u32 = 10;

const MAX_DEPTH_VAR: &str = "$max_depth";

const VISIBLE_GOALS_QUERY: &str = "WITH RECURSIVE
seeds(node_id) AS (
    SELECT node_id
      FROM graph_nodes
     WHERE (kind = 'department' AND xid IN (SELECT value FROM json_each($dept_xids)))
        OR (kind = 'duty' AND xid IN (SELECT value FROM json_each($duty_xids)))
        OR (kind = 'user' AND xid IN (SELECT value FROM json_each($user_xids)))
),
reach(node_id, depth) AS (
    SELECT node_id, 0 FROM seeds
    UNION
    SELECT e.object_id, r.depth + 1
      FROM reach r
      JOIN graph_edges e ON e.subject_id = r.node_id
     WHERE e.predicate IN ('manager', 'participator', 'owner', 'parent')
       AND r.depth < CAST($max_depth AS INTEGER)
)
SELECT g.node_id AS node_id,
       g.xid AS igoal_id,
       g.name AS name,
       g.state AS state,
       g.created_at AS created_at,
       g.updated_at AS updated_at,
       t.xid AS tag_id,
       t.name AS tag_name,
       (SELECT u.xid
          FROM graph_edges o
          JOIN graph_nodes u ON u.node_id = o.subject_id
         WHERE o.object_id = g.node_id
           AND o.predicate = 'owner'
           AND u.kind = 'user'
         LIMIT 1) AS creator_id
  FROM graph_nodes g
  LEFT JOIN graph_edges te ON te.subject_id = g.node_id AND te.predicate = 'tag_of'
  LEFT JOIN graph_nodes t ON t.node_id = te.object_id
 WHERE g.kind = 'goal'
   AND g.node_id IN (SELECT node_id FROM reach)
 ORDER BY g.updated_at ASC, g.node_id ASC;";

#[derive(Debug, Deserialize)]
struct VisibleGoalRow {
    node_id: NodeId,
    igoal_id: String,
    name: Option<String>,
    state: Option<i64>,
    created_at: Option<i64>,
    updated_at: i64,
    tag_id: Option<String>,
    tag_name: Option<String>,
    creator_id: Option<String>,
}

impl VisibleGoalRow {
    fn into_summary(self) -> StoreResult<GoalSummary> {
        let state = self
            .state
            .and_then(GoalState::from_i64)
            .ok_or_else(|| {
                StoreError::InvalidData(format!(
                    "goal {} has invalid state {:?}",
                    self.node_id, self.state
                ))
            })?;
        let tag = self.tag_id.map(|tag_id| TagRef {
            tag_id,
            name: self.tag_name.unwrap_or_default(),
        });

        Ok(GoalSummary {
            node_id: self.node_id,
            igoal_id: self.igoal_id,
            name: self.name.unwrap_or_default(),
            state,
            created_at: self.created_at.unwrap_or_default(),
            updated_at: self.updated_at,
            tag,
            creator: self.creator_id,
        })
    }
}

/// Goals reachable from the seed org nodes within `max_depth` hops.
///
/// Seeds, closure and projection run as one query so the result comes from
/// a single consistent read.
pub fn visible_goals<T: GraphTxn + ?Sized>(
    txn: &T,
    seeds: &OrgXids,
    max_depth: u32,
) -> StoreResult<Vec<GoalSummary>> {
    if seeds.is_empty() {
        return Ok(Vec::new());
    }

    let mut vars = org_vars(seeds);
    vars.insert(MAX_DEPTH_VAR.to_string(), max_depth.to_string());

    let rows: Vec<VisibleGoalRow> = decode_rows(txn.query(VISIBLE_GOALS_QUERY, &vars)?)?;
    rows.into_iter().map(VisibleGoalRow::into_summary).collect()
}
