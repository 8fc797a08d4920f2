//! Goal insertion and visibility use-case service.
//!
//! # Responsibility
//! - Run goal insertion as one transaction: create goal, resolve and upsert
//!   org nodes, link edges, commit.
//! - Answer visibility queries with one read-only transaction.
//!
//! # Invariants
//! - Any failure before commit abandons the transaction; nothing is
//!   persisted and the underlying error is returned unchanged.
//! - No retries; retry policy belongs to the caller.
//! - A committed goal has exactly one owner edge, from the creator.

use crate::config::GraphConfig;
use crate::model::goal::{Goal, GoalSummary, GoalValidationError};
use crate::model::node::{GraphNode, NodeId};
use crate::model::org::{normalize_xid, OrgMapping, OrgSet, OrgXids};
use crate::model::relation::Edge;
use crate::service::linker::{build_edges, build_goal_links};
use crate::service::resolver::{resolve_goal_node, resolve_org_nodes};
use crate::service::upsert::upsert_org_nodes;
use crate::service::visibility::{visible_goals, DEFAULT_VISIBILITY_DEPTH};
use crate::store::{Deadline, GraphStore, GraphTxn, StoreError, StoreResult};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// Progress of one goal insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStage {
    Begin,
    GoalCreated,
    OrgsResolved,
    OrgsUpserted,
    EdgesLinked,
    Committed,
    Aborted,
}

impl InsertStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::GoalCreated => "goal_created",
            Self::OrgsResolved => "orgs_resolved",
            Self::OrgsUpserted => "orgs_upserted",
            Self::EdgesLinked => "edges_linked",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }
}

/// Input for one goal insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertGoalRequest {
    pub goal: Goal,
    pub manager: OrgSet,
    pub participator: OrgSet,
    /// User XID recorded as the goal owner.
    pub creator_xid: String,
}

/// Result of a committed insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedGoal {
    pub goal_id: NodeId,
    /// Resolved or created ids for every org XID the request referenced.
    pub org_nodes: OrgMapping,
    /// Org nodes that had to be submitted for creation.
    pub created_org_nodes: usize,
    /// Edges written, in emission order.
    pub edges: Vec<Edge>,
}

/// Errors from goal service operations.
#[derive(Debug)]
pub enum IGoalServiceError {
    /// Goal fields rejected before any store call.
    InvalidGoal(GoalValidationError),
    /// Creator XID is blank after trim.
    BlankCreator,
    /// Store failure, propagated verbatim.
    Store(StoreError),
}

impl Display for IGoalServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidGoal(err) => write!(f, "invalid goal: {err}"),
            Self::BlankCreator => write!(f, "creator xid must not be blank"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IGoalServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidGoal(err) => Some(err),
            Self::BlankCreator => None,
            Self::Store(err) => Some(err),
        }
    }
}

impl From<StoreError> for IGoalServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<GoalValidationError> for IGoalServiceError {
    fn from(value: GoalValidationError) -> Self {
        Self::InvalidGoal(value)
    }
}

pub type IGoalServiceResult<T> = Result<T, IGoalServiceError>;

/// Goal graph service facade over a graph store.
pub struct IGoalService<S: GraphStore> {
    store: S,
    visibility_depth: u32,
    op_timeout: Option<Duration>,
}

impl<S: GraphStore> IGoalService<S> {
    /// Creates a service with default depth and no operation timeout.
    pub fn new(store: S) -> Self {
        Self {
            store,
            visibility_depth: DEFAULT_VISIBILITY_DEPTH,
            op_timeout: None,
        }
    }

    /// Creates a service using depth and timeout from `config`.
    pub fn with_config(store: S, config: &GraphConfig) -> Self {
        Self {
            store,
            visibility_depth: config.visibility_depth,
            op_timeout: config.op_timeout(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn visibility_depth(&self) -> u32 {
        self.visibility_depth
    }

    /// Inserts a goal with its manager, participator and owner edges under
    /// the configured operation timeout.
    pub fn insert_goal(&self, request: &InsertGoalRequest) -> IGoalServiceResult<InsertedGoal> {
        self.insert_goal_within(request, self.default_deadline())
    }

    /// Inserts a goal, failing with `StoreError::Timeout` once `deadline`
    /// passes.
    pub fn insert_goal_within(
        &self,
        request: &InsertGoalRequest,
        deadline: Deadline,
    ) -> IGoalServiceResult<InsertedGoal> {
        request.goal.validate()?;
        let creator_xid =
            normalize_xid(&request.creator_xid).ok_or(IGoalServiceError::BlankCreator)?;

        let started_at = Instant::now();
        let mut stage = InsertStage::Begin;
        let outcome = self.store.begin(deadline).and_then(|mut txn| {
            match run_insert(&mut txn, request, &creator_xid, &mut stage) {
                Ok(inserted) => {
                    txn.commit()?;
                    Ok(inserted)
                }
                Err(err) => {
                    if let Err(discard_err) = txn.discard() {
                        warn!(
                            "event=igoal_insert module=service status=discard_failed stage={} error={}",
                            stage.as_str(),
                            discard_err
                        );
                    }
                    Err(err)
                }
            }
        });

        match outcome {
            Ok(inserted) => {
                info!(
                    "event=igoal_insert module=service status=ok stage={} goal_id={} created={} edges={} duration_ms={}",
                    InsertStage::Committed.as_str(),
                    inserted.goal_id,
                    inserted.created_org_nodes,
                    inserted.edges.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(inserted)
            }
            Err(err) => {
                error!(
                    "event=igoal_insert module=service status=error stage={} failed_after={} error_code={} duration_ms={} error={}",
                    InsertStage::Aborted.as_str(),
                    stage.as_str(),
                    err.code(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Goals visible to the seed departments, duties and users.
    pub fn visible_goals(&self, seeds: &OrgSet) -> IGoalServiceResult<Vec<GoalSummary>> {
        self.visible_goals_within(seeds, self.default_deadline())
    }

    pub fn visible_goals_within(
        &self,
        seeds: &OrgSet,
        deadline: Deadline,
    ) -> IGoalServiceResult<Vec<GoalSummary>> {
        let started_at = Instant::now();
        let xids = OrgXids::from_sets([seeds]);
        if xids.is_empty() {
            debug!("event=visible_goals module=service status=ok seeds=0 goals=0");
            return Ok(Vec::new());
        }

        let txn = self.store.begin_read_only(deadline)?;
        let result = visible_goals(&txn, &xids, self.visibility_depth);
        close_read(txn, "visible_goals");

        match result {
            Ok(goals) => {
                info!(
                    "event=visible_goals module=service status=ok seeds={} depth={} goals={} duration_ms={}",
                    xids.len(),
                    self.visibility_depth,
                    goals.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(goals)
            }
            Err(err) => {
                error!(
                    "event=visible_goals module=service status=error error_code={} error={}",
                    err.code(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Resolves org XIDs to node ids without creating anything.
    pub fn resolve_org_nodes(&self, set: &OrgSet) -> IGoalServiceResult<OrgMapping> {
        let xids = OrgXids::from_sets([set]);
        let txn = self.store.begin_read_only(self.default_deadline())?;
        let result = resolve_org_nodes(&txn, &xids);
        close_read(txn, "org_resolve");
        Ok(result?)
    }

    fn default_deadline(&self) -> Deadline {
        Deadline::from_timeout(self.op_timeout)
    }
}

fn run_insert<T: GraphTxn>(
    txn: &mut T,
    request: &InsertGoalRequest,
    creator_xid: &str,
    stage: &mut InsertStage,
) -> StoreResult<InsertedGoal> {
    let goal_id = txn
        .create_nodes(&[GraphNode::Goal(request.goal.clone())])?
        .uid_at(0)
        .ok_or_else(|| StoreError::mutation("create_nodes", "store assigned no id to goal"))?;
    advance(stage, InsertStage::GoalCreated);

    let required = OrgXids::for_insertion(&request.manager, &request.participator, creator_xid);
    let resolved = resolve_org_nodes(&*txn, &required)?;
    advance(stage, InsertStage::OrgsResolved);

    let upserted = upsert_org_nodes(txn, &required, resolved)?;
    advance(stage, InsertStage::OrgsUpserted);

    let creator_id = upserted
        .mapping
        .user
        .get(creator_xid)
        .copied()
        .ok_or_else(|| StoreError::mutation("create_nodes", "creator was not assigned a node"))?;
    let parent_id = match request.goal.parent_xid.as_deref().and_then(normalize_xid) {
        Some(parent_xid) => resolve_goal_node(&*txn, &parent_xid, goal_id)?,
        None => None,
    };
    let tag_id = match &request.goal.tag {
        Some(tag) => Some(
            txn.create_nodes(&[GraphNode::Tag(tag.clone())])?
                .uid_at(0)
                .ok_or_else(|| StoreError::mutation("create_nodes", "store assigned no id to tag"))?,
        ),
        None => None,
    };

    let mut edges = build_edges(
        goal_id,
        &request.manager,
        &request.participator,
        creator_id,
        &upserted.mapping,
    );
    edges.extend(build_goal_links(goal_id, parent_id, tag_id));
    txn.add_edges(&edges)?;
    advance(stage, InsertStage::EdgesLinked);

    Ok(InsertedGoal {
        goal_id,
        org_nodes: upserted.mapping,
        created_org_nodes: upserted.created,
        edges,
    })
}

/// Ends a read-only transaction; a failed rollback is logged, not returned.
fn close_read<T: GraphTxn>(txn: T, event: &str) {
    if let Err(err) = txn.discard() {
        warn!(
            "event={event} module=service status=discard_failed error_code={} error={}",
            err.code(),
            err
        );
    }
}

fn advance(stage: &mut InsertStage, next: InsertStage) {
    debug!(
        "event=igoal_insert module=service status=progress from={} to={}",
        stage.as_str(),
        next.as_str()
    );
    *stage = next;
}
