//! Goal ("igoal") and tag records.
//!
//! # Invariants
//! - `xid` is never blank for a goal accepted by the service layer.
//! - `updated_at` is owned by the store; callers never set it.

use crate::model::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Goal lifecycle state, persisted as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    /// Drafted but not yet started.
    Pending,
    /// Being worked on.
    Active,
    /// Reached.
    Completed,
    /// Dropped before completion.
    Cancelled,
}

impl GoalState {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Active => 1,
            Self::Completed => 2,
            Self::Cancelled => 3,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::Active),
            2 => Some(Self::Completed),
            3 => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Label attached to goals through `tag_of`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(skip)]
    pub uid: Option<NodeId>,
    pub xid: String,
    pub name: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl Tag {
    pub fn new(xid: impl Into<String>, name: impl Into<String>, created_at: i64) -> Self {
        Self {
            uid: None,
            xid: xid.into(),
            name: name.into(),
            created_at,
        }
    }
}

/// Goal node as submitted for insertion.
///
/// `parent_xid` and `tag` are not stored on the node itself; the service
/// turns them into `parent` and `tag_of` edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goal {
    pub uid: Option<NodeId>,
    pub xid: String,
    pub name: String,
    pub state: GoalState,
    /// Unix epoch milliseconds, supplied by the caller.
    pub created_at: i64,
    pub parent_xid: Option<String>,
    pub tag: Option<Tag>,
}

impl Goal {
    /// Creates a bare goal with no parent and no tag.
    pub fn new(
        xid: impl Into<String>,
        name: impl Into<String>,
        state: GoalState,
        created_at: i64,
    ) -> Self {
        Self {
            uid: None,
            xid: xid.into(),
            name: name.into(),
            state,
            created_at,
            parent_xid: None,
            tag: None,
        }
    }

    pub fn with_parent(mut self, parent_xid: impl Into<String>) -> Self {
        self.parent_xid = Some(parent_xid.into());
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Validates caller-supplied fields before any store call.
    pub fn validate(&self) -> Result<(), GoalValidationError> {
        if self.xid.trim().is_empty() {
            return Err(GoalValidationError::BlankXid);
        }
        if self.uid.is_some() {
            return Err(GoalValidationError::AlreadyPersisted);
        }
        if let Some(tag) = &self.tag {
            if tag.xid.trim().is_empty() {
                return Err(GoalValidationError::BlankTagXid);
            }
        }
        Ok(())
    }
}

/// Validation failures for goal insertion input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalValidationError {
    BlankXid,
    BlankTagXid,
    /// Goal already carries a node id and cannot be created again.
    AlreadyPersisted,
}

impl Display for GoalValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankXid => write!(f, "goal xid must not be blank"),
            Self::BlankTagXid => write!(f, "tag xid must not be blank"),
            Self::AlreadyPersisted => write!(f, "goal already has a node id"),
        }
    }
}

impl std::error::Error for GoalValidationError {}

/// Tag identity projected into visibility results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub tag_id: String,
    pub name: String,
}

/// Denormalized goal row returned by the visibility query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalSummary {
    pub node_id: NodeId,
    pub igoal_id: String,
    pub name: String,
    pub state: GoalState,
    pub created_at: i64,
    pub updated_at: i64,
    pub tag: Option<TagRef>,
    /// XID of the owning user, if the owner edge is present.
    pub creator: Option<String>,
}
