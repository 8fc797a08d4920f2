//! Typed relations between graph nodes.

use crate::model::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Closed set of edge predicates known to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Org node manages a goal.
    Manager,
    /// Org node participates in a goal.
    Participator,
    /// User created (owns) a goal. One per goal.
    Owner,
    /// Goal (or frame) hangs under a parent goal. One per child.
    Parent,
    /// Goal is labelled by a tag. One per goal.
    TagOf,
}

impl RelationKind {
    pub const ALL: [RelationKind; 5] = [
        RelationKind::Manager,
        RelationKind::Participator,
        RelationKind::Owner,
        RelationKind::Parent,
        RelationKind::TagOf,
    ];

    /// Predicate name used at the store boundary.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Participator => "participator",
            Self::Owner => "owner",
            Self::Parent => "parent",
            Self::TagOf => "tag_of",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl Display for RelationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed edge `subject -[predicate]-> object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub subject: NodeId,
    pub predicate: RelationKind,
    pub object: NodeId,
}

impl Edge {
    pub fn new(subject: NodeId, predicate: RelationKind, object: NodeId) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}
