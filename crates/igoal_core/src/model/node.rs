//! Node identity and the closed node union.

use crate::model::goal::{Goal, Tag};
use crate::model::org::OrgKind;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Opaque identifier assigned by the graph store on node creation.
///
/// Never chosen by callers; only obtained from store responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(i64);

impl NodeId {
    /// Wraps a raw store row id.
    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    pub fn as_raw(self) -> i64 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Kind tag persisted with every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Department,
    Duty,
    User,
    Goal,
    Frame,
    Item,
    Tag,
}

impl NodeKind {
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Department,
        NodeKind::Duty,
        NodeKind::User,
        NodeKind::Goal,
        NodeKind::Frame,
        NodeKind::Item,
        NodeKind::Tag,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Department => "department",
            Self::Duty => "duty",
            Self::User => "user",
            Self::Goal => "goal",
            Self::Frame => "frame",
            Self::Item => "item",
            Self::Tag => "tag",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Whether at most one node of this kind may exist per XID.
    ///
    /// Goals, frames and items are created per call; everything else is
    /// resolved or created by XID.
    pub fn is_identity_kind(self) -> bool {
        match self {
            Self::Department | Self::Duty | Self::User | Self::Tag => true,
            Self::Goal | Self::Frame | Self::Item => false,
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Department, duty or user node. Carries nothing beyond identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgNode {
    pub uid: Option<NodeId>,
    pub xid: String,
}

impl OrgNode {
    /// Bare node ready for a create mutation.
    pub fn new(xid: impl Into<String>) -> Self {
        Self {
            uid: None,
            xid: xid.into(),
        }
    }
}

/// Grouping node that hangs under a goal or another frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub uid: Option<NodeId>,
    pub xid: String,
    pub name: String,
}

impl Frame {
    pub fn new(xid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: None,
            xid: xid.into(),
            name: name.into(),
        }
    }
}

/// Leaf entry filed under a frame through a `parent` edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub uid: Option<NodeId>,
    pub xid: String,
    pub name: String,
}

impl Item {
    pub fn new(xid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: None,
            xid: xid.into(),
            name: name.into(),
        }
    }
}

/// Closed set of node variants stored in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphNode {
    Department(OrgNode),
    Duty(OrgNode),
    User(OrgNode),
    Goal(Goal),
    Frame(Frame),
    Item(Item),
    Tag(Tag),
}

impl GraphNode {
    /// Builds a bare organizational node of the given kind.
    pub fn org(kind: OrgKind, xid: impl Into<String>) -> Self {
        let node = OrgNode::new(xid);
        match kind {
            OrgKind::Department => Self::Department(node),
            OrgKind::Duty => Self::Duty(node),
            OrgKind::User => Self::User(node),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Department(_) => NodeKind::Department,
            Self::Duty(_) => NodeKind::Duty,
            Self::User(_) => NodeKind::User,
            Self::Goal(_) => NodeKind::Goal,
            Self::Frame(_) => NodeKind::Frame,
            Self::Item(_) => NodeKind::Item,
            Self::Tag(_) => NodeKind::Tag,
        }
    }

    pub fn xid(&self) -> &str {
        match self {
            Self::Department(node) | Self::Duty(node) | Self::User(node) => &node.xid,
            Self::Goal(goal) => &goal.xid,
            Self::Frame(frame) => &frame.xid,
            Self::Item(item) => &item.xid,
            Self::Tag(tag) => &tag.xid,
        }
    }

    /// Store-assigned id; `None` until the node has been created.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::Department(node) | Self::Duty(node) | Self::User(node) => node.uid,
            Self::Goal(goal) => goal.uid,
            Self::Frame(frame) => frame.uid,
            Self::Item(item) => item.uid,
            Self::Tag(tag) => tag.uid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GraphNode, NodeId, NodeKind};
    use crate::model::goal::{Goal, GoalState};
    use crate::model::org::OrgKind;

    #[test]
    fn node_kind_round_trips_through_text() {
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NodeKind::parse("igoal"), None);
    }

    #[test]
    fn goals_frames_and_items_are_not_identity_kinds() {
        assert!(NodeKind::User.is_identity_kind());
        assert!(NodeKind::Tag.is_identity_kind());
        assert!(!NodeKind::Goal.is_identity_kind());
        assert!(!NodeKind::Frame.is_identity_kind());
        assert!(!NodeKind::Item.is_identity_kind());
    }

    #[test]
    fn graph_node_exposes_shared_identity() {
        let dept = GraphNode::org(OrgKind::Department, "4");
        assert_eq!(dept.kind(), NodeKind::Department);
        assert_eq!(dept.xid(), "4");
        assert_eq!(dept.node_id(), None);

        let mut goal = Goal::new("1004", "IGoal 1004", GoalState::Active, 0);
        goal.uid = Some(NodeId::from_raw(26));
        let node = GraphNode::Goal(goal);
        assert_eq!(node.kind(), NodeKind::Goal);
        assert_eq!(node.node_id(), Some(NodeId::from_raw(26)));
    }

    #[test]
    fn node_id_displays_as_hex() {
        assert_eq!(NodeId::from_raw(26).to_string(), "0x1a");
    }
}
