//! Organizational sets and per-kind XID bookkeeping.
//!
//! # Invariants
//! - XIDs are trimmed before use; blank XIDs never reach the store.
//! - Collections keyed by XID are ordered, so batches built from them are
//!   deterministic.

use crate::model::node::{NodeId, NodeKind};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// The three node kinds that can manage or participate in a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OrgKind {
    Department,
    Duty,
    User,
}

impl OrgKind {
    /// Fixed processing order used for resolution, creation and linking.
    pub const ALL: [OrgKind; 3] = [OrgKind::Department, OrgKind::Duty, OrgKind::User];

    pub fn node_kind(self) -> NodeKind {
        match self {
            Self::Department => NodeKind::Department,
            Self::Duty => NodeKind::Duty,
            Self::User => NodeKind::User,
        }
    }

    pub fn from_node_kind(kind: NodeKind) -> Option<Self> {
        match kind {
            NodeKind::Department => Some(Self::Department),
            NodeKind::Duty => Some(Self::Duty),
            NodeKind::User => Some(Self::User),
            NodeKind::Goal | NodeKind::Frame | NodeKind::Item | NodeKind::Tag => None,
        }
    }
}

impl Display for OrgKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.node_kind().as_str())
    }
}

/// Departments, duties and users named by one role of a request.
///
/// Used both as a goal's manager set and participator set, and as the seed
/// set of a visibility query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgSet {
    pub dept_ids: Vec<String>,
    pub duty_ids: Vec<String>,
    pub user_ids: Vec<String>,
}

impl OrgSet {
    pub fn new<S: Into<String>>(
        dept_ids: impl IntoIterator<Item = S>,
        duty_ids: impl IntoIterator<Item = S>,
        user_ids: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            dept_ids: dept_ids.into_iter().map(Into::into).collect(),
            duty_ids: duty_ids.into_iter().map(Into::into).collect(),
            user_ids: user_ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Set naming only users.
    pub fn users<S: Into<String>>(user_ids: impl IntoIterator<Item = S>) -> Self {
        Self {
            user_ids: user_ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Raw XIDs listed for one kind, in caller order.
    pub fn ids(&self, kind: OrgKind) -> &[String] {
        match kind {
            OrgKind::Department => &self.dept_ids,
            OrgKind::Duty => &self.duty_ids,
            OrgKind::User => &self.user_ids,
        }
    }
}

/// One value per organizational kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByOrgKind<T> {
    pub department: T,
    pub duty: T,
    pub user: T,
}

impl<T> ByOrgKind<T> {
    pub fn get(&self, kind: OrgKind) -> &T {
        match kind {
            OrgKind::Department => &self.department,
            OrgKind::Duty => &self.duty,
            OrgKind::User => &self.user,
        }
    }

    pub fn get_mut(&mut self, kind: OrgKind) -> &mut T {
        match kind {
            OrgKind::Department => &mut self.department,
            OrgKind::Duty => &mut self.duty,
            OrgKind::User => &mut self.user,
        }
    }
}

/// Normalized, deduplicated XIDs per kind.
pub type OrgXids = ByOrgKind<BTreeSet<String>>;

/// XID to node id resolution per kind.
pub type OrgMapping = ByOrgKind<BTreeMap<String, NodeId>>;

impl OrgXids {
    /// Collects every XID a goal insertion references: both role sets plus
    /// the creator as a user.
    pub fn for_insertion(manager: &OrgSet, participator: &OrgSet, creator_xid: &str) -> Self {
        let mut xids = Self::from_sets([manager, participator]);
        if let Some(creator) = normalize_xid(creator_xid) {
            xids.user.insert(creator);
        }
        xids
    }

    /// Union of the given sets, normalized.
    pub fn from_sets<'a>(sets: impl IntoIterator<Item = &'a OrgSet>) -> Self {
        let mut xids = Self::default();
        for set in sets {
            for kind in OrgKind::ALL {
                xids.get_mut(kind)
                    .extend(set.ids(kind).iter().filter_map(|xid| normalize_xid(xid)));
            }
        }
        xids
    }

    pub fn is_empty(&self) -> bool {
        OrgKind::ALL.into_iter().all(|kind| self.get(kind).is_empty())
    }

    pub fn len(&self) -> usize {
        OrgKind::ALL.into_iter().map(|kind| self.get(kind).len()).sum()
    }
}

impl OrgMapping {
    /// Resolved node id for an XID, after normalization.
    pub fn node_id(&self, kind: OrgKind, xid: &str) -> Option<NodeId> {
        let normalized = normalize_xid(xid)?;
        self.get(kind).get(&normalized).copied()
    }

    pub fn len(&self) -> usize {
        OrgKind::ALL.into_iter().map(|kind| self.get(kind).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trims an XID; blank input yields `None`.
pub fn normalize_xid(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}
