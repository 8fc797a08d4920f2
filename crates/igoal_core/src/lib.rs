//! Goal and organization graph core.
//!
//! Stores goals, departments, duties, users and tags as nodes of a property
//! graph, links them with typed edges, and answers which goals a set of org
//! members can see by walking those edges.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use config::{ConfigError, GraphConfig, LoggingConfig};
pub use db::{open_db, open_db_from_config, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::goal::{Goal, GoalState, GoalSummary, GoalValidationError, Tag, TagRef};
pub use model::node::{Frame, GraphNode, Item, NodeId, NodeKind, OrgNode};
pub use model::org::{normalize_xid, OrgKind, OrgMapping, OrgSet, OrgXids};
pub use model::relation::{Edge, RelationKind};
pub use service::igoal_service::{
    IGoalService, IGoalServiceError, IGoalServiceResult, InsertGoalRequest, InsertStage,
    InsertedGoal,
};
pub use service::visibility::DEFAULT_VISIBILITY_DEPTH;
pub use store::{
    Assigned, Deadline, GraphStore, GraphTxn, QueryVars, SqliteGraphStore, SqliteGraphTxn,
    StoreError, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
