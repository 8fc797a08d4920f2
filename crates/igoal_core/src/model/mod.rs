//! Graph domain model for organizational and goal-tracking nodes.
//!
//! # Responsibility
//! - Define the closed set of node variants and relation kinds.
//! - Define request-scoped value objects (manager/participator sets).
//!
//! # Invariants
//! - Every node is identified externally by an XID and, once persisted, by a
//!   store-assigned `NodeId`.
//! - Relation kinds form a closed enumeration; no free-form predicates.

pub mod goal;
pub mod node;
pub mod org;
pub mod relation;
