//! Goal graph use-case services.
//!
//! # Responsibility
//! - Resolve and upsert organizational nodes by external id.
//! - Link goals to their managers, participators and owner.
//! - Answer visibility queries over the goal graph.
//!
//! # Invariants
//! - Services only talk to storage through `store::GraphTxn`.

pub mod igoal_service;
pub mod linker;
pub mod resolver;
pub mod upsert;
pub mod visibility;
