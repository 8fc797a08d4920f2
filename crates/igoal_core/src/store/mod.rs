//! Graph store boundary.
//!
//! # Responsibility
//! - Define the transactional query/mutate contract the services run on.
//! - Define the store error taxonomy and caller-supplied deadlines.
//!
//! # Invariants
//! - Writes staged in a transaction are visible to other readers only after
//!   `commit`; dropping or discarding an uncommitted transaction drops them.
//! - Every store call checks its deadline first and fails with
//!   `StoreError::Timeout` once it has passed.
//! - `create_nodes` assigns exactly one id per submitted node, keyed by the
//!   submission placeholder `blank-<index>`.

use crate::db::DbError;
use crate::model::node::{GraphNode, NodeId};
use crate::model::relation::Edge;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

mod sqlite_store;

pub use sqlite_store::{SqliteGraphStore, SqliteGraphTxn};

/// Named string parameters for a query template (`$name` -> value).
pub type QueryVars = BTreeMap<String, String>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Underlying cause carried by query/mutation failures.
pub type StoreCause = Box<dyn Error + Send + Sync + 'static>;

/// Failures raised at the graph store boundary.
#[derive(Debug)]
pub enum StoreError {
    /// Store could not be opened or a transaction could not be started.
    Connection(DbError),
    /// Malformed query or store-side query failure.
    Query {
        operation: &'static str,
        source: StoreCause,
    },
    /// Create or edge mutation failure, including commit.
    Mutation {
        operation: &'static str,
        source: StoreCause,
    },
    /// Caller-supplied deadline passed before the operation finished.
    Timeout { operation: &'static str },
    /// Store returned rows that do not decode into the expected shape.
    InvalidData(String),
}

impl StoreError {
    pub fn query(operation: &'static str, source: impl Into<StoreCause>) -> Self {
        Self::Query {
            operation,
            source: source.into(),
        }
    }

    pub fn mutation(operation: &'static str, source: impl Into<StoreCause>) -> Self {
        Self::Mutation {
            operation,
            source: source.into(),
        }
    }

    /// Stable short code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "store_connection",
            Self::Query { .. } => "store_query",
            Self::Mutation { .. } => "store_mutation",
            Self::Timeout { .. } => "store_timeout",
            Self::InvalidData(_) => "store_invalid_data",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(err) => write!(f, "graph store connection failed: {err}"),
            Self::Query { operation, source } => {
                write!(f, "graph store query `{operation}` failed: {source}")
            }
            Self::Mutation { operation, source } => {
                write!(f, "graph store mutation `{operation}` failed: {source}")
            }
            Self::Timeout { operation } => {
                write!(f, "graph store operation `{operation}` exceeded its deadline")
            }
            Self::InvalidData(message) => write!(f, "invalid graph store data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connection(err) => Some(err),
            Self::Query { source, .. } | Self::Mutation { source, .. } => Some(source.as_ref()),
            Self::Timeout { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Connection(value)
    }
}

/// Point in time after which store calls fail with `StoreError::Timeout`.
///
/// The default deadline never expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    /// `None` maps to a deadline that never expires.
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::none, Self::after)
    }

    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|instant| Instant::now() >= instant)
    }

    /// Time left before expiry; `None` for an unbounded deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|instant| instant.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self, operation: &'static str) -> StoreResult<()> {
        if self.is_expired() {
            return Err(StoreError::Timeout { operation });
        }
        Ok(())
    }
}

/// Ids assigned by a create mutation, keyed by submission placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assigned {
    pub uids: BTreeMap<String, NodeId>,
}

impl Assigned {
    /// Placeholder naming the node submitted at `index`.
    pub fn placeholder(index: usize) -> String {
        format!("blank-{index}")
    }

    /// Id assigned to the node submitted at `index`.
    pub fn uid_at(&self, index: usize) -> Option<NodeId> {
        self.uids.get(&Self::placeholder(index)).copied()
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }
}

/// Source of graph transactions.
pub trait GraphStore {
    type Txn<'a>: GraphTxn
    where
        Self: 'a;

    /// Opens a read-write transaction.
    fn begin(&self, deadline: Deadline) -> StoreResult<Self::Txn<'_>>;

    /// Opens a transaction used only for one consistent read.
    fn begin_read_only(&self, deadline: Deadline) -> StoreResult<Self::Txn<'_>>;
}

/// One store transaction.
pub trait GraphTxn {
    /// Runs a parameterized query; returns a JSON array of row objects.
    ///
    /// Variables the template does not reference are ignored.
    fn query(&self, template: &str, vars: &QueryVars) -> StoreResult<Value>;

    /// Creates bare nodes (no `uid` set) in submission order.
    ///
    /// Identity kinds (see `NodeKind::is_identity_kind`) resolve to the
    /// existing node when one with the same kind and XID is already stored.
    fn create_nodes(&mut self, nodes: &[GraphNode]) -> StoreResult<Assigned>;

    /// Adds edges; edges that already exist are left untouched.
    fn add_edges(&mut self, edges: &[Edge]) -> StoreResult<()>;

    fn commit(self) -> StoreResult<()>
    where
        Self: Sized;

    fn discard(self) -> StoreResult<()>
    where
        Self: Sized;
}
