//! SQLite-backed graph store.
//!
//! # Responsibility
//! - Map node/edge mutations onto `graph_nodes` / `graph_edges`.
//! - Run query templates with named `$` parameters and return rows as JSON.
//!
//! # Invariants
//! - Write transactions start with `BEGIN IMMEDIATE`, so concurrent writers
//!   on one database file are serialized.
//! - Identity-kind nodes are created through a single upsert statement keyed
//!   by the `(kind, xid)` unique index; concurrent first references to one
//!   XID converge on one row.
//! - Lock waits never outlast the caller's deadline; contention cut short by
//!   the deadline surfaces as `StoreError::Timeout`.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::node::{GraphNode, NodeId};
use crate::model::relation::Edge;
use crate::store::{
    Assigned, Deadline, GraphStore, GraphTxn, QueryVars, StoreError, StoreResult,
};
use log::{debug, warn};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode, Transaction, TransactionBehavior};
use serde_json::{Map, Number, Value};
use std::time::Duration;

const UPSERT_IDENTITY_NODE_SQL: &str = "INSERT INTO graph_nodes (kind, xid, name, state, created_at)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT (kind, xid) WHERE kind IN ('department', 'duty', 'user', 'tag')
DO UPDATE SET xid = excluded.xid
RETURNING node_id;";

const INSERT_NODE_SQL: &str = "INSERT INTO graph_nodes (kind, xid, name, state, created_at)
VALUES (?1, ?2, ?3, ?4, ?5)
RETURNING node_id;";

const INSERT_EDGE_SQL: &str = "INSERT INTO graph_edges (subject_id, predicate, object_id)
VALUES (?1, ?2, ?3)
ON CONFLICT (subject_id, predicate, object_id) DO NOTHING;";

/// Graph store over one migrated SQLite connection.
pub struct SqliteGraphStore<'conn> {
    conn: &'conn Connection,
    busy_timeout: Duration,
}

impl<'conn> SqliteGraphStore<'conn> {
    /// Creates the store from a connection returned by `db::open_db*`.
    ///
    /// The connection's current `busy_timeout` is the longest any statement
    /// waits for a lock; a caller deadline can only shorten it.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        let expected_version = latest_version();
        let actual_version = current_user_version(conn)?;
        if actual_version != expected_version {
            return Err(StoreError::Connection(DbError::UninitializedConnection {
                expected_version,
                actual_version,
            }));
        }
        let busy_timeout_ms: u64 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .map_err(|err| StoreError::Connection(err.into()))?;
        Ok(Self {
            conn,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
        })
    }

    fn open_txn(
        &self,
        behavior: TransactionBehavior,
        deadline: Deadline,
    ) -> StoreResult<SqliteGraphTxn<'_>> {
        deadline.check("begin")?;
        let capped = bound_lock_wait(self.conn, self.busy_timeout, &deadline)
            .map_err(|err| StoreError::Connection(err.into()))?;
        let tx = Transaction::new_unchecked(self.conn, behavior).map_err(|err| {
            restore_lock_wait(self.conn, self.busy_timeout);
            lock_timeout("begin", capped, err).unwrap_or_else(|err| StoreError::Connection(err.into()))
        })?;
        Ok(SqliteGraphTxn {
            conn: self.conn,
            tx,
            deadline,
            busy_timeout: self.busy_timeout,
        })
    }
}

impl GraphStore for SqliteGraphStore<'_> {
    type Txn<'a>
        = SqliteGraphTxn<'a>
    where
        Self: 'a;

    fn begin(&self, deadline: Deadline) -> StoreResult<SqliteGraphTxn<'_>> {
        self.open_txn(TransactionBehavior::Immediate, deadline)
    }

    fn begin_read_only(&self, deadline: Deadline) -> StoreResult<SqliteGraphTxn<'_>> {
        self.open_txn(TransactionBehavior::Deferred, deadline)
    }
}

/// Open SQLite transaction bound to a deadline.
pub struct SqliteGraphTxn<'conn> {
    conn: &'conn Connection,
    tx: Transaction<'conn>,
    deadline: Deadline,
    busy_timeout: Duration,
}

impl SqliteGraphTxn<'_> {
    /// Checks the deadline and shrinks the lock wait to what is left of it.
    ///
    /// Returns whether the wait was shortened by the deadline.
    fn prepare_call(&self, operation: &'static str) -> StoreResult<bool> {
        self.deadline.check(operation)?;
        bound_lock_wait(self.conn, self.busy_timeout, &self.deadline)
            .map_err(|err| StoreError::Connection(err.into()))
    }
}

impl GraphTxn for SqliteGraphTxn<'_> {
    fn query(&self, template: &str, vars: &QueryVars) -> StoreResult<Value> {
        let capped = self.prepare_call("query")?;
        let rows = run_query(&self.tx, template, vars).map_err(|err| {
            lock_timeout("query", capped, err).unwrap_or_else(|err| StoreError::query("query", err))
        })?;
        self.deadline.check("query")?;
        debug!(
            "event=store_query module=store status=ok vars={} rows={}",
            vars.len(),
            rows.len()
        );
        Ok(Value::Array(rows))
    }

    fn create_nodes(&mut self, nodes: &[GraphNode]) -> StoreResult<Assigned> {
        let capped = self.prepare_call("create_nodes")?;
        let mut assigned = Assigned::default();
        for (index, node) in nodes.iter().enumerate() {
            if let Some(node_id) = node.node_id() {
                return Err(StoreError::mutation(
                    "create_nodes",
                    format!("{} node `{}` already has id {node_id}", node.kind(), node.xid()),
                ));
            }
            let node_id = insert_node(&self.tx, node).map_err(|err| {
                lock_timeout("create_nodes", capped, err)
                    .unwrap_or_else(|err| StoreError::mutation("create_nodes", err))
            })?;
            assigned.uids.insert(Assigned::placeholder(index), node_id);
        }
        self.deadline.check("create_nodes")?;
        debug!(
            "event=store_create module=store status=ok nodes={}",
            assigned.len()
        );
        Ok(assigned)
    }

    fn add_edges(&mut self, edges: &[Edge]) -> StoreResult<()> {
        let capped = self.prepare_call("add_edges")?;
        let to_error = |err| {
            lock_timeout("add_edges", capped, err)
                .unwrap_or_else(|err| StoreError::mutation("add_edges", err))
        };
        let mut stmt = self.tx.prepare_cached(INSERT_EDGE_SQL).map_err(to_error)?;
        for edge in edges {
            stmt.execute(params![
                edge.subject.as_raw(),
                edge.predicate.as_str(),
                edge.object.as_raw(),
            ])
            .map_err(to_error)?;
        }
        self.deadline.check("add_edges")?;
        debug!(
            "event=store_link module=store status=ok edges={}",
            edges.len()
        );
        Ok(())
    }

    fn commit(self) -> StoreResult<()> {
        let capped = self.prepare_call("commit")?;
        let Self {
            conn,
            tx,
            busy_timeout,
            ..
        } = self;
        let result = tx.commit().map_err(|err| {
            lock_timeout("commit", capped, err)
                .unwrap_or_else(|err| StoreError::mutation("commit", err))
        });
        restore_lock_wait(conn, busy_timeout);
        result
    }

    fn discard(self) -> StoreResult<()> {
        let Self {
            conn,
            tx,
            busy_timeout,
            ..
        } = self;
        let result = tx
            .rollback()
            .map_err(|err| StoreError::mutation("discard", err));
        restore_lock_wait(conn, busy_timeout);
        result
    }
}

/// Sets the connection's lock wait to `min(configured, deadline remaining)`.
fn bound_lock_wait(
    conn: &Connection,
    configured: Duration,
    deadline: &Deadline,
) -> rusqlite::Result<bool> {
    match deadline.remaining() {
        Some(remaining) if remaining < configured => {
            conn.busy_timeout(remaining)?;
            Ok(true)
        }
        _ => {
            conn.busy_timeout(configured)?;
            Ok(false)
        }
    }
}

fn restore_lock_wait(conn: &Connection, busy_timeout: Duration) {
    if let Err(err) = conn.busy_timeout(busy_timeout) {
        warn!("event=store_busy_timeout module=store status=error error={err}");
    }
}

/// Turns lock contention into `StoreError::Timeout` when the wait was cut
/// short by the deadline; hands every other error back.
fn lock_timeout(
    operation: &'static str,
    capped: bool,
    err: rusqlite::Error,
) -> Result<StoreError, rusqlite::Error> {
    let contended = matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    );
    if capped && contended {
        return Ok(StoreError::Timeout { operation });
    }
    Err(err)
}

fn insert_node(conn: &Connection, node: &GraphNode) -> rusqlite::Result<NodeId> {
    let (name, state, created_at) = match node {
        GraphNode::Department(_) | GraphNode::Duty(_) | GraphNode::User(_) => (None, None, None),
        GraphNode::Goal(goal) => (
            Some(goal.name.as_str()),
            Some(goal.state.as_i64()),
            Some(goal.created_at),
        ),
        GraphNode::Frame(frame) => (Some(frame.name.as_str()), None, None),
        GraphNode::Item(item) => (Some(item.name.as_str()), None, None),
        GraphNode::Tag(tag) => (Some(tag.name.as_str()), None, Some(tag.created_at)),
    };
    let sql = if node.kind().is_identity_kind() {
        UPSERT_IDENTITY_NODE_SQL
    } else {
        INSERT_NODE_SQL
    };

    let mut stmt = conn.prepare_cached(sql)?;
    let raw: i64 = stmt.query_row(
        params![node.kind().as_str(), node.xid(), name, state, created_at],
        |row| row.get(0),
    )?;
    Ok(NodeId::from_raw(raw))
}

fn run_query(conn: &Connection, template: &str, vars: &QueryVars) -> rusqlite::Result<Vec<Value>> {
    let mut stmt = conn.prepare(template)?;
    for (name, value) in vars {
        if let Some(index) = stmt.parameter_index(name)? {
            stmt.raw_bind_parameter(index, value.as_str())?;
        }
    }

    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let mut rows = stmt.raw_query();
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        let mut object = Map::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            object.insert(column.clone(), json_value(row.get_ref(index)?));
        }
        items.push(Value::Object(object));
    }
    Ok(items)
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        // Graph rows never carry blobs.
        ValueRef::Blob(_) => Value::Null,
    }
}
