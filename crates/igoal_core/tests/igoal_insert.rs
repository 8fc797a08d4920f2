use igoal_core::db::{open_db, open_db_in_memory, DEFAULT_BUSY_TIMEOUT};
use igoal_core::service::resolver::resolve_org_nodes;
use igoal_core::{
    Assigned, Deadline, Edge, Goal, GoalState, GraphNode, GraphStore, GraphTxn, IGoalService,
    IGoalServiceError, InsertGoalRequest, NodeKind, OrgKind, OrgSet, OrgXids, QueryVars,
    RelationKind, SqliteGraphStore, SqliteGraphTxn, StoreError, StoreResult, Tag,
};
use rusqlite::Connection;
use serde_json::Value;
use std::time::{Duration, Instant};

fn example_orgs() -> OrgSet {
    OrgSet::new(["4", "5"], ["105", "106", "107"], ["206", "207"])
}

fn example_request(goal_xid: &str) -> InsertGoalRequest {
    InsertGoalRequest {
        goal: Goal::new(goal_xid, format!("IGoal {goal_xid}"), GoalState::Active, 1_000),
        manager: example_orgs(),
        participator: example_orgs(),
        creator_xid: "206".to_string(),
    }
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn insert_creates_org_nodes_and_all_role_edges() {
    let conn = open_db_in_memory().unwrap();
    let service = IGoalService::new(SqliteGraphStore::try_new(&conn).unwrap());

    let inserted = service.insert_goal(&example_request("1004")).unwrap();

    assert_eq!(inserted.org_nodes.len(), 7);
    assert_eq!(inserted.created_org_nodes, 7);
    // Seven org nodes, each both manager and participator, plus one owner.
    assert_eq!(inserted.edges.len(), 15);
    assert_eq!(
        inserted.edges.last(),
        Some(&Edge::new(
            inserted.org_nodes.node_id(OrgKind::User, "206").unwrap(),
            RelationKind::Owner,
            inserted.goal_id,
        ))
    );

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM graph_nodes WHERE kind = 'goal';"), 1);
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM graph_nodes WHERE kind IN ('department', 'duty', 'user');"),
        7
    );
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM graph_edges WHERE predicate = 'manager';"), 7);
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM graph_edges WHERE predicate = 'participator';"),
        7
    );
    assert_eq!(
        count(
            &conn,
            "SELECT COUNT(*) FROM graph_edges e
               JOIN graph_nodes u ON u.node_id = e.subject_id
              WHERE e.predicate = 'owner' AND u.kind = 'user' AND u.xid = '206';"
        ),
        1
    );
}

#[test]
fn repeated_insert_reuses_existing_org_nodes() {
    let conn = open_db_in_memory().unwrap();
    let service = IGoalService::new(SqliteGraphStore::try_new(&conn).unwrap());

    let first = service.insert_goal(&example_request("1004")).unwrap();
    let second = service.insert_goal(&example_request("1005")).unwrap();

    assert_eq!(second.created_org_nodes, 0);
    assert_eq!(first.org_nodes, second.org_nodes);
    assert_ne!(first.goal_id, second.goal_id);

    let resolved = service
        .resolve_org_nodes(&OrgSet::new(["4"], Vec::<&str>::new(), Vec::<&str>::new()))
        .unwrap();
    assert_eq!(
        resolved.node_id(OrgKind::Department, "4"),
        first.org_nodes.node_id(OrgKind::Department, "4")
    );
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM graph_nodes WHERE kind = 'department';"),
        2
    );
}

#[test]
fn same_xid_under_two_kinds_stays_two_nodes() {
    let conn = open_db_in_memory().unwrap();
    let service = IGoalService::new(SqliteGraphStore::try_new(&conn).unwrap());

    let request = InsertGoalRequest {
        goal: Goal::new("1", "shared ids", GoalState::Pending, 0),
        manager: OrgSet::new(["7"], ["7"], Vec::<&str>::new()),
        participator: OrgSet::default(),
        creator_xid: "7".to_string(),
    };
    let inserted = service.insert_goal(&request).unwrap();

    let dept = inserted.org_nodes.node_id(OrgKind::Department, "7").unwrap();
    let duty = inserted.org_nodes.node_id(OrgKind::Duty, "7").unwrap();
    let user = inserted.org_nodes.node_id(OrgKind::User, "7").unwrap();
    assert_ne!(dept, duty);
    assert_ne!(duty, user);
}

#[test]
fn manager_and_participator_overlap_links_both_roles_to_one_node() {
    let conn = open_db_in_memory().unwrap();
    let service = IGoalService::new(SqliteGraphStore::try_new(&conn).unwrap());

    let request = InsertGoalRequest {
        goal: Goal::new("1", "overlap", GoalState::Active, 0),
        manager: OrgSet::users(["207", "207"]),
        participator: OrgSet::users(["207"]),
        creator_xid: "206".to_string(),
    };
    let inserted = service.insert_goal(&request).unwrap();

    let user = inserted.org_nodes.node_id(OrgKind::User, "207").unwrap();
    assert_eq!(
        inserted.edges,
        vec![
            Edge::new(user, RelationKind::Manager, inserted.goal_id),
            Edge::new(user, RelationKind::Participator, inserted.goal_id),
            Edge::new(
                inserted.org_nodes.node_id(OrgKind::User, "206").unwrap(),
                RelationKind::Owner,
                inserted.goal_id
            ),
        ]
    );
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM graph_nodes WHERE kind = 'user';"), 2);
}

#[test]
fn blank_org_xids_are_skipped() {
    let conn = open_db_in_memory().unwrap();
    let service = IGoalService::new(SqliteGraphStore::try_new(&conn).unwrap());

    let request = InsertGoalRequest {
        goal: Goal::new("1", "sparse", GoalState::Active, 0),
        manager: OrgSet::new(["", " 4 "], ["   "], Vec::<&str>::new()),
        participator: OrgSet::default(),
        creator_xid: " 206 ".to_string(),
    };
    let inserted = service.insert_goal(&request).unwrap();

    assert_eq!(inserted.org_nodes.len(), 2);
    assert!(inserted.org_nodes.node_id(OrgKind::Department, "4").is_some());
    assert!(inserted.org_nodes.node_id(OrgKind::User, "206").is_some());
    assert_eq!(inserted.edges.len(), 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM graph_nodes WHERE xid = '';"), 0);
}

#[test]
fn invalid_requests_fail_before_touching_the_store() {
    let conn = open_db_in_memory().unwrap();
    let service = IGoalService::new(SqliteGraphStore::try_new(&conn).unwrap());

    let mut blank_creator = example_request("1004");
    blank_creator.creator_xid = "  ".to_string();
    assert!(matches!(
        service.insert_goal(&blank_creator),
        Err(IGoalServiceError::BlankCreator)
    ));

    let blank_goal = example_request(" ");
    assert!(matches!(
        service.insert_goal(&blank_goal),
        Err(IGoalServiceError::InvalidGoal(_))
    ));

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM graph_nodes;"), 0);
}

#[test]
fn expired_deadline_times_out_without_persisting() {
    let conn = open_db_in_memory().unwrap();
    let service = IGoalService::new(SqliteGraphStore::try_new(&conn).unwrap());

    let err = service
        .insert_goal_within(&example_request("1004"), Deadline::at(Instant::now()))
        .unwrap_err();

    assert!(matches!(
        err,
        IGoalServiceError::Store(StoreError::Timeout { .. })
    ));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM graph_nodes;"), 0);
}

#[test]
fn failed_edge_mutation_rolls_back_every_node() {
    let conn = open_db_in_memory().unwrap();
    let service = IGoalService::new(FaultyStore {
        inner: SqliteGraphStore::try_new(&conn).unwrap(),
        faults: Faults {
            fail_edges: true,
            ..Faults::default()
        },
    });

    let err = service.insert_goal(&example_request("1004")).unwrap_err();

    match err {
        IGoalServiceError::Store(StoreError::Mutation { operation, .. }) => {
            assert_eq!(operation, "add_edges");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM graph_nodes;"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM graph_edges;"), 0);
}

#[test]
fn tag_without_assigned_id_aborts_the_insert() {
    let conn = open_db_in_memory().unwrap();
    let service = IGoalService::new(FaultyStore {
        inner: SqliteGraphStore::try_new(&conn).unwrap(),
        faults: Faults {
            drop_tag_ids: true,
            ..Faults::default()
        },
    });

    let mut request = example_request("1004");
    request.goal = request.goal.with_tag(Tag::new("okr", "OKR", 0));
    let err = service.insert_goal(&request).unwrap_err();

    assert!(matches!(
        err,
        IGoalServiceError::Store(StoreError::Mutation {
            operation: "create_nodes",
            ..
        })
    ));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM graph_nodes;"), 0);
}

#[test]
fn failed_read_rollback_does_not_hide_results() {
    let conn = open_db_in_memory().unwrap();
    IGoalService::new(SqliteGraphStore::try_new(&conn).unwrap())
        .insert_goal(&example_request("1004"))
        .unwrap();
    let service = IGoalService::new(FaultyStore {
        inner: SqliteGraphStore::try_new(&conn).unwrap(),
        faults: Faults {
            fail_discard: true,
            ..Faults::default()
        },
    });

    let visible = service.visible_goals(&OrgSet::users(["206"])).unwrap();
    assert_eq!(visible.len(), 1);
    let resolved = service.resolve_org_nodes(&example_orgs()).unwrap();
    assert_eq!(resolved.len(), 7);
}

#[test]
fn deadline_bounds_lock_wait_and_reports_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked.db");
    let lock_wait = Duration::from_secs(3);

    let holder = open_db(&path, lock_wait).unwrap();
    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let conn = open_db(&path, lock_wait).unwrap();
    let service = IGoalService::new(SqliteGraphStore::try_new(&conn).unwrap());
    let started_at = Instant::now();
    let err = service
        .insert_goal_within(
            &example_request("1004"),
            Deadline::after(Duration::from_millis(100)),
        )
        .unwrap_err();

    assert!(started_at.elapsed() < Duration::from_secs(2));
    assert!(matches!(
        err,
        IGoalServiceError::Store(StoreError::Timeout { .. })
    ));

    holder.execute_batch("ROLLBACK;").unwrap();
    let busy_timeout_ms: i64 = conn
        .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(busy_timeout_ms, 3_000);
    service.insert_goal(&example_request("1004")).unwrap();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM graph_nodes WHERE kind = 'goal';"), 1);
}

#[test]
fn stale_resolution_converges_on_the_committed_node() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    let first_conn = open_db(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    let second_conn = open_db(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    let first = SqliteGraphStore::try_new(&first_conn).unwrap();
    let second = SqliteGraphStore::try_new(&second_conn).unwrap();
    let seeds = OrgXids::from_sets([&OrgSet::users(["300"])]);

    // Both writers look the user up before either has created it.
    let reader = first.begin_read_only(Deadline::none()).unwrap();
    assert!(resolve_org_nodes(&reader, &seeds).unwrap().is_empty());
    reader.discard().unwrap();
    let reader = second.begin_read_only(Deadline::none()).unwrap();
    assert!(resolve_org_nodes(&reader, &seeds).unwrap().is_empty());
    reader.discard().unwrap();

    let mut txn = first.begin(Deadline::none()).unwrap();
    let first_id = txn
        .create_nodes(&[GraphNode::org(OrgKind::User, "300")])
        .unwrap()
        .uid_at(0)
        .unwrap();
    txn.commit().unwrap();

    let mut txn = second.begin(Deadline::none()).unwrap();
    let second_id = txn
        .create_nodes(&[GraphNode::org(OrgKind::User, "300")])
        .unwrap()
        .uid_at(0)
        .unwrap();
    txn.commit().unwrap();

    assert_eq!(first_id, second_id);
    assert_eq!(
        count(&first_conn, "SELECT COUNT(*) FROM graph_nodes WHERE kind = 'user' AND xid = '300';"),
        1
    );
}

#[test]
fn parent_and_tag_become_goal_edges() {
    let conn = open_db_in_memory().unwrap();
    let service = IGoalService::new(SqliteGraphStore::try_new(&conn).unwrap());

    let parent = service.insert_goal(&example_request("1000")).unwrap();
    let mut child = example_request("1001");
    child.goal = child
        .goal
        .with_parent("1000")
        .with_tag(Tag::new("okr", "OKR", 5));
    let inserted = service.insert_goal(&child).unwrap();

    let goal_links: Vec<&Edge> = inserted
        .edges
        .iter()
        .filter(|edge| edge.subject == inserted.goal_id)
        .collect();
    assert_eq!(goal_links.len(), 2);
    assert_eq!(
        *goal_links[0],
        Edge::new(inserted.goal_id, RelationKind::Parent, parent.goal_id)
    );
    assert_eq!(goal_links[1].predicate, RelationKind::TagOf);

    // A second goal with the same tag reuses the tag node.
    let mut sibling = example_request("1002");
    sibling.goal = sibling.goal.with_tag(Tag::new("okr", "OKR", 9));
    service.insert_goal(&sibling).unwrap();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM graph_nodes WHERE kind = 'tag';"), 1);
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM graph_edges WHERE predicate = 'tag_of';"),
        2
    );
}

#[test]
fn unknown_parent_is_skipped() {
    let conn = open_db_in_memory().unwrap();
    let service = IGoalService::new(SqliteGraphStore::try_new(&conn).unwrap());

    let mut request = example_request("1001");
    request.goal = request.goal.with_parent("missing");
    let inserted = service.insert_goal(&request).unwrap();

    assert!(inserted
        .edges
        .iter()
        .all(|edge| edge.predicate != RelationKind::Parent));
}

#[test]
fn concurrent_inserts_never_duplicate_org_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concurrent.db");
    drop(open_db(&path, DEFAULT_BUSY_TIMEOUT).unwrap());

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let path = path.clone();
            std::thread::spawn(move || {
                let conn = open_db(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
                let service = IGoalService::new(SqliteGraphStore::try_new(&conn).unwrap());
                for round in 0..3 {
                    service
                        .insert_goal(&example_request(&format!("{worker}-{round}")))
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let conn = open_db(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM graph_nodes WHERE kind = 'goal';"), 12);
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM graph_nodes WHERE kind IN ('department', 'duty', 'user');"),
        7
    );
    assert_eq!(
        count(
            &conn,
            "SELECT COUNT(*) FROM (
                SELECT kind, xid FROM graph_nodes
                 WHERE kind <> 'goal'
                 GROUP BY kind, xid
                HAVING COUNT(*) > 1
            );"
        ),
        0
    );
}

/// Failures to inject on top of the SQLite store.
#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    fail_edges: bool,
    fail_discard: bool,
    drop_tag_ids: bool,
}

/// Delegates to SQLite, injecting the configured faults.
struct FaultyStore<'conn> {
    inner: SqliteGraphStore<'conn>,
    faults: Faults,
}

struct FaultyTxn<'a> {
    inner: SqliteGraphTxn<'a>,
    faults: Faults,
}

impl GraphStore for FaultyStore<'_> {
    type Txn<'a>
        = FaultyTxn<'a>
    where
        Self: 'a;

    fn begin(&self, deadline: Deadline) -> StoreResult<FaultyTxn<'_>> {
        Ok(FaultyTxn {
            inner: self.inner.begin(deadline)?,
            faults: self.faults,
        })
    }

    fn begin_read_only(&self, deadline: Deadline) -> StoreResult<FaultyTxn<'_>> {
        Ok(FaultyTxn {
            inner: self.inner.begin_read_only(deadline)?,
            faults: self.faults,
        })
    }
}

impl GraphTxn for FaultyTxn<'_> {
    fn query(&self, template: &str, vars: &QueryVars) -> StoreResult<Value> {
        self.inner.query(template, vars)
    }

    fn create_nodes(&mut self, nodes: &[GraphNode]) -> StoreResult<Assigned> {
        let assigned = self.inner.create_nodes(nodes)?;
        let only_tags = nodes.iter().all(|node| node.kind() == NodeKind::Tag);
        if self.faults.drop_tag_ids && only_tags {
            return Ok(Assigned::default());
        }
        Ok(assigned)
    }

    fn add_edges(&mut self, edges: &[Edge]) -> StoreResult<()> {
        if self.faults.fail_edges {
            return Err(StoreError::mutation("add_edges", "injected edge failure"));
        }
        self.inner.add_edges(edges)
    }

    fn commit(self) -> StoreResult<()> {
        self.inner.commit()
    }

    fn discard(self) -> StoreResult<()> {
        let result = self.inner.discard();
        if self.faults.fail_discard {
            return Err(StoreError::mutation("discard", "injected rollback failure"));
        }
        result
    }
}
