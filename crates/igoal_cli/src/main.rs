//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise `igoal_core` end to end: open a graph, insert one goal, list
//!   what its creator can see.
//! - Accept an optional JSON config path as the only argument.

use igoal_core::{
    init_logging, open_db_from_config, Goal, GoalState, GraphConfig, IGoalService,
    InsertGoalRequest, OrgSet, SqliteGraphStore,
};
use log::info;
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("igoal_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => GraphConfig::from_file(path)?,
        None => GraphConfig::default(),
    };
    if config.logging.log_dir.is_some() {
        init_logging(&config.logging)?;
    }

    let conn = open_db_from_config(&config)?;
    let store = SqliteGraphStore::try_new(&conn)?;
    let service = IGoalService::with_config(store, &config);

    let request = InsertGoalRequest {
        goal: Goal::new("1004", "Ship quarterly roadmap", GoalState::Active, 1_700_000_000_000),
        manager: OrgSet::new(["4", "5"], ["105", "106", "107"], ["206", "207"]),
        participator: OrgSet::new(["4", "5"], ["105", "106", "107"], ["206", "207"]),
        creator_xid: "206".to_string(),
    };
    let inserted = service.insert_goal(&request)?;
    info!(
        "event=cli_insert module=cli status=ok goal_id={} edges={}",
        inserted.goal_id,
        inserted.edges.len()
    );
    println!(
        "igoal_core version={} goal_id={} org_nodes={} edges={}",
        igoal_core::core_version(),
        inserted.goal_id,
        inserted.org_nodes.len(),
        inserted.edges.len()
    );

    for goal in service.visible_goals(&OrgSet::users(["206"]))? {
        println!(
            "visible igoal_id={} name={:?} state={:?} creator={}",
            goal.igoal_id,
            goal.name,
            goal.state,
            goal.creator.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
