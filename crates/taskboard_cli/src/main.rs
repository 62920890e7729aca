//! CLI smoke entry point.
//!
//! # Responsibility
//! - Run a short scripted board session against an in-memory store.
//! - Print the projected board so core wiring can be checked by eye.
//!
//! Usage: `taskboard_cli [config.json]`

use log::info;
use std::error::Error;
use std::rc::Rc;
use taskboard_core::{
    core_version, init_logging, BoardView, BucketKey, LocalIdentity, OwnerId, Priority,
    SqliteDocumentStore, SyncConfig, TaskBoard,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("taskboard_cli error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    init_logging(&config.logging)?;
    println!("taskboard_core version={}", core_version());

    let store = Rc::new(SqliteDocumentStore::open_in_memory()?);
    let identity = LocalIdentity::signed_in(OwnerId::new("demo")?);
    let mut board = TaskBoard::new(store, &config);
    board.connect(&identity)?;
    board.pump();

    board.set_list_name("Today");
    let Some(list_id) = board.add_list()? else {
        return Err("list was not created".into());
    };
    board.pump();

    let mut task_ids = Vec::new();
    for (title, priority) in [("Write report", Priority::Low), ("Review PR", Priority::High)] {
        let draft = board.draft_mut(list_id);
        draft.title = title.to_string();
        draft.priority = Some(priority);
        if let Some(task_id) = board.add_task(list_id)? {
            task_ids.push(task_id);
        }
    }
    board.pump();

    if let Some(&first) = task_ids.first() {
        board.begin_drag(first)?;
        board.drop_on(Some(BucketKey::new(list_id, Priority::High)))?;
        board.pump();
    }

    info!("event=cli_smoke module=cli status=ok tasks={}", task_ids.len());
    print_board(&board.view());
    Ok(())
}

fn print_board(view: &BoardView<'_>) {
    for column in &view.columns {
        println!("[{}]", column.list.name);
        for priority in Priority::ALL {
            let titles: Vec<&str> = column
                .bucket(priority)
                .iter()
                .map(|task| task.title.as_str())
                .collect();
            println!("  {priority}: {}", titles.join(", "));
        }
    }
}
