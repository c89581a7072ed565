//! Migration tests: the schema comes up correctly and reruns are no-ops.

use std::collections::BTreeSet;

use rusqlite::Connection;
use tempfile::tempdir;

use finsight::repository::migrations::run_migrations;

fn table_names(conn: &Connection) -> BTreeSet<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

fn index_names(conn: &Connection, table: &str) -> BTreeSet<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='index' AND tbl_name = ?1 AND name NOT LIKE 'sqlite_%'")
        .unwrap();
    stmt.query_map([table], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

fn column_names(conn: &Connection, table: &str) -> BTreeSet<String> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info(\"{}\")", table))
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

#[tokio::test]
async fn migrations_create_expected_schema() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("schema.db");
    let db_url = format!("sqlite:{}", db_path.display());

    run_migrations(&db_url).await.unwrap();

    let conn = Connection::open(&db_path).unwrap();
    let tables = table_names(&conn);
    assert!(tables.contains("insights"), "tables: {:?}", tables);
    assert!(tables.contains("tasks"), "tables: {:?}", tables);
    assert!(tables.contains("__cetane_migrations"), "tables: {:?}", tables);

    for column in [
        "id",
        "task_type",
        "payload",
        "status",
        "retries",
        "max_retries",
        "priority",
        "created_at",
        "started_at",
        "completed_at",
        "next_retry_at",
        "result",
        "error",
        "entity_type",
        "entity_id",
    ] {
        assert!(
            column_names(&conn, "tasks").contains(column),
            "tasks missing column {}",
            column
        );
    }

    // The claim path depends on this composite index
    assert!(index_names(&conn, "tasks").contains("idx_tasks_claim"));
    assert!(index_names(&conn, "insights").contains("idx_insights_source_url"));
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("rerun.db");
    let db_url = format!("sqlite:{}", db_path.display());

    run_migrations(&db_url).await.unwrap();
    run_migrations(&db_url).await.unwrap();

    let conn = Connection::open(&db_path).unwrap();
    let applied: i64 = conn
        .query_row("SELECT COUNT(*) FROM __cetane_migrations", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(applied, 2);
}
