use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0002_task_queue")
        .depends_on(&["0001_initial_schema"])
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE tasks (
    id TEXT PRIMARY KEY NOT NULL,
    task_type TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'pending',
    retries INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER NOT NULL DEFAULT 3,
    priority INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    next_retry_at TEXT,
    result TEXT,
    error TEXT,
    entity_type TEXT,
    entity_id INTEGER
)"#,
        ))
        // Claim ordering: status gate first, then priority desc, oldest first
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_tasks_claim ON tasks(status, priority DESC, created_at)",
        ))
        // Orphan detection by entity back-reference
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_tasks_entity ON tasks(entity_type, entity_id)",
        ))
}
