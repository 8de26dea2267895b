/// Schema for the deferred submission queue.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS submission_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
