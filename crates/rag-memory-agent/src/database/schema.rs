use crate::utils::error::Result;
use sqlx::SqlitePool;
use tracing::debug;

const STATEMENTS: [&str; 5] = [
    r#"CREATE TABLE IF NOT EXISTS facts (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           content TEXT NOT NULL,
           source TEXT,
           salience REAL NOT NULL DEFAULT 0.5,
           timestamp TEXT NOT NULL,
           success_outcome INTEGER NOT NULL DEFAULT 0
       )"#,
    r#"CREATE TABLE IF NOT EXISTS entities (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           name TEXT NOT NULL UNIQUE,
           type TEXT NOT NULL,
           attributes TEXT,
           timestamp TEXT NOT NULL
       )"#,
    r#"CREATE TABLE IF NOT EXISTS entity_relations (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           entity1_id INTEGER NOT NULL REFERENCES entities(id),
           entity2_id INTEGER NOT NULL REFERENCES entities(id),
           relation_type TEXT NOT NULL,
           timestamp TEXT NOT NULL
       )"#,
    "CREATE INDEX IF NOT EXISTS idx_facts_timestamp ON facts (timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_entity_relations_timestamp ON entity_relations (timestamp)",
];

/// Create the facts/entities/relations tables if absent. Safe to re-run.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!("Long-term memory schema ready");
    Ok(())
}
