//! Database schema initialization
//!
//! Tables are created with `IF NOT EXISTS`, so initialization is idempotent
//! and runs on every connect.

use crate::Result;
use sqlx::SqlitePool;

/// Create tables and indexes if needed
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_analyses_table(pool).await?;
    Ok(())
}

async fn create_analyses_table(pool: &SqlitePool) -> Result<()> {
    // seq tracks insertion order and breaks created_at ties
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            guid TEXT NOT NULL UNIQUE,
            text TEXT NOT NULL,
            results TEXT NOT NULL DEFAULT '[]',
            threshold REAL NOT NULL DEFAULT 0.85,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analyses_created_at ON analyses(created_at DESC, seq DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
