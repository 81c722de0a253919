//! Analysis store: append-only writes and newest-first reads

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::db::connection::Database;
use crate::db::models::{validate_text, AnalysisRecord, LabelScore, NewAnalysis};
use crate::time;
use crate::{Error, Result};

/// Largest page `/history` may return
pub const MAX_HISTORY_LIMIT: u32 = 10;

/// Persist a new analysis and return the stored record
///
/// A write that hits a busy or locked database is retried once.
pub async fn insert_analysis(db: &Database, new: NewAnalysis) -> Result<AnalysisRecord> {
    validate_text(&new.text)?;
    let pool = db.pool()?;

    let now = time::now();
    let record = AnalysisRecord {
        id: Uuid::new_v4(),
        text: new.text,
        results: new.results,
        threshold: new.threshold,
        created_at: now,
        updated_at: now,
    };
    let results_json = serde_json::to_string(&record.results)?;

    match write_record(&pool, &record, &results_json).await {
        Err(Error::Database(e)) if is_transient(&e) => {
            warn!("Transient write failure ({}), retrying once", e);
            write_record(&pool, &record, &results_json).await?;
        }
        other => other?,
    }

    Ok(record)
}

async fn write_record(pool: &SqlitePool, record: &AnalysisRecord, results_json: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO analyses (guid, text, results, threshold, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(&record.text)
    .bind(results_json)
    .bind(record.threshold)
    .bind(time::to_millis(&record.created_at))
    .bind(time::to_millis(&record.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
fn is_transient(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i64>().ok())
            .map(|code| matches!(code & 0xff, 5 | 6))
            .unwrap_or(false),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

/// Most recent analyses, newest first
///
/// Ties on creation time resolve to the later insertion first. `limit` is
/// clamped to `1..=MAX_HISTORY_LIMIT`.
pub async fn recent_analyses(db: &Database, limit: u32) -> Result<Vec<AnalysisRecord>> {
    let pool = db.pool()?;
    let limit = limit.clamp(1, MAX_HISTORY_LIMIT);

    let rows = sqlx::query(
        r#"
        SELECT guid, text, results, threshold, created_at, updated_at
        FROM analyses
        ORDER BY created_at DESC, seq DESC
        LIMIT ?
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(&pool)
    .await?;

    rows.iter().map(row_to_record).collect()
}

/// Number of stored analyses
pub async fn count_analyses(db: &Database) -> Result<i64> {
    let pool = db.pool()?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analyses")
        .fetch_one(&pool)
        .await?;
    Ok(count)
}

fn row_to_record(row: &SqliteRow) -> Result<AnalysisRecord> {
    let guid: String = row.try_get("guid")?;
    let id = Uuid::parse_str(&guid)
        .map_err(|e| Error::Internal(format!("Stored analysis has invalid id {}: {}", guid, e)))?;
    let results_json: String = row.try_get("results")?;
    let results: Vec<LabelScore> = serde_json::from_str(&results_json)?;

    Ok(AnalysisRecord {
        id,
        text: row.try_get("text")?,
        results,
        threshold: row.try_get("threshold")?,
        created_at: time::from_millis(row.try_get("created_at")?),
        updated_at: time::from_millis(row.try_get("updated_at")?),
    })
}
