//! Stream catalog queries

use super::models::{NewStream, StreamKind, StreamRecord, StreamStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct StreamRow {
    id: String,
    url: String,
    name: String,
    kind: String,
    status: String,
    last_active: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<StreamRow> for StreamRecord {
    type Error = Error;

    fn try_from(row: StreamRow) -> Result<Self> {
        let kind = row.kind.parse::<StreamKind>().map_err(|e| {
            Error::Internal(format!("stream {} has corrupt type: {}", row.id, e))
        })?;
        let status = row.status.parse::<StreamStatus>().map_err(|e| {
            Error::Internal(format!("stream {} has corrupt status: {}", row.id, e))
        })?;

        Ok(StreamRecord {
            id: row.id,
            url: row.url,
            name: row.name,
            kind,
            status,
            last_active: row.last_active,
            created_at: row.created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, url, name, kind, status, last_active, created_at FROM streams";

/// Register a new stream (status starts as `inactive`)
pub async fn insert_stream(pool: &SqlitePool, stream: &NewStream) -> Result<StreamRecord> {
    let record = StreamRecord {
        id: Uuid::new_v4().to_string(),
        url: stream.url.clone(),
        name: stream.name.clone(),
        kind: stream.kind,
        status: StreamStatus::Inactive,
        last_active: None,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO streams (id, url, name, kind, status, last_active, created_at)
        VALUES (?, ?, ?, ?, ?, NULL, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.url)
    .bind(&record.name)
    .bind(record.kind.as_str())
    .bind(record.status.as_str())
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(record)
}

/// All registered streams, newest first
pub async fn list_streams(pool: &SqlitePool) -> Result<Vec<StreamRecord>> {
    let rows: Vec<StreamRow> =
        sqlx::query_as(&format!("{} ORDER BY created_at DESC, rowid DESC", SELECT_COLUMNS))
            .fetch_all(pool)
            .await?;

    rows.into_iter().map(StreamRecord::try_from).collect()
}

/// Look up one stream by id
pub async fn get_stream(pool: &SqlitePool, id: &str) -> Result<Option<StreamRecord>> {
    let row: Option<StreamRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(StreamRecord::try_from).transpose()
}

/// Delete a stream; returns false when no row matched
pub async fn delete_stream(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM streams WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Update relay status; `Active` also stamps `last_active`
///
/// Returns false when the id is not in the catalog (ad-hoc relays).
pub async fn set_stream_status(pool: &SqlitePool, id: &str, status: StreamStatus) -> Result<bool> {
    let result = if status == StreamStatus::Active {
        sqlx::query("UPDATE streams SET status = ?, last_active = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?
    } else {
        sqlx::query("UPDATE streams SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(pool)
            .await?
    };

    Ok(result.rows_affected() > 0)
}

/// Mark every `active` stream `inactive`
///
/// Run at startup: no relay survives a restart.
pub async fn reset_active_streams(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("UPDATE streams SET status = ? WHERE status = ?")
        .bind(StreamStatus::Inactive.as_str())
        .bind(StreamStatus::Active.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
