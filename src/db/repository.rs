use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::warn;

use crate::error::AppError;
use crate::models::Message;

/// Result of reading every indexed id back out of the mirror.
#[derive(Debug, Default)]
pub struct MirrorSnapshot {
    pub messages: Vec<Message>,
    /// Indexed ids with no stored entry.
    pub missing: Vec<String>,
    /// Indexed ids whose stored payload does not parse.
    pub corrupt: Vec<String>,
}

impl MirrorSnapshot {
    pub fn unreadable(&self) -> impl Iterator<Item = &String> {
        self.missing.iter().chain(self.corrupt.iter())
    }
}

async fn put_entry_tx(tx: &mut Transaction<'_, Sqlite>, message: &Message) -> Result<(), AppError> {
    let payload = serde_json::to_string(message)?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO mirror_entries (unique_id, payload, stored_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(unique_id) DO UPDATE SET
            payload = excluded.payload,
            stored_at = excluded.stored_at
        "#,
    )
    .bind(&message.unique_id)
    .bind(payload)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn append_index_tx(tx: &mut Transaction<'_, Sqlite>, unique_id: &str) -> Result<bool, AppError> {
    let inserted = sqlx::query("INSERT OR IGNORE INTO mirror_index (unique_id) VALUES (?1)")
        .bind(unique_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();

    Ok(inserted > 0)
}

/// Stores a snapshot of `message` and records its id in the index.
pub async fn mirror_message(db: &SqlitePool, message: &Message) -> Result<(), AppError> {
    let mut tx = db.begin().await?;
    put_entry_tx(&mut tx, message).await?;
    append_index_tx(&mut tx, &message.unique_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Mirrors a batch in one transaction. Returns how many ids were new to the index.
pub async fn mirror_all(db: &SqlitePool, messages: &[Message]) -> Result<usize, AppError> {
    let mut tx = db.begin().await?;
    let mut added = 0;

    for message in messages {
        put_entry_tx(&mut tx, message).await?;
        if append_index_tx(&mut tx, &message.unique_id).await? {
            added += 1;
        }
    }

    tx.commit().await?;
    Ok(added)
}

/// Rewrites the stored snapshot without touching the index.
pub async fn put_entry(db: &SqlitePool, message: &Message) -> Result<(), AppError> {
    let mut tx = db.begin().await?;
    put_entry_tx(&mut tx, message).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn find_entry(db: &SqlitePool, unique_id: &str) -> Result<Option<Message>, AppError> {
    let payload: Option<String> = sqlx::query_scalar(
        "SELECT payload FROM mirror_entries WHERE unique_id = ?1"
    )
    .bind(unique_id)
    .fetch_optional(db)
    .await?;

    match payload {
        Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
        None => Ok(None),
    }
}

pub async fn fetch_index(db: &SqlitePool) -> Result<Vec<String>, AppError> {
    let ids = sqlx::query_scalar("SELECT unique_id FROM mirror_index ORDER BY position")
        .fetch_all(db)
        .await?;
    Ok(ids)
}

/// Reads back every record reachable through the index, in index order.
/// Unreadable entries are skipped and reported rather than failing the load.
pub async fn load_indexed(db: &SqlitePool) -> Result<MirrorSnapshot, AppError> {
    let rows: Vec<(String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT i.unique_id, e.payload
        FROM mirror_index i
        LEFT JOIN mirror_entries e ON e.unique_id = i.unique_id
        ORDER BY i.position
        "#,
    )
    .fetch_all(db)
    .await?;

    let mut snapshot = MirrorSnapshot::default();
    for (unique_id, payload) in rows {
        let Some(payload) = payload else {
            warn!("Mirror index points at missing entry: {}", unique_id);
            snapshot.missing.push(unique_id);
            continue;
        };
        match serde_json::from_str::<Message>(&payload) {
            Ok(message) => snapshot.messages.push(message),
            Err(e) => {
                warn!("Skipping corrupt mirror entry {}: {}", unique_id, e);
                snapshot.corrupt.push(unique_id);
            }
        }
    }

    Ok(snapshot)
}

pub async fn is_indexed(db: &SqlitePool, unique_id: &str) -> Result<bool, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mirror_index WHERE unique_id = ?1")
        .bind(unique_id)
        .fetch_one(db)
        .await?;
    Ok(count > 0)
}

/// Drops a record from both the store and the index.
pub async fn remove_message(db: &SqlitePool, unique_id: &str) -> Result<bool, AppError> {
    let mut tx = db.begin().await?;

    let entries = sqlx::query("DELETE FROM mirror_entries WHERE unique_id = ?1")
        .bind(unique_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let indexed = sqlx::query("DELETE FROM mirror_index WHERE unique_id = ?1")
        .bind(unique_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(entries + indexed > 0)
}

/// Removes the given ids from the index and deletes any entries they still have.
pub async fn prune_index(db: &SqlitePool, unique_ids: &[String]) -> Result<u64, AppError> {
    let mut tx = db.begin().await?;
    let mut pruned = 0;

    for unique_id in unique_ids {
        pruned += sqlx::query("DELETE FROM mirror_index WHERE unique_id = ?1")
            .bind(unique_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM mirror_entries WHERE unique_id = ?1")
            .bind(unique_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(pruned)
}
