//! Pending playback queries
//!
//! A playback row is the "play this next" record. At most one row may be
//! pending (`played = 0`); the unique partial index rejects a second one, so
//! callers go through [`replace_pending`] when something else may be waiting.

use super::models::{Playback, TrackRef};
use crate::{Error, Result};
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool};

const PLAYBACK_COLUMNS: &str = "id, location, track_id, played, skip_ms, created_at";

pub(crate) async fn insert<'e, E>(executor: E, item: &TrackRef, skip_ms: i64) -> Result<Playback>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        "INSERT INTO playbacks (location, track_id, played, skip_ms, created_at)
         VALUES (?, ?, 0, ?, ?)
         RETURNING {}",
        PLAYBACK_COLUMNS
    ))
    .bind(&item.location)
    .bind(item.track_id)
    .bind(skip_ms.max(0))
    .bind(Utc::now())
    .fetch_one(executor)
    .await
    .map_err(Error::from_pending_insert)?;

    Ok(Playback::from_row(&row))
}

/// Create a pending playback; [`Error::PlaybackPending`] if one is already pending
pub async fn create(pool: &SqlitePool, item: &TrackRef, skip_ms: i64) -> Result<Playback> {
    insert(pool, item, skip_ms).await
}

/// Drop any pending playback and create a new one, atomically
pub async fn replace_pending(pool: &SqlitePool, item: &TrackRef, skip_ms: i64) -> Result<Playback> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM playbacks WHERE played = 0")
        .execute(&mut *tx)
        .await?;
    let playback = insert(&mut *tx, item, skip_ms).await?;
    tx.commit().await?;
    Ok(playback)
}

/// Remove the pending playback, if any. Returns true when a row was removed.
pub async fn clear_pending(pool: &SqlitePool) -> Result<bool> {
    let result = sqlx::query("DELETE FROM playbacks WHERE played = 0")
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// The pending playback (index lookup)
pub async fn next_pending(pool: &SqlitePool) -> Result<Option<Playback>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM playbacks WHERE played = 0",
        PLAYBACK_COLUMNS
    ))
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(Playback::from_row))
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Playback>> {
    let row = sqlx::query(&format!("SELECT {} FROM playbacks WHERE id = ?", PLAYBACK_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(Playback::from_row))
}

/// Mark a playback consumed
pub async fn mark_played(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE playbacks SET played = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Number of pending playbacks (0 or 1)
pub async fn pending_count(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM playbacks WHERE played = 0")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    #[tokio::test]
    async fn test_second_pending_is_rejected() {
        let pool = memory_pool().await.unwrap();
        create(&pool, &TrackRef::location("/a.mp3"), 0).await.unwrap();

        assert!(matches!(
            create(&pool, &TrackRef::location("/b.mp3"), 0).await,
            Err(Error::PlaybackPending)
        ));
        assert_eq!(pending_count(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_pending_keeps_one() {
        let pool = memory_pool().await.unwrap();
        replace_pending(&pool, &TrackRef::location("/a.mp3"), 0).await.unwrap();
        replace_pending(&pool, &TrackRef::location("/b.mp3"), 1500).await.unwrap();

        assert_eq!(pending_count(&pool).await.unwrap(), 1);
        let pending = next_pending(&pool).await.unwrap().unwrap();
        assert_eq!(pending.location, "/b.mp3");
        assert_eq!(pending.skip_ms, 1500);
    }

    #[tokio::test]
    async fn test_mark_played_frees_slot() {
        let pool = memory_pool().await.unwrap();
        let first = create(&pool, &TrackRef::location("/a.mp3"), 0).await.unwrap();
        mark_played(&pool, first.id).await.unwrap();

        assert!(next_pending(&pool).await.unwrap().is_none());
        create(&pool, &TrackRef::location("/b.mp3"), 0).await.unwrap();
        assert!(get(&pool, first.id).await.unwrap().unwrap().played);
    }

    #[tokio::test]
    async fn test_clear_pending() {
        let pool = memory_pool().await.unwrap();
        assert!(!clear_pending(&pool).await.unwrap());
        create(&pool, &TrackRef::location("/a.mp3"), 0).await.unwrap();
        assert!(clear_pending(&pool).await.unwrap());
        assert!(next_pending(&pool).await.unwrap().is_none());
    }
}
