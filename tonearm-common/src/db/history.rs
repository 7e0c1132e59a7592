//! Play history queries
//!
//! Append-only log of completed plays; walked backwards for "previous track".

use super::models::{PlaybackHistory, TrackRef};
use super::tracks;
use crate::Result;
use chrono::Utc;
use sqlx::SqlitePool;

const HISTORY_COLUMNS: &str = "id, location, track_id, duration_played_ms, played_at";

/// Append a completed play and bump the track's play statistics
pub async fn record(
    pool: &SqlitePool,
    item: &TrackRef,
    duration_played_ms: i64,
) -> Result<PlaybackHistory> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let row = sqlx::query(&format!(
        "INSERT INTO playback_history (location, track_id, duration_played_ms, played_at)
         VALUES (?, ?, ?, ?)
         RETURNING {}",
        HISTORY_COLUMNS
    ))
    .bind(&item.location)
    .bind(item.track_id)
    .bind(duration_played_ms.max(0))
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(track_id) = item.track_id {
        tracks::record_play(&mut *tx, track_id, now).await?;
    }

    tx.commit().await?;
    Ok(PlaybackHistory::from_row(&row))
}

/// Newest entry older than `before_id` whose location differs from `exclude`
///
/// `None` for either filter disables it.
pub async fn previous_before(
    pool: &SqlitePool,
    before_id: Option<i64>,
    exclude: Option<&str>,
) -> Result<Option<PlaybackHistory>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM playback_history
         WHERE (?1 IS NULL OR id < ?1)
           AND (?2 IS NULL OR location != ?2)
         ORDER BY id DESC
         LIMIT 1",
        HISTORY_COLUMNS
    ))
    .bind(before_id)
    .bind(exclude)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(PlaybackHistory::from_row))
}

/// Most recent entries, newest first
pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<PlaybackHistory>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM playback_history ORDER BY id DESC LIMIT ?",
        HISTORY_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(PlaybackHistory::from_row).collect())
}
