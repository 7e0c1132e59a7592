//! Per-perspective queue
//!
//! Unplayed queue entries of a perspective hold positions `1..n`. Every
//! mutation loads the list, applies the reordering primitive and writes the
//! renumbered rows back inside one transaction.

use super::models::{Perspective, Playback, QueueTrack, TrackRef};
use super::playbacks;
use crate::reorder;
use crate::Result;
use sqlx::{SqliteConnection, SqlitePool};

const QUEUE_COLUMNS: &str = "id, perspective, position, location, track_id, played";

/// What happens to the row a mutation takes out of the list
#[derive(Debug, Clone, Copy)]
enum Removal {
    /// User removed it: the row goes away
    Delete,
    /// Taken for playback: the row stays as a played entry
    Consume,
}

async fn load(conn: &mut SqliteConnection, perspective: Perspective) -> Result<Vec<QueueTrack>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM queue_tracks
         WHERE perspective = ? AND played = 0
         ORDER BY position, id",
        QUEUE_COLUMNS
    ))
    .bind(perspective.as_str())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(QueueTrack::from_row).collect()
}

async fn persist(conn: &mut SqliteConnection, list: &mut [QueueTrack]) -> Result<()> {
    for item in list.iter_mut().filter(|item| !item.ignore) {
        if item.id == 0 {
            item.id = sqlx::query_scalar(
                "INSERT INTO queue_tracks (perspective, position, location, track_id, played)
                 VALUES (?, ?, ?, ?, 0)
                 RETURNING id",
            )
            .bind(item.perspective.as_str())
            .bind(item.position)
            .bind(&item.location)
            .bind(item.track_id)
            .fetch_one(&mut *conn)
            .await?;
        } else {
            sqlx::query("UPDATE queue_tracks SET position = ? WHERE id = ?")
                .bind(item.position)
                .bind(item.id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

async fn remove(conn: &mut SqliteConnection, item: &mut QueueTrack, removal: Removal) -> Result<()> {
    match removal {
        Removal::Delete => {
            sqlx::query("DELETE FROM queue_tracks WHERE id = ?")
                .bind(item.id)
                .execute(&mut *conn)
                .await?;
        }
        Removal::Consume => {
            sqlx::query("UPDATE queue_tracks SET played = 1, position = 0 WHERE id = ?")
                .bind(item.id)
                .execute(&mut *conn)
                .await?;
            item.played = true;
            item.position = 0;
        }
    }
    Ok(())
}

/// Load, reorder and persist in one transaction
async fn mutate<F>(
    pool: &SqlitePool,
    perspective: Perspective,
    removal: Removal,
    apply: F,
) -> Result<(Vec<QueueTrack>, Option<QueueTrack>)>
where
    F: FnOnce(Vec<QueueTrack>) -> (Vec<QueueTrack>, Option<QueueTrack>),
{
    let mut tx = pool.begin().await?;

    let current = load(&mut tx, perspective).await?;
    let (mut list, mut removed) = apply(current);

    if let Some(item) = removed.as_mut() {
        remove(&mut tx, item, removal).await?;
    }
    persist(&mut tx, &mut list).await?;

    tx.commit().await?;
    Ok((list, removed))
}

fn entries(perspective: Perspective, items: Vec<TrackRef>) -> Vec<QueueTrack> {
    items
        .into_iter()
        .map(|item| QueueTrack::unsaved(perspective, item))
        .collect()
}

/// Unplayed entries in play order
pub async fn list(pool: &SqlitePool, perspective: Perspective) -> Result<Vec<QueueTrack>> {
    let mut conn = pool.acquire().await?;
    load(&mut conn, perspective).await
}

pub async fn len(pool: &SqlitePool, perspective: Perspective) -> Result<usize> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM queue_tracks WHERE perspective = ? AND played = 0",
    )
    .bind(perspective.as_str())
    .fetch_one(pool)
    .await?;
    Ok(count as usize)
}

/// Append to the end of the queue
pub async fn enqueue(
    pool: &SqlitePool,
    perspective: Perspective,
    items: Vec<TrackRef>,
) -> Result<Vec<QueueTrack>> {
    let new = entries(perspective, items);
    let (list, _) = mutate(pool, perspective, Removal::Delete, |current| {
        (reorder::append_to(current, new), None)
    })
    .await?;
    Ok(list)
}

/// Insert so the first item lands at `position`
pub async fn insert(
    pool: &SqlitePool,
    perspective: Perspective,
    position: i64,
    items: Vec<TrackRef>,
) -> Result<Vec<QueueTrack>> {
    let new = entries(perspective, items);
    let (list, _) = mutate(pool, perspective, Removal::Delete, |current| {
        (reorder::insert_into(current, position, new), None)
    })
    .await?;
    Ok(list)
}

/// Delete the entry at `position`; `None` when nothing is there
pub async fn remove_at(
    pool: &SqlitePool,
    perspective: Perspective,
    position: i64,
) -> Result<Option<QueueTrack>> {
    let (_, removed) = mutate(pool, perspective, Removal::Delete, |current| {
        reorder::delete_at(current, position)
    })
    .await?;
    Ok(removed)
}

/// Move the entry at `from` to `to`
pub async fn move_entry(
    pool: &SqlitePool,
    perspective: Perspective,
    to: i64,
    from: i64,
) -> Result<Vec<QueueTrack>> {
    let (list, _) = mutate(pool, perspective, Removal::Delete, |current| {
        (reorder::move_to(current, to, from), None)
    })
    .await?;
    Ok(list)
}

/// Take the head of the queue for playback
pub async fn pop_next(pool: &SqlitePool, perspective: Perspective) -> Result<Option<QueueTrack>> {
    let (_, head) = mutate(pool, perspective, Removal::Consume, reorder::pop).await?;
    Ok(head)
}

/// Move the head of the queue into the pending-playback slot
///
/// Both writes share one transaction. When a playback is already pending the
/// insert fails with [`crate::Error::PlaybackPending`] and the queue is left
/// untouched.
pub async fn pop_into_pending(pool: &SqlitePool, perspective: Perspective) -> Result<Option<Playback>> {
    let mut tx = pool.begin().await?;

    let (mut list, head) = reorder::pop(load(&mut tx, perspective).await?);
    let Some(mut head) = head else {
        return Ok(None);
    };
    remove(&mut tx, &mut head, Removal::Consume).await?;
    persist(&mut tx, &mut list).await?;
    let playback = playbacks::insert(&mut *tx, &head.track_ref(), 0).await?;

    tx.commit().await?;
    Ok(Some(playback))
}

/// Drop every unplayed entry. Returns how many were removed.
pub async fn clear(pool: &SqlitePool, perspective: Perspective) -> Result<u64> {
    let result = sqlx::query("DELETE FROM queue_tracks WHERE perspective = ? AND played = 0")
        .bind(perspective.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
