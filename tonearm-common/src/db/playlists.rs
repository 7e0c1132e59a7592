//! Playlists and their track lists
//!
//! Same positional contract as the queue: entries of a playlist hold `1..n`.
//! A playlist is "open" while shown in its perspective's playbar and "active"
//! while it drives playback; at most one playlist per perspective is active.
//! Dynamic entries only live while the playlist is open.

use super::models::{Perspective, Playlist, PlaylistTrack, TrackRef};
use crate::reorder;
use crate::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};

const PLAYLIST_COLUMNS: &str = "id, name, perspective, open, active, active_position";
const TRACK_COLUMNS: &str = "id, playlist_id, position, location, track_id, dynamic";

async fn load(conn: &mut SqliteConnection, playlist_id: i64) -> Result<Vec<PlaylistTrack>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM playlist_tracks WHERE playlist_id = ? ORDER BY position, id",
        TRACK_COLUMNS
    ))
    .bind(playlist_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.iter().map(PlaylistTrack::from_row).collect())
}

async fn persist(conn: &mut SqliteConnection, list: &mut [PlaylistTrack]) -> Result<()> {
    for item in list.iter_mut() {
        if item.ignore {
            if item.id != 0 {
                sqlx::query("DELETE FROM playlist_tracks WHERE id = ?")
                    .bind(item.id)
                    .execute(&mut *conn)
                    .await?;
            }
        } else if item.id == 0 {
            item.id = sqlx::query_scalar(
                "INSERT INTO playlist_tracks (playlist_id, position, location, track_id, dynamic)
                 VALUES (?, ?, ?, ?, ?)
                 RETURNING id",
            )
            .bind(item.playlist_id)
            .bind(item.position)
            .bind(&item.location)
            .bind(item.track_id)
            .bind(item.dynamic)
            .fetch_one(&mut *conn)
            .await?;
        } else {
            sqlx::query("UPDATE playlist_tracks SET position = ? WHERE id = ?")
                .bind(item.position)
                .bind(item.id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

/// Load, reorder and persist in one transaction; the removed entry is deleted
async fn mutate<F>(
    pool: &SqlitePool,
    playlist_id: i64,
    apply: F,
) -> Result<(Vec<PlaylistTrack>, Option<PlaylistTrack>)>
where
    F: FnOnce(Vec<PlaylistTrack>) -> (Vec<PlaylistTrack>, Option<PlaylistTrack>),
{
    let mut tx = pool.begin().await?;
    ensure_exists(&mut tx, playlist_id).await?;

    let current = load(&mut tx, playlist_id).await?;
    let (mut list, removed) = apply(current);

    if let Some(item) = removed.as_ref() {
        sqlx::query("DELETE FROM playlist_tracks WHERE id = ?")
            .bind(item.id)
            .execute(&mut *tx)
            .await?;
    }
    persist(&mut tx, &mut list).await?;

    tx.commit().await?;
    let list = list.into_iter().filter(|item| !item.ignore).collect();
    Ok((list, removed))
}

async fn ensure_exists(conn: &mut SqliteConnection, playlist_id: i64) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM playlists WHERE id = ?)")
        .bind(playlist_id)
        .fetch_one(&mut *conn)
        .await?;

    if exists {
        Ok(())
    } else {
        Err(Error::NotFound {
            entity: "playlist",
            id: playlist_id,
        })
    }
}

fn entries(playlist_id: i64, items: Vec<TrackRef>, dynamic: bool) -> Vec<PlaylistTrack> {
    items
        .into_iter()
        .map(|item| PlaylistTrack::unsaved(playlist_id, item, dynamic))
        .collect()
}

pub async fn create(pool: &SqlitePool, name: &str, perspective: Perspective) -> Result<Playlist> {
    let row = sqlx::query(&format!(
        "INSERT INTO playlists (name, perspective) VALUES (?, ?) RETURNING {}",
        PLAYLIST_COLUMNS
    ))
    .bind(name)
    .bind(perspective.as_str())
    .fetch_one(pool)
    .await?;

    Playlist::from_row(&row)
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Playlist>> {
    let row = sqlx::query(&format!("SELECT {} FROM playlists WHERE id = ?", PLAYLIST_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(Playlist::from_row).transpose()
}

/// Like [`get`] but a missing id is an error
pub async fn require(pool: &SqlitePool, id: i64) -> Result<Playlist> {
    get(pool, id)
        .await?
        .ok_or(Error::NotFound { entity: "playlist", id })
}

/// Playlists of a perspective's playbar
pub async fn list(pool: &SqlitePool, perspective: Perspective) -> Result<Vec<Playlist>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM playlists WHERE perspective = ? ORDER BY id",
        PLAYLIST_COLUMNS
    ))
    .bind(perspective.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(Playlist::from_row).collect()
}

/// The playlist driving playback in `perspective`, if any
pub async fn active(pool: &SqlitePool, perspective: Perspective) -> Result<Option<Playlist>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM playlists WHERE perspective = ? AND active = 1 LIMIT 1",
        PLAYLIST_COLUMNS
    ))
    .bind(perspective.as_str())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(Playlist::from_row).transpose()
}

pub async fn open(pool: &SqlitePool, id: i64) -> Result<Playlist> {
    sqlx::query("UPDATE playlists SET open = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    require(pool, id).await
}

/// Close a playlist: drop its dynamic entries, renumber the rest, deactivate
pub async fn close(pool: &SqlitePool, id: i64) -> Result<Playlist> {
    let mut tx = pool.begin().await?;
    ensure_exists(&mut tx, id).await?;

    let mut list = load(&mut tx, id).await?;
    for item in list.iter_mut().filter(|item| item.dynamic) {
        item.ignore = true;
    }
    let mut list = reorder::append_to(list, Vec::new());
    persist(&mut tx, &mut list).await?;

    sqlx::query("UPDATE playlists SET open = 0, active = 0, active_position = 0 WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    require(pool, id).await
}

/// Make `id` the active playlist of its perspective, playing `position`
pub async fn set_active(pool: &SqlitePool, id: i64, position: i64) -> Result<Playlist> {
    let playlist = require(pool, id).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE playlists SET active = 0, active_position = 0 WHERE perspective = ? AND id != ?")
        .bind(playlist.perspective.as_str())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE playlists SET open = 1, active = 1, active_position = ? WHERE id = ?")
        .bind(position)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    require(pool, id).await
}

pub async fn clear_active(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE playlists SET active = 0, active_position = 0 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Entries in position order
pub async fn tracks(pool: &SqlitePool, playlist_id: i64) -> Result<Vec<PlaylistTrack>> {
    let mut conn = pool.acquire().await?;
    load(&mut conn, playlist_id).await
}

/// Entry at `position`
pub async fn track_at(
    pool: &SqlitePool,
    playlist_id: i64,
    position: i64,
) -> Result<Option<PlaylistTrack>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM playlist_tracks WHERE playlist_id = ? AND position = ?",
        TRACK_COLUMNS
    ))
    .bind(playlist_id)
    .bind(position)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(PlaylistTrack::from_row))
}

/// Append entries
pub async fn add(
    pool: &SqlitePool,
    playlist_id: i64,
    items: Vec<TrackRef>,
    dynamic: bool,
) -> Result<Vec<PlaylistTrack>> {
    let new = entries(playlist_id, items, dynamic);
    let (list, _) = mutate(pool, playlist_id, |current| (reorder::append_to(current, new), None)).await?;
    Ok(list)
}

/// Insert entries so the first lands at `position`
pub async fn insert(
    pool: &SqlitePool,
    playlist_id: i64,
    position: i64,
    items: Vec<TrackRef>,
    dynamic: bool,
) -> Result<Vec<PlaylistTrack>> {
    let new = entries(playlist_id, items, dynamic);
    let (list, _) = mutate(pool, playlist_id, |current| {
        (reorder::insert_into(current, position, new), None)
    })
    .await?;
    Ok(list)
}

pub async fn remove_at(
    pool: &SqlitePool,
    playlist_id: i64,
    position: i64,
) -> Result<Option<PlaylistTrack>> {
    let (_, removed) = mutate(pool, playlist_id, |current| reorder::delete_at(current, position)).await?;
    Ok(removed)
}

pub async fn move_entry(
    pool: &SqlitePool,
    playlist_id: i64,
    to: i64,
    from: i64,
) -> Result<Vec<PlaylistTrack>> {
    let (list, _) = mutate(pool, playlist_id, |current| (reorder::move_to(current, to, from), None)).await?;
    Ok(list)
}
