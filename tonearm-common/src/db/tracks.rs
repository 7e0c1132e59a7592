//! Catalog (track) queries

use super::models::{NewTrack, Track};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool};

const TRACK_COLUMNS: &str =
    "id, location, title, artist, album, duration_ms, play_count, last_played";

/// Insert a catalog entry
pub async fn create(pool: &SqlitePool, track: NewTrack) -> Result<Track> {
    let row = sqlx::query(&format!(
        "INSERT INTO tracks (location, title, artist, album, duration_ms)
         VALUES (?, ?, ?, ?, ?)
         RETURNING {}",
        TRACK_COLUMNS
    ))
    .bind(&track.location)
    .bind(&track.title)
    .bind(&track.artist)
    .bind(&track.album)
    .bind(track.duration_ms)
    .fetch_one(pool)
    .await?;

    Ok(Track::from_row(&row))
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Track>> {
    let row = sqlx::query(&format!("SELECT {} FROM tracks WHERE id = ?", TRACK_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(Track::from_row))
}

/// Like [`get`] but a missing id is an error
pub async fn require(pool: &SqlitePool, id: i64) -> Result<Track> {
    get(pool, id)
        .await?
        .ok_or(Error::NotFound { entity: "track", id })
}

pub async fn find_by_location(pool: &SqlitePool, location: &str) -> Result<Option<Track>> {
    let row = sqlx::query(&format!("SELECT {} FROM tracks WHERE location = ?", TRACK_COLUMNS))
        .bind(location)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(Track::from_row))
}

/// Replace the tag fields of a catalog entry
pub async fn update_tags(
    pool: &SqlitePool,
    id: i64,
    title: Option<&str>,
    artist: Option<&str>,
    album: Option<&str>,
) -> Result<Track> {
    let row = sqlx::query(&format!(
        "UPDATE tracks SET title = ?, artist = ?, album = ? WHERE id = ? RETURNING {}",
        TRACK_COLUMNS
    ))
    .bind(title)
    .bind(artist)
    .bind(album)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(Error::NotFound { entity: "track", id })?;

    Ok(Track::from_row(&row))
}

/// Bump play count and last-played after a completed play
pub(crate) async fn record_play<'e, E>(executor: E, id: i64, at: DateTime<Utc>) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE tracks SET play_count = play_count + 1, last_played = ? WHERE id = ?")
        .bind(at)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}
