//! Database initialization
//!
//! Opens the SQLite pool and creates the tables the player needs. Every
//! statement is idempotent so startup can run it unconditionally.

use super::models::Perspective;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tracks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        location TEXT NOT NULL UNIQUE,
        title TEXT,
        artist TEXT,
        album TEXT,
        duration_ms INTEGER,
        play_count INTEGER NOT NULL DEFAULT 0,
        last_played TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS playbacks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        location TEXT NOT NULL,
        track_id INTEGER REFERENCES tracks(id) ON DELETE SET NULL,
        played INTEGER NOT NULL DEFAULT 0,
        skip_ms INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    // At most one pending playback; doubles as the O(1) "next to play" lookup
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_playbacks_pending ON playbacks(played) WHERE played = 0",
    r#"
    CREATE TABLE IF NOT EXISTS playback_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        location TEXT NOT NULL,
        track_id INTEGER REFERENCES tracks(id) ON DELETE SET NULL,
        duration_played_ms INTEGER NOT NULL,
        played_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS queues (
        perspective TEXT PRIMARY KEY
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS queue_tracks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        perspective TEXT NOT NULL REFERENCES queues(perspective),
        position INTEGER NOT NULL,
        location TEXT NOT NULL,
        track_id INTEGER REFERENCES tracks(id) ON DELETE SET NULL,
        played INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_queue_tracks_order ON queue_tracks(perspective, played, position)",
    r#"
    CREATE TABLE IF NOT EXISTS playlists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        perspective TEXT NOT NULL,
        open INTEGER NOT NULL DEFAULT 0,
        active INTEGER NOT NULL DEFAULT 0,
        active_position INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS playlist_tracks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        playlist_id INTEGER NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        location TEXT NOT NULL,
        track_id INTEGER REFERENCES tracks(id) ON DELETE SET NULL,
        dynamic INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_playlist_tracks_order ON playlist_tracks(playlist_id, position)",
];

/// Create all tables and indexes, and one queue per perspective
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    for perspective in Perspective::ALL {
        sqlx::query("INSERT OR IGNORE INTO queues (perspective) VALUES (?)")
            .bind(perspective.as_str())
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Open (creating if missing) the database file at `path` and initialize it
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    info!("Database ready at {}", path.display());
    Ok(pool)
}

/// In-memory database with the full schema
///
/// Pinned to a single connection that is never recycled: every SQLite memory
/// connection is its own database.
pub async fn memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}
