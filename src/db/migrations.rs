// Database migrations
use anyhow::Result;
use rusqlite::Connection;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    // One row per downloaded talking point
    conn.execute(
        "CREATE TABLE IF NOT EXISTS downloaded_trails (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            talking_point TEXT NOT NULL,
            image TEXT,
            local_audio TEXT,
            downloaded_at INTEGER NOT NULL,
            UNIQUE(name, talking_point)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_downloaded_trails_name ON downloaded_trails(name)",
        [],
    )?;

    Ok(())
}
