use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::connection::DatabaseConnection;
use crate::db::models::{DownloadedTrail, NewDownload};

/// Database operations for the offline download list
pub struct DbOperations;

impl DbOperations {
    fn row_to_download(row: &Row<'_>) -> rusqlite::Result<DownloadedTrail> {
        Ok(DownloadedTrail {
            id: row.get(0)?,
            name: row.get(1)?,
            talking_point: row.get(2)?,
            image: row.get(3)?,
            local_audio: row.get(4)?,
            downloaded_at: row.get(5)?,
        })
    }

    /// Record a finished download. Downloading the same talking point again
    /// refreshes its media paths and timestamp.
    pub fn record_download(
        db: &DatabaseConnection,
        download: &NewDownload,
    ) -> Result<DownloadedTrail, anyhow::Error> {
        let conn = db.get_connection();
        let conn = conn.lock();

        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO downloaded_trails (name, talking_point, image, local_audio, downloaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name, talking_point) DO UPDATE SET
                image = excluded.image,
                local_audio = excluded.local_audio,
                downloaded_at = excluded.downloaded_at",
            params![
                download.name,
                download.talking_point,
                download.image,
                download.local_audio,
                now
            ],
        )?;

        let record = conn.query_row(
            "SELECT id, name, talking_point, image, local_audio, downloaded_at
             FROM downloaded_trails
             WHERE name = ?1 AND talking_point = ?2",
            params![download.name, download.talking_point],
            Self::row_to_download,
        )?;

        Ok(record)
    }

    /// All downloads, oldest first
    pub fn get_downloaded_trails(
        db: &DatabaseConnection,
    ) -> Result<Vec<DownloadedTrail>, anyhow::Error> {
        let conn = db.get_connection();
        let conn = conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, name, talking_point, image, local_audio, downloaded_at
             FROM downloaded_trails
             ORDER BY downloaded_at, id",
        )?;

        let downloads = stmt
            .query_map([], Self::row_to_download)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(downloads)
    }

    pub fn get_download(
        db: &DatabaseConnection,
        name: &str,
        talking_point: &str,
    ) -> Result<Option<DownloadedTrail>, anyhow::Error> {
        let conn = db.get_connection();
        let conn = conn.lock();

        let record = conn
            .query_row(
                "SELECT id, name, talking_point, image, local_audio, downloaded_at
                 FROM downloaded_trails
                 WHERE name = ?1 AND talking_point = ?2",
                params![name, talking_point],
                Self::row_to_download,
            )
            .optional()?;

        Ok(record)
    }

    pub fn is_downloaded(
        db: &DatabaseConnection,
        name: &str,
        talking_point: &str,
    ) -> Result<bool, anyhow::Error> {
        Ok(Self::get_download(db, name, talking_point)?.is_some())
    }

    /// Returns true if a record was removed
    pub fn remove_download(db: &DatabaseConnection, id: i64) -> Result<bool, anyhow::Error> {
        let conn = db.get_connection();
        let conn = conn.lock();

        let removed = conn.execute("DELETE FROM downloaded_trails WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    pub fn clear_downloads(db: &DatabaseConnection) -> Result<(), anyhow::Error> {
        let conn = db.get_connection();
        let conn = conn.lock();

        conn.execute("DELETE FROM downloaded_trails", [])?;
        Ok(())
    }
}
