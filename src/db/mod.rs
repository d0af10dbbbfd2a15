// Database module
// SQLite storage for trails downloaded for offline use

pub mod connection;
pub mod migrations;
pub mod models;
pub mod operations;

pub use connection::DatabaseConnection;
pub use models::{DownloadedTrail, NewDownload};
pub use operations::DbOperations;
