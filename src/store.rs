use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::catalog::Disease;
use crate::error::StoreError;

/// One stored detection.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub id: i64,
    pub filename: String,
    pub disease: String,
    pub confidence: f64,
    pub timestamp: NaiveDateTime,
}

/// Append-only prediction log backed by a single SQLite connection.
#[derive(Clone)]
pub struct PredictionStore {
    conn: Arc<Mutex<Connection>>,
}

impl PredictionStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_with_connection(conn)
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::init_with_connection(Connection::open_in_memory()?)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                disease TEXT NOT NULL,
                confidence REAL NOT NULL,
                timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_predictions_timestamp ON predictions(timestamp);
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Records a detection stamped with the current UTC time. Returns the row id.
    pub fn insert(
        &self,
        filename: &str,
        disease: Disease,
        confidence: f32,
    ) -> Result<i64, StoreError> {
        self.insert_at(
            filename,
            disease,
            confidence,
            chrono::Utc::now().naive_utc(),
        )
    }

    pub fn insert_at(
        &self,
        filename: &str,
        disease: Disease,
        confidence: f32,
        timestamp: NaiveDateTime,
    ) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO predictions (filename, disease, confidence, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![filename, disease.label(), confidence as f64, timestamp],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All detections, newest first.
    pub fn history(&self) -> Result<Vec<PredictionRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, filename, disease, confidence, timestamp FROM predictions \
             ORDER BY timestamp DESC, id DESC",
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(PredictionRecord {
                    id: row.get(0)?,
                    filename: row.get(1)?,
                    disease: row.get(2)?,
                    confidence: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
