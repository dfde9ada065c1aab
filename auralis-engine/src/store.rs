/// Durable fingerprint store
///
/// SQLite, one row per (track_id, schema_version) with the 25 dimensions as
/// typed REAL columns, so external tooling can query them directly. Readers
/// tolerate extra columns; writers never drop any. The pool gives
/// multi-reader concurrency; SQLite itself serializes the short writes.

use crate::error::StoreError;
use crate::tracks::TrackId;
use auralis_dsp::{Fingerprint, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// Dimension column names in canonical fingerprint order.
const COLUMNS: [&str; 25] = [
    "sub_bass",
    "bass",
    "low_mid",
    "mid",
    "upper_mid",
    "presence",
    "air",
    "lufs",
    "crest_db",
    "bass_mid_ratio_db",
    "tempo_bpm",
    "rhythm_stability",
    "transient_density",
    "silence_ratio",
    "spectral_centroid_hz",
    "spectral_rolloff_hz",
    "spectral_flatness",
    "harmonic_ratio",
    "pitch_stability",
    "chroma_energy",
    "dynamic_range_variation",
    "loudness_variation",
    "peak_consistency",
    "stereo_width",
    "phase_correlation",
];

#[derive(Debug, Clone)]
pub struct StoredFingerprint {
    pub fingerprint: Fingerprint,
    pub schema_version: u16,
    pub created_at: DateTime<Utc>,
}

pub struct FingerprintStore {
    pool: SqlitePool,
}

impl FingerprintStore {
    /// Open (creating if needed) and verify integrity. A failed integrity
    /// check is the fatal startup condition: the process exits 2.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let verdict: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await?;
        if verdict != "ok" {
            return Err(StoreError::Corrupt(format!(
                "integrity check failed: {verdict}"
            )));
        }

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        let dims: String = COLUMNS
            .iter()
            .map(|c| format!("{c} REAL NOT NULL"))
            .collect::<Vec<_>>()
            .join(", ");
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS fingerprints (
                track_id TEXT NOT NULL,
                schema_version INTEGER NOT NULL,
                {dims},
                created_at TEXT NOT NULL,
                PRIMARY KEY (track_id, schema_version)
            )"
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    /// Fetch the fingerprint for the current schema version.
    pub async fn get(&self, track_id: &TrackId) -> Result<Option<StoredFingerprint>, StoreError> {
        let sql = format!(
            "SELECT {}, schema_version, created_at FROM fingerprints \
             WHERE track_id = ? AND schema_version = ?",
            COLUMNS.join(", ")
        );
        let row = sqlx::query(&sql)
            .bind(track_id.as_str())
            .bind(SCHEMA_VERSION as i64)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut values = [0.0f32; 25];
        for (i, col) in COLUMNS.iter().enumerate() {
            values[i] = row.try_get::<f64, _>(*col)? as f32;
        }
        let schema_version = row.try_get::<i64, _>("schema_version")? as u16;
        let created_at: String = row.try_get("created_at")?;
        let created_at = created_at
            .parse::<DateTime<Utc>>()
            .map_err(|e| StoreError::Corrupt(format!("bad created_at: {e}")))?;

        Ok(Some(StoredFingerprint {
            fingerprint: Fingerprint::from_array(values),
            schema_version,
            created_at,
        }))
    }

    /// Insert or replace. Idempotent on (track_id, schema_version); retried
    /// once internally before the error propagates.
    pub async fn put(&self, track_id: &TrackId, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        match self.put_once(track_id, fingerprint).await {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::warn!(track_id = %track_id, error = %first, "store write failed, retrying once");
                self.put_once(track_id, fingerprint).await
            }
        }
    }

    async fn put_once(
        &self,
        track_id: &TrackId,
        fingerprint: &Fingerprint,
    ) -> Result<(), StoreError> {
        let placeholders: String = std::iter::repeat("?")
            .take(COLUMNS.len())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO fingerprints (track_id, schema_version, {}, created_at) \
             VALUES (?, ?, {placeholders}, ?)",
            COLUMNS.join(", ")
        );

        let mut query = sqlx::query(&sql)
            .bind(track_id.as_str())
            .bind(SCHEMA_VERSION as i64);
        for value in fingerprint.to_array() {
            query = query.bind(value as f64);
        }
        query = query.bind(Utc::now().to_rfc3339());

        query.execute(&self.pool).await?;
        Ok(())
    }

    /// Remove every schema version for a track.
    pub async fn delete(&self, track_id: &TrackId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM fingerprints WHERE track_id = ?")
            .bind(track_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn exists(&self, track_id: &TrackId) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM fingerprints WHERE track_id = ? AND schema_version = ?",
        )
        .bind(track_id.as_str())
        .bind(SCHEMA_VERSION as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}
