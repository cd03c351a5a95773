//! Catalog store trait and the SQLite implementation.

use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    JobRow, ServerRow, UpdateFileRow, UploadChunkRow, UploadRow, VersionRow, job_state,
};
use crate::repos::{
    ChunkRepo, FileRepo, JobRepo, ServerRepo, StartUploadOutcome, StartUploadParams, UploadRepo,
    VersionRepo,
};
use async_trait::async_trait;
use depot_core::{VersionNumber, VersionSlot, VersionState};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Combined catalog store trait.
#[async_trait]
pub trait CatalogStore:
    VersionRepo + UploadRepo + ChunkRepo + FileRepo + ServerRepo + JobRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> CatalogResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> CatalogResult<()>;
}

/// True when the error is a unique-index violation (a lost allocation race
/// or duplicate key).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// SQLite-based catalog store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::Config(format!("cannot create {parent:?}: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures under load.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn migrate(&self) -> CatalogResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS versions (
                version_id TEXT PRIMARY KEY,
                major INTEGER NOT NULL,
                minor INTEGER NOT NULL,
                revision INTEGER NOT NULL,
                description TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (major, minor, revision)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS uploads (
                upload_id TEXT PRIMARY KEY,
                version_id TEXT NOT NULL UNIQUE,
                concurrent_id TEXT NOT NULL,
                hash TEXT NOT NULL,
                chunk_size INTEGER NOT NULL,
                file_size INTEGER NOT NULL,
                chunks_count INTEGER NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS upload_chunks (
                upload_id TEXT NOT NULL,
                concurrent_id TEXT NOT NULL,
                chunk_offset INTEGER NOT NULL,
                byte_len INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (upload_id, concurrent_id, chunk_offset)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS update_files (
                version_id TEXT NOT NULL,
                category INTEGER NOT NULL,
                file_name TEXT NOT NULL UNIQUE,
                extension TEXT NOT NULL,
                local_path TEXT NOT NULL,
                packed_size INTEGER NOT NULL,
                file_size INTEGER NOT NULL,
                crc32 TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (version_id, local_path, category)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_update_files_version ON update_files (version_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS servers (
                url TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                payload_json TEXT NOT NULL,
                state TEXT NOT NULL,
                progress REAL NOT NULL DEFAULT 0,
                error TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state_created ON jobs (state, created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn health_check(&self) -> CatalogResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl VersionRepo for SqliteStore {
    async fn allocate_version(
        &self,
        version_id: &str,
        slot: VersionSlot,
        description: &str,
        now: OffsetDateTime,
    ) -> CatalogResult<VersionRow> {
        let mut tx = self.pool.begin().await?;

        let latest: Option<(i64, i64, i64)> = sqlx::query_as(
            "SELECT major, minor, revision FROM versions \
             ORDER BY major DESC, minor DESC, revision DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let next = match latest {
            Some((major, minor, revision)) => VersionNumber {
                major: major as u32,
                minor: minor as u32,
                revision: revision as u32,
            }
            .bump(slot),
            None => VersionNumber::first(),
        };

        let row = VersionRow {
            version_id: version_id.to_string(),
            major: next.major as i64,
            minor: next.minor as i64,
            revision: next.revision as i64,
            description: description.to_string(),
            state: VersionState::Pending.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO versions (
                version_id, major, minor, revision, description, state,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.version_id)
        .bind(row.major)
        .bind(row.minor)
        .bind(row.revision)
        .bind(&row.description)
        .bind(&row.state)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(row)
            }
            Err(e) if is_unique_violation(&e) => Err(CatalogError::Conflict(format!(
                "version {next} already allocated"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_version(&self, version_id: &str) -> CatalogResult<Option<VersionRow>> {
        let row =
            sqlx::query_as::<_, VersionRow>("SELECT * FROM versions WHERE version_id = ?")
                .bind(version_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn set_version_state(
        &self,
        version_id: &str,
        from: VersionState,
        to: VersionState,
        updated_at: OffsetDateTime,
    ) -> CatalogResult<bool> {
        let result = sqlx::query(
            "UPDATE versions SET state = ?, updated_at = ? WHERE version_id = ? AND state = ?",
        )
        .bind(to.as_str())
        .bind(updated_at)
        .bind(version_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_version_description(
        &self,
        version_id: &str,
        description: &str,
        updated_at: OffsetDateTime,
    ) -> CatalogResult<bool> {
        let result = sqlx::query(
            "UPDATE versions SET description = ?, updated_at = ? WHERE version_id = ?",
        )
        .bind(description)
        .bind(updated_at)
        .bind(version_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_versions(&self, page: u32, size: u32) -> CatalogResult<(Vec<VersionRow>, u64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM versions")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, VersionRow>(
            "SELECT * FROM versions \
             ORDER BY major DESC, minor DESC, revision DESC LIMIT ? OFFSET ?",
        )
        .bind(size as i64)
        .bind(page as i64 * size as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total as u64))
    }

    async fn list_ready_versions_after(
        &self,
        number: VersionNumber,
    ) -> CatalogResult<Vec<VersionRow>> {
        let rows = sqlx::query_as::<_, VersionRow>(
            r#"
            SELECT * FROM versions
            WHERE state = 'ready'
              AND (major > ?
                   OR (major = ? AND minor > ?)
                   OR (major = ? AND minor = ? AND revision > ?))
            ORDER BY created_at ASC
            "#,
        )
        .bind(number.major as i64)
        .bind(number.major as i64)
        .bind(number.minor as i64)
        .bind(number.major as i64)
        .bind(number.minor as i64)
        .bind(number.revision as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl UploadRepo for SqliteStore {
    async fn start_upload(
        &self,
        params: &StartUploadParams,
        now: OffsetDateTime,
    ) -> CatalogResult<StartUploadOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing =
            sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE version_id = ?")
                .bind(&params.version_id)
                .fetch_optional(&mut *tx)
                .await?;

        match existing {
            None => {
                let row = UploadRow {
                    upload_id: params.new_upload_id.clone(),
                    version_id: params.version_id.clone(),
                    concurrent_id: params.new_concurrent_id.clone(),
                    hash: params.hash.clone(),
                    chunk_size: params.chunk_size,
                    file_size: params.file_size,
                    chunks_count: params.chunks_count,
                    state: depot_core::UploadState::None.as_str().to_string(),
                    created_at: now,
                    updated_at: now,
                };
                sqlx::query(
                    r#"
                    INSERT INTO uploads (
                        upload_id, version_id, concurrent_id, hash, chunk_size,
                        file_size, chunks_count, state, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&row.upload_id)
                .bind(&row.version_id)
                .bind(&row.concurrent_id)
                .bind(&row.hash)
                .bind(row.chunk_size)
                .bind(row.file_size)
                .bind(row.chunks_count)
                .bind(&row.state)
                .bind(row.created_at)
                .bind(row.updated_at)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(StartUploadOutcome {
                    upload: row,
                    rotated_from_hash: None,
                })
            }
            Some(row) if row.hash == params.hash && row.chunk_size == params.chunk_size => {
                tx.commit().await?;
                Ok(StartUploadOutcome {
                    upload: row,
                    rotated_from_hash: None,
                })
            }
            Some(row) => {
                sqlx::query(
                    r#"
                    UPDATE uploads SET
                        concurrent_id = ?, hash = ?, chunk_size = ?, file_size = ?,
                        chunks_count = ?, state = 'none', updated_at = ?
                    WHERE upload_id = ?
                    "#,
                )
                .bind(&params.new_concurrent_id)
                .bind(&params.hash)
                .bind(params.chunk_size)
                .bind(params.file_size)
                .bind(params.chunks_count)
                .bind(now)
                .bind(&row.upload_id)
                .execute(&mut *tx)
                .await?;

                sqlx::query("DELETE FROM upload_chunks WHERE upload_id = ?")
                    .bind(&row.upload_id)
                    .execute(&mut *tx)
                    .await?;

                tx.commit().await?;

                let rotated = UploadRow {
                    concurrent_id: params.new_concurrent_id.clone(),
                    hash: params.hash.clone(),
                    chunk_size: params.chunk_size,
                    file_size: params.file_size,
                    chunks_count: params.chunks_count,
                    state: depot_core::UploadState::None.as_str().to_string(),
                    updated_at: now,
                    ..row.clone()
                };
                Ok(StartUploadOutcome {
                    upload: rotated,
                    rotated_from_hash: Some(row.hash),
                })
            }
        }
    }

    async fn get_upload(&self, upload_id: &str) -> CatalogResult<Option<UploadRow>> {
        let row = sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE upload_id = ?")
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_upload_by_version(&self, version_id: &str) -> CatalogResult<Option<UploadRow>> {
        let row = sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE version_id = ?")
            .bind(version_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn set_upload_state(
        &self,
        upload_id: &str,
        from: depot_core::UploadState,
        to: depot_core::UploadState,
        updated_at: OffsetDateTime,
    ) -> CatalogResult<bool> {
        let result = sqlx::query(
            "UPDATE uploads SET state = ?, updated_at = ? WHERE upload_id = ? AND state = ?",
        )
        .bind(to.as_str())
        .bind(updated_at)
        .bind(upload_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ChunkRepo for SqliteStore {
    async fn insert_chunk_if_absent(&self, chunk: &UploadChunkRow) -> CatalogResult<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_chunks (
                upload_id, concurrent_id, chunk_offset, byte_len, created_at
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (upload_id, concurrent_id, chunk_offset) DO NOTHING
            "#,
        )
        .bind(&chunk.upload_id)
        .bind(&chunk.concurrent_id)
        .bind(chunk.chunk_offset)
        .bind(chunk.byte_len)
        .bind(chunk.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_chunks(&self, upload_id: &str, concurrent_id: &str) -> CatalogResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM upload_chunks WHERE upload_id = ? AND concurrent_id = ?",
        )
        .bind(upload_id)
        .bind(concurrent_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn list_chunk_offsets(
        &self,
        upload_id: &str,
        concurrent_id: &str,
    ) -> CatalogResult<Vec<i64>> {
        let offsets: Vec<i64> = sqlx::query_scalar(
            "SELECT chunk_offset FROM upload_chunks \
             WHERE upload_id = ? AND concurrent_id = ? ORDER BY chunk_offset ASC",
        )
        .bind(upload_id)
        .bind(concurrent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(offsets)
    }

    async fn delete_chunks(&self, upload_id: &str) -> CatalogResult<u64> {
        let result = sqlx::query("DELETE FROM upload_chunks WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FileRepo for SqliteStore {
    async fn commit_version_files(
        &self,
        version_id: &str,
        files: &[UpdateFileRow],
        updated_at: OffsetDateTime,
    ) -> CatalogResult<()> {
        let mut tx = self.pool.begin().await?;

        for file in files {
            sqlx::query(
                r#"
                INSERT INTO update_files (
                    version_id, category, file_name, extension, local_path,
                    packed_size, file_size, crc32, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&file.version_id)
            .bind(file.category)
            .bind(&file.file_name)
            .bind(&file.extension)
            .bind(&file.local_path)
            .bind(file.packed_size)
            .bind(file.file_size)
            .bind(&file.crc32)
            .bind(file.created_at)
            .execute(&mut *tx)
            .await?;
        }

        let result = sqlx::query(
            "UPDATE versions SET state = 'ready', updated_at = ? \
             WHERE version_id = ? AND state = 'processing'",
        )
        .bind(updated_at)
        .bind(version_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls the inserts back.
            return Err(CatalogError::Conflict(format!(
                "version {version_id} is not in processing state"
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_files_for_versions(
        &self,
        version_ids: &[String],
        categories: &[i32],
    ) -> CatalogResult<Vec<UpdateFileRow>> {
        if version_ids.is_empty() || categories.is_empty() {
            return Ok(Vec::new());
        }

        let version_marks = vec!["?"; version_ids.len()].join(", ");
        let category_marks = vec!["?"; categories.len()].join(", ");
        let sql = format!(
            "SELECT * FROM update_files \
             WHERE version_id IN ({version_marks}) AND category IN ({category_marks})"
        );

        let mut query = sqlx::query_as::<_, UpdateFileRow>(&sql);
        for id in version_ids {
            query = query.bind(id);
        }
        for category in categories {
            query = query.bind(*category as i64);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn count_files(&self, version_id: &str) -> CatalogResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM update_files WHERE version_id = ?")
                .bind(version_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl ServerRepo for SqliteStore {
    async fn list_servers(&self) -> CatalogResult<Vec<ServerRow>> {
        let rows =
            sqlx::query_as::<_, ServerRow>("SELECT * FROM servers ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn insert_server(&self, url: &str, now: OffsetDateTime) -> CatalogResult<()> {
        sqlx::query("INSERT INTO servers (url, created_at) VALUES (?, ?) ON CONFLICT (url) DO NOTHING")
            .bind(url)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobRepo for SqliteStore {
    async fn enqueue_job(&self, job: &JobRow) -> CatalogResult<bool> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE job_id = ?")
            .bind(&job.job_id)
            .fetch_optional(&mut *tx)
            .await?;

        match existing {
            Some(row) if row.state == job_state::FAILED => {
                sqlx::query("DELETE FROM jobs WHERE job_id = ?")
                    .bind(&job.job_id)
                    .execute(&mut *tx)
                    .await?;
            }
            Some(_) => {
                // A live job with this id already exists.
                tx.commit().await?;
                return Ok(false);
            }
            None => {}
        }

        sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id, payload_json, state, progress, error, attempts,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.payload_json)
        .bind(job_state::QUEUED)
        .bind(0.0f64)
        .bind(None::<String>)
        .bind(0i64)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn lease_next_job(&self, now: OffsetDateTime) -> CatalogResult<Option<JobRow>> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE state = 'queued' \
             ORDER BY created_at ASC, job_id ASC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut job) = job else {
            tx.commit().await?;
            return Ok(None);
        };

        let result = sqlx::query(
            "UPDATE jobs SET state = 'active', attempts = attempts + 1, updated_at = ? \
             WHERE job_id = ? AND state = 'queued'",
        )
        .bind(now)
        .bind(&job.job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        job.state = job_state::ACTIVE.to_string();
        job.attempts += 1;
        job.updated_at = now;
        Ok(Some(job))
    }

    async fn update_job_progress(
        &self,
        job_id: &str,
        progress: f64,
        now: OffsetDateTime,
    ) -> CatalogResult<()> {
        sqlx::query("UPDATE jobs SET progress = ?, updated_at = ? WHERE job_id = ?")
            .bind(progress.clamp(0.0, 100.0))
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn complete_job(&self, job_id: &str) -> CatalogResult<()> {
        sqlx::query("DELETE FROM jobs WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail_job(&self, job_id: &str, error: &str, now: OffsetDateTime) -> CatalogResult<()> {
        sqlx::query("UPDATE jobs SET state = 'failed', error = ?, updated_at = ? WHERE job_id = ?")
            .bind(error)
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_unfinished_jobs(&self) -> CatalogResult<Vec<JobRow>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE state IN ('active', 'queued') ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_job(&self, job_id: &str) -> CatalogResult<Option<JobRow>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn requeue_active_jobs(&self, now: OffsetDateTime) -> CatalogResult<u64> {
        let result =
            sqlx::query("UPDATE jobs SET state = 'queued', updated_at = ? WHERE state = 'active'")
                .bind(now)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn build_store() -> (tempfile::TempDir, SqliteStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp.path().join("catalog.db")).await.unwrap();
        (temp, store)
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn start_params(version_id: &str, hash: &str) -> StartUploadParams {
        StartUploadParams {
            version_id: version_id.to_string(),
            new_upload_id: depot_core::UploadId::generate().to_hex(),
            new_concurrent_id: depot_core::EpochId::generate().to_hex(),
            hash: hash.to_string(),
            chunk_size: 16 * 1024,
            file_size: 48 * 1024,
            chunks_count: 3,
        }
    }

    #[tokio::test]
    async fn allocate_version_sequence() {
        let (_temp, store) = build_store().await;

        let first = store
            .allocate_version("a".repeat(24).as_str(), VersionSlot::Revision, "v1", now())
            .await
            .unwrap();
        assert_eq!(first.number().to_string(), "1.0.0");
        assert_eq!(first.state, "pending");

        let second = store
            .allocate_version("b".repeat(24).as_str(), VersionSlot::Revision, "v2", now())
            .await
            .unwrap();
        assert_eq!(second.number().to_string(), "1.0.1");

        let third = store
            .allocate_version("c".repeat(24).as_str(), VersionSlot::Minor, "v3", now())
            .await
            .unwrap();
        assert_eq!(third.number().to_string(), "1.1.0");
    }

    #[tokio::test]
    async fn version_state_cas_is_monotonic() {
        let (_temp, store) = build_store().await;
        let row = store
            .allocate_version("a".repeat(24).as_str(), VersionSlot::Major, "v", now())
            .await
            .unwrap();

        assert!(
            store
                .set_version_state(
                    &row.version_id,
                    VersionState::Pending,
                    VersionState::Processing,
                    now()
                )
                .await
                .unwrap()
        );
        // Losing CAS: the row is no longer pending.
        assert!(
            !store
                .set_version_state(
                    &row.version_id,
                    VersionState::Pending,
                    VersionState::Processing,
                    now()
                )
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn start_upload_is_idempotent_for_same_params() {
        let (_temp, store) = build_store().await;
        let params = start_params(&"1".repeat(24), &"a".repeat(64));

        let first = store.start_upload(&params, now()).await.unwrap();
        assert!(first.rotated_from_hash.is_none());

        let mut again = start_params(&"1".repeat(24), &"a".repeat(64));
        again.new_upload_id = depot_core::UploadId::generate().to_hex();
        again.new_concurrent_id = depot_core::EpochId::generate().to_hex();
        let second = store.start_upload(&again, now()).await.unwrap();

        assert!(second.rotated_from_hash.is_none());
        assert_eq!(second.upload.upload_id, first.upload.upload_id);
        assert_eq!(second.upload.concurrent_id, first.upload.concurrent_id);
    }

    #[tokio::test]
    async fn start_upload_rotates_epoch_on_hash_change() {
        let (_temp, store) = build_store().await;
        let params = start_params(&"1".repeat(24), &"a".repeat(64));
        let first = store.start_upload(&params, now()).await.unwrap();

        // Two chunks land under the first epoch.
        for offset in [0, 1] {
            store
                .insert_chunk_if_absent(&UploadChunkRow {
                    upload_id: first.upload.upload_id.clone(),
                    concurrent_id: first.upload.concurrent_id.clone(),
                    chunk_offset: offset,
                    byte_len: 16 * 1024,
                    created_at: now(),
                })
                .await
                .unwrap();
        }

        let mut changed = start_params(&"1".repeat(24), &"b".repeat(64));
        changed.new_concurrent_id = depot_core::EpochId::generate().to_hex();
        let second = store.start_upload(&changed, now()).await.unwrap();

        assert_eq!(second.rotated_from_hash.as_deref(), Some("a".repeat(64).as_str()));
        assert_eq!(second.upload.upload_id, first.upload.upload_id);
        assert_ne!(second.upload.concurrent_id, first.upload.concurrent_id);
        assert_eq!(second.upload.state, "none");

        // Old-epoch chunk receipts are gone.
        let count = store
            .count_chunks(&first.upload.upload_id, &first.upload.concurrent_id)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn chunk_insert_is_idempotent() {
        let (_temp, store) = build_store().await;
        let chunk = UploadChunkRow {
            upload_id: "u".to_string(),
            concurrent_id: "c".to_string(),
            chunk_offset: 0,
            byte_len: 100,
            created_at: now(),
        };

        store.insert_chunk_if_absent(&chunk).await.unwrap();
        store.insert_chunk_if_absent(&chunk).await.unwrap();
        assert_eq!(store.count_chunks("u", "c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn commit_version_files_requires_processing_state() {
        let (_temp, store) = build_store().await;
        let row = store
            .allocate_version("a".repeat(24).as_str(), VersionSlot::Major, "v", now())
            .await
            .unwrap();

        let file = UpdateFileRow {
            version_id: row.version_id.clone(),
            category: 0,
            file_name: "AAAA_1A2B3C4D".to_string(),
            extension: ".eupdz".to_string(),
            local_path: "a.png".to_string(),
            packed_size: 1,
            file_size: 2,
            crc32: "1a2b3c4d".to_string(),
            created_at: now(),
        };

        // Still PENDING: the commit must abort and insert nothing.
        let err = store
            .commit_version_files(&row.version_id, std::slice::from_ref(&file), now())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
        assert_eq!(store.count_files(&row.version_id).await.unwrap(), 0);

        store
            .set_version_state(
                &row.version_id,
                VersionState::Pending,
                VersionState::Processing,
                now(),
            )
            .await
            .unwrap();

        store
            .commit_version_files(&row.version_id, &[file], now())
            .await
            .unwrap();
        assert_eq!(store.count_files(&row.version_id).await.unwrap(), 1);
        let version = store.get_version(&row.version_id).await.unwrap().unwrap();
        assert_eq!(version.state, "ready");
    }

    #[tokio::test]
    async fn job_queue_dedups_by_id() {
        let (_temp, store) = build_store().await;
        let job = JobRow {
            job_id: "version-a-b-c".to_string(),
            payload_json: "{}".to_string(),
            state: job_state::QUEUED.to_string(),
            progress: 0.0,
            error: None,
            attempts: 0,
            created_at: now(),
            updated_at: now(),
        };

        assert!(store.enqueue_job(&job).await.unwrap());
        assert!(!store.enqueue_job(&job).await.unwrap());

        // A failed job with the id is replaced.
        let leased = store.lease_next_job(now()).await.unwrap().unwrap();
        assert_eq!(leased.job_id, job.job_id);
        store.fail_job(&job.job_id, "boom", now()).await.unwrap();
        assert!(store.enqueue_job(&job).await.unwrap());

        let replaced = store.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(replaced.state, job_state::QUEUED);
        assert!(replaced.error.is_none());
    }

    #[tokio::test]
    async fn job_lease_is_fifo_and_exclusive() {
        let (_temp, store) = build_store().await;
        let first = JobRow {
            job_id: "job-1".to_string(),
            payload_json: "{}".to_string(),
            state: job_state::QUEUED.to_string(),
            progress: 0.0,
            error: None,
            attempts: 0,
            created_at: now() - time::Duration::seconds(10),
            updated_at: now(),
        };
        let second = JobRow {
            job_id: "job-2".to_string(),
            created_at: now(),
            ..first.clone()
        };
        store.enqueue_job(&first).await.unwrap();
        store.enqueue_job(&second).await.unwrap();

        let leased = store.lease_next_job(now()).await.unwrap().unwrap();
        assert_eq!(leased.job_id, "job-1");
        assert_eq!(leased.attempts, 1);

        let leased = store.lease_next_job(now()).await.unwrap().unwrap();
        assert_eq!(leased.job_id, "job-2");

        assert!(store.lease_next_job(now()).await.unwrap().is_none());

        store.complete_job("job-1").await.unwrap();
        store.complete_job("job-2").await.unwrap();
        assert!(store.list_unfinished_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn requeue_active_jobs_resets_leases() {
        let (_temp, store) = build_store().await;
        let job = JobRow {
            job_id: "job-1".to_string(),
            payload_json: "{}".to_string(),
            state: job_state::QUEUED.to_string(),
            progress: 0.0,
            error: None,
            attempts: 0,
            created_at: now(),
            updated_at: now(),
        };
        store.enqueue_job(&job).await.unwrap();
        store.lease_next_job(now()).await.unwrap().unwrap();

        assert_eq!(store.requeue_active_jobs(now()).await.unwrap(), 1);
        let row = store.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(row.state, job_state::QUEUED);
    }

    #[tokio::test]
    async fn list_ready_versions_after_filters_and_orders() {
        let (_temp, store) = build_store().await;
        let ids: Vec<String> = (0..3).map(|i| format!("{:024}", i)).collect();
        for id in &ids {
            store
                .allocate_version(id, VersionSlot::Revision, "v", now())
                .await
                .unwrap();
        }
        // Publish the first two.
        for id in &ids[..2] {
            store
                .set_version_state(id, VersionState::Pending, VersionState::Processing, now())
                .await
                .unwrap();
            store
                .set_version_state(id, VersionState::Processing, VersionState::Ready, now())
                .await
                .unwrap();
        }

        let after_zero = store
            .list_ready_versions_after(VersionNumber::default())
            .await
            .unwrap();
        assert_eq!(after_zero.len(), 2);
        assert!(after_zero[0].created_at <= after_zero[1].created_at);

        let after_first = store
            .list_ready_versions_after(VersionNumber::parse("1.0.0").unwrap())
            .await
            .unwrap();
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].number().to_string(), "1.0.1");
    }

    #[tokio::test]
    async fn servers_listing_is_idempotent() {
        let (_temp, store) = build_store().await;
        store
            .insert_server("https://cdn-1.example.com", now())
            .await
            .unwrap();
        store
            .insert_server("https://cdn-1.example.com", now())
            .await
            .unwrap();
        assert_eq!(store.list_servers().await.unwrap().len(), 1);
    }
}
