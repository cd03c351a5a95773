//! PostgreSQL catalog store.
//!
//! Mirrors the SQLite store's semantics; tested against a live database by
//! the deployment pipeline rather than in-repo unit tests.

use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    JobRow, ServerRow, UpdateFileRow, UploadChunkRow, UploadRow, VersionRow, job_state,
};
use crate::repos::{
    ChunkRepo, FileRepo, JobRepo, ServerRepo, StartUploadOutcome, StartUploadParams, UploadRepo,
    VersionRepo,
};
use crate::store::{CatalogStore, is_unique_violation};
use async_trait::async_trait;
use depot_core::{VersionNumber, VersionSlot, VersionState};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use time::OffsetDateTime;

/// PostgreSQL-based catalog store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect using a connection URL and run migrations.
    pub async fn from_url(url: &str, max_connections: u32) -> CatalogResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Connect using individual parameters and run migrations.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        max_connections: u32,
    ) -> CatalogResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);
        if let Some(username) = username {
            opts = opts.username(username);
        }
        if let Some(password) = password {
            opts = opts.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn migrate(&self) -> CatalogResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS versions (
                version_id TEXT PRIMARY KEY,
                major BIGINT NOT NULL,
                minor BIGINT NOT NULL,
                revision BIGINT NOT NULL,
                description TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
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
                chunk_size BIGINT NOT NULL,
                file_size BIGINT NOT NULL,
                chunks_count BIGINT NOT NULL,
                state TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
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
                chunk_offset BIGINT NOT NULL,
                byte_len BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
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
                category BIGINT NOT NULL,
                file_name TEXT NOT NULL UNIQUE,
                extension TEXT NOT NULL,
                local_path TEXT NOT NULL,
                packed_size BIGINT NOT NULL,
                file_size BIGINT NOT NULL,
                crc32 TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
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
                created_at TIMESTAMPTZ NOT NULL
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
                progress DOUBLE PRECISION NOT NULL DEFAULT 0,
                error TEXT,
                attempts BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
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
impl VersionRepo for PostgresStore {
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
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
            sqlx::query_as::<_, VersionRow>("SELECT * FROM versions WHERE version_id = $1")
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
            "UPDATE versions SET state = $1, updated_at = $2 \
             WHERE version_id = $3 AND state = $4",
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
            "UPDATE versions SET description = $1, updated_at = $2 WHERE version_id = $3",
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
             ORDER BY major DESC, minor DESC, revision DESC LIMIT $1 OFFSET $2",
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
              AND (major, minor, revision) > ($1, $2, $3)
            ORDER BY created_at ASC
            "#,
        )
        .bind(number.major as i64)
        .bind(number.minor as i64)
        .bind(number.revision as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl UploadRepo for PostgresStore {
    async fn start_upload(
        &self,
        params: &StartUploadParams,
        now: OffsetDateTime,
    ) -> CatalogResult<StartUploadOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, UploadRow>(
            "SELECT * FROM uploads WHERE version_id = $1 FOR UPDATE",
        )
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
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
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
                        concurrent_id = $1, hash = $2, chunk_size = $3, file_size = $4,
                        chunks_count = $5, state = 'none', updated_at = $6
                    WHERE upload_id = $7
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

                sqlx::query("DELETE FROM upload_chunks WHERE upload_id = $1")
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
        let row = sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE upload_id = $1")
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_upload_by_version(&self, version_id: &str) -> CatalogResult<Option<UploadRow>> {
        let row = sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE version_id = $1")
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
            "UPDATE uploads SET state = $1, updated_at = $2 \
             WHERE upload_id = $3 AND state = $4",
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
impl ChunkRepo for PostgresStore {
    async fn insert_chunk_if_absent(&self, chunk: &UploadChunkRow) -> CatalogResult<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_chunks (
                upload_id, concurrent_id, chunk_offset, byte_len, created_at
            ) VALUES ($1, $2, $3, $4, $5)
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
            "SELECT COUNT(*) FROM upload_chunks WHERE upload_id = $1 AND concurrent_id = $2",
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
             WHERE upload_id = $1 AND concurrent_id = $2 ORDER BY chunk_offset ASC",
        )
        .bind(upload_id)
        .bind(concurrent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(offsets)
    }

    async fn delete_chunks(&self, upload_id: &str) -> CatalogResult<u64> {
        let result = sqlx::query("DELETE FROM upload_chunks WHERE upload_id = $1")
            .bind(upload_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FileRepo for PostgresStore {
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
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
            "UPDATE versions SET state = 'ready', updated_at = $1 \
             WHERE version_id = $2 AND state = 'processing'",
        )
        .bind(updated_at)
        .bind(version_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
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

        let categories: Vec<i64> = categories.iter().map(|&c| c as i64).collect();
        let rows = sqlx::query_as::<_, UpdateFileRow>(
            "SELECT * FROM update_files \
             WHERE version_id = ANY($1) AND category = ANY($2)",
        )
        .bind(version_ids)
        .bind(&categories)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_files(&self, version_id: &str) -> CatalogResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM update_files WHERE version_id = $1")
                .bind(version_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl ServerRepo for PostgresStore {
    async fn list_servers(&self) -> CatalogResult<Vec<ServerRow>> {
        let rows =
            sqlx::query_as::<_, ServerRow>("SELECT * FROM servers ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn insert_server(&self, url: &str, now: OffsetDateTime) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO servers (url, created_at) VALUES ($1, $2) ON CONFLICT (url) DO NOTHING",
        )
        .bind(url)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl JobRepo for PostgresStore {
    async fn enqueue_job(&self, job: &JobRow) -> CatalogResult<bool> {
        let mut tx = self.pool.begin().await?;

        let existing =
            sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE job_id = $1 FOR UPDATE")
                .bind(&job.job_id)
                .fetch_optional(&mut *tx)
                .await?;

        match existing {
            Some(row) if row.state == job_state::FAILED => {
                sqlx::query("DELETE FROM jobs WHERE job_id = $1")
                    .bind(&job.job_id)
                    .execute(&mut *tx)
                    .await?;
            }
            Some(_) => {
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
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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

        // SKIP LOCKED keeps concurrent workers from blocking on the same row.
        let job = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE state = 'queued' \
             ORDER BY created_at ASC, job_id ASC LIMIT 1 FOR UPDATE SKIP LOCKED",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut job) = job else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE jobs SET state = 'active', attempts = attempts + 1, updated_at = $1 \
             WHERE job_id = $2",
        )
        .bind(now)
        .bind(&job.job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

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
        sqlx::query("UPDATE jobs SET progress = $1, updated_at = $2 WHERE job_id = $3")
            .bind(progress.clamp(0.0, 100.0))
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn complete_job(&self, job_id: &str) -> CatalogResult<()> {
        sqlx::query("DELETE FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail_job(&self, job_id: &str, error: &str, now: OffsetDateTime) -> CatalogResult<()> {
        sqlx::query(
            "UPDATE jobs SET state = 'failed', error = $1, updated_at = $2 WHERE job_id = $3",
        )
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
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn requeue_active_jobs(&self, now: OffsetDateTime) -> CatalogResult<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'queued', updated_at = $1 WHERE state = 'active'",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
