//! Local mirror storage: an object-safe [`MirrorStore`] trait with an
//! in-memory implementation (tests, credential-less dev) and a Postgres
//! implementation (sqlx, runtime-checked queries).
//!
//! All writes are either idempotent upserts (jobs) or existence-checked
//! inserts (executions), so overlapping syncs produce no duplicates.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cronwatch_core::{
    Execution, ExecutionStatus, Job, JobCategory, JobPriority, JobStatus, Schedule, TriggerKind,
};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

pub const CRATE_NAME: &str = "cronwatch-store";

pub const DEFAULT_MAX_RETRIES: i32 = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("corrupt stored row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Mirrored fields for one external job, produced by the sync layer. The
/// upsert keyed on `external_id` overwrites exactly these fields and leaves
/// local-only fields (retries, tags, description) untouched on update.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDraft {
    pub external_id: i64,
    pub title: String,
    pub url: String,
    pub enabled: bool,
    pub timezone: String,
    pub schedule: Schedule,
    pub category: JobCategory,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub last_execution: Option<DateTime<Utc>>,
    pub next_execution: Option<DateTime<Utc>>,
    pub source: String,
}

/// Partial local update applied by the operations layer after the external
/// call succeeded. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPatch {
    pub title: Option<String>,
    pub url: Option<String>,
    pub enabled: Option<bool>,
    pub timezone: Option<String>,
    pub schedule: Option<Schedule>,
    pub category: Option<JobCategory>,
    pub priority: Option<JobPriority>,
    pub status: Option<JobStatus>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub max_retries: Option<i32>,
}

/// Equality predicates composed as an AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFilter {
    pub category: Option<JobCategory>,
    pub status: Option<JobStatus>,
    pub created_by: Option<String>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.category.map_or(true, |c| job.category == c)
            && self.status.map_or(true, |s| job.status == s)
            && self
                .created_by
                .as_deref()
                .map_or(true, |c| job.created_by.as_deref() == Some(c))
    }
}

/// Read-only aggregates over the local mirror.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MirrorStatistics {
    pub total_jobs: i64,
    pub active_jobs: i64,
    pub paused_jobs: i64,
    pub error_jobs: i64,
    pub total_executions: i64,
    pub successful_executions: i64,
    pub failed_executions: i64,
    pub jobs_by_category: BTreeMap<String, i64>,
}

impl MirrorStatistics {
    /// `None` when no executions exist; callers must not divide by zero.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_executions == 0 {
            return None;
        }
        Some(self.successful_executions as f64 / self.total_executions as f64)
    }
}

#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Explicit one-time schema bootstrap; a no-op for the memory store.
    async fn init_schema(&self) -> Result<(), StoreError>;

    /// Idempotent upsert keyed by `external_id`.
    async fn upsert_job(&self, draft: JobDraft) -> Result<Job, StoreError>;
    async fn job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;
    async fn jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError>;
    async fn apply_patch(&self, id: Uuid, patch: &JobPatch) -> Result<Option<Job>, StoreError>;
    /// Deletes the job and its executions; returns false when the id is unknown.
    async fn delete_job(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn set_last_execution(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Inserts only when no execution with the same
    /// (external_job_id, execution_id) composite exists; returns whether a
    /// row was written.
    async fn insert_execution_if_absent(&self, execution: Execution) -> Result<bool, StoreError>;
    async fn insert_execution(&self, execution: Execution) -> Result<(), StoreError>;
    async fn set_execution_status(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        error_message: Option<String>,
        error_code: Option<i32>,
    ) -> Result<(), StoreError>;
    async fn executions_for_job(&self, job_id: Uuid, limit: usize) -> Result<Vec<Execution>, StoreError>;
    async fn executions(&self, limit: usize) -> Result<Vec<Execution>, StoreError>;

    async fn statistics(&self) -> Result<MirrorStatistics, StoreError>;
}

/// Store selection is a single code path with a defined precedence:
/// `DATABASE_URL` set means Postgres, otherwise the in-memory store.
pub async fn store_from_env() -> anyhow::Result<Arc<dyn MirrorStore>> {
    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => {
            let store = PgStore::connect(&url).await?;
            store.init_schema().await?;
            Ok(Arc::new(store))
        }
        _ => {
            warn!("DATABASE_URL not set; using in-memory mirror store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn job_from_draft(draft: JobDraft, now: DateTime<Utc>) -> Job {
    Job {
        id: Uuid::new_v4(),
        external_id: Some(draft.external_id),
        title: draft.title,
        url: draft.url,
        enabled: draft.enabled,
        timezone: draft.timezone,
        schedule: draft.schedule,
        category: draft.category,
        priority: draft.priority,
        status: draft.status,
        last_execution: draft.last_execution,
        next_execution: draft.next_execution,
        retry_count: 0,
        max_retries: DEFAULT_MAX_RETRIES,
        description: None,
        tags: Vec::new(),
        source: draft.source,
        created_by: None,
        created_at: now,
        updated_at: now,
    }
}

fn overwrite_mirrored_fields(job: &mut Job, draft: JobDraft, now: DateTime<Utc>) {
    job.title = draft.title;
    job.url = draft.url;
    job.enabled = draft.enabled;
    job.timezone = draft.timezone;
    job.schedule = draft.schedule;
    job.category = draft.category;
    job.priority = draft.priority;
    job.status = draft.status;
    job.last_execution = draft.last_execution;
    job.next_execution = draft.next_execution;
    job.source = draft.source;
    job.updated_at = now;
}

fn patch_job(job: &mut Job, patch: &JobPatch, now: DateTime<Utc>) {
    if let Some(title) = &patch.title {
        job.title = title.clone();
    }
    if let Some(url) = &patch.url {
        job.url = url.clone();
    }
    if let Some(enabled) = patch.enabled {
        job.enabled = enabled;
    }
    if let Some(timezone) = &patch.timezone {
        job.timezone = timezone.clone();
    }
    if let Some(schedule) = &patch.schedule {
        job.schedule = schedule.clone();
    }
    if let Some(category) = patch.category {
        job.category = category;
    }
    if let Some(priority) = patch.priority {
        job.priority = priority;
    }
    if let Some(status) = patch.status {
        job.status = status;
    }
    if let Some(description) = &patch.description {
        job.description = Some(description.clone());
    }
    if let Some(tags) = &patch.tags {
        job.tags = tags.clone();
    }
    if let Some(max_retries) = patch.max_retries {
        job.max_retries = max_retries;
    }
    job.updated_at = now;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
    executions: RwLock<Vec<Execution>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MirrorStore for MemoryStore {
    async fn init_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_job(&self, draft: JobDraft) -> Result<Job, StoreError> {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        if let Some(existing) = jobs
            .values_mut()
            .find(|j| j.external_id == Some(draft.external_id))
        {
            overwrite_mirrored_fields(existing, draft, now);
            return Ok(existing.clone());
        }
        let job = job_from_draft(draft, now);
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let mut out: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn apply_patch(&self, id: Uuid, patch: &JobPatch) -> Result<Option<Job>, StoreError> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(None);
        };
        patch_job(job, patch, Utc::now());
        Ok(Some(job.clone()))
    }

    async fn delete_job(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = self.jobs.write().await.remove(&id).is_some();
        if removed {
            self.executions.write().await.retain(|e| e.job_id != id);
        }
        Ok(removed)
    }

    async fn set_last_execution(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(job) = self.jobs.write().await.get_mut(&id) {
            job.last_execution = Some(at);
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_execution_if_absent(&self, execution: Execution) -> Result<bool, StoreError> {
        let mut executions = self.executions.write().await;
        let exists = executions.iter().any(|e| {
            e.external_job_id == execution.external_job_id && e.execution_id == execution.execution_id
        });
        if exists {
            return Ok(false);
        }
        executions.push(execution);
        Ok(true)
    }

    async fn insert_execution(&self, execution: Execution) -> Result<(), StoreError> {
        let inserted = self.insert_execution_if_absent(execution).await?;
        if !inserted {
            return Err(StoreError::Database(
                "execution identity already present".to_string(),
            ));
        }
        Ok(())
    }

    async fn set_execution_status(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        error_message: Option<String>,
        error_code: Option<i32>,
    ) -> Result<(), StoreError> {
        let mut executions = self.executions.write().await;
        if let Some(execution) = executions.iter_mut().find(|e| e.id == id) {
            execution.status = status;
            if status.is_terminal() {
                execution.end_time = Some(Utc::now());
            }
            if error_message.is_some() {
                execution.error_message = error_message;
            }
            if error_code.is_some() {
                execution.error_code = error_code;
            }
        }
        Ok(())
    }

    async fn executions_for_job(&self, job_id: Uuid, limit: usize) -> Result<Vec<Execution>, StoreError> {
        let mut out: Vec<Execution> = self
            .executions
            .read()
            .await
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        out.truncate(limit);
        Ok(out)
    }

    async fn executions(&self, limit: usize) -> Result<Vec<Execution>, StoreError> {
        let mut out: Vec<Execution> = self.executions.read().await.clone();
        out.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        out.truncate(limit);
        Ok(out)
    }

    async fn statistics(&self) -> Result<MirrorStatistics, StoreError> {
        let jobs = self.jobs.read().await;
        let executions = self.executions.read().await;

        let mut stats = MirrorStatistics {
            total_jobs: jobs.len() as i64,
            total_executions: executions.len() as i64,
            ..Default::default()
        };
        for job in jobs.values() {
            match job.status {
                JobStatus::Active => stats.active_jobs += 1,
                JobStatus::Paused => stats.paused_jobs += 1,
                JobStatus::Error => stats.error_jobs += 1,
                JobStatus::Disabled => {}
            }
            *stats
                .jobs_by_category
                .entry(job.category.as_str().to_string())
                .or_default() += 1;
        }
        for execution in executions.iter() {
            match execution.status {
                ExecutionStatus::Success => stats.successful_executions += 1,
                ExecutionStatus::Failed | ExecutionStatus::Timeout => stats.failed_executions += 1,
                ExecutionStatus::Pending | ExecutionStatus::Running => {}
            }
        }
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// Postgres store
// ---------------------------------------------------------------------------

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id UUID PRIMARY KEY,
    external_id BIGINT UNIQUE,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    enabled BOOLEAN NOT NULL,
    timezone TEXT NOT NULL,
    schedule JSONB NOT NULL,
    category TEXT NOT NULL,
    priority TEXT NOT NULL,
    status TEXT NOT NULL,
    last_execution TIMESTAMPTZ,
    next_execution TIMESTAMPTZ,
    retry_count INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER NOT NULL DEFAULT 3,
    description TEXT,
    tags JSONB NOT NULL DEFAULT '[]'::jsonb,
    source TEXT NOT NULL,
    created_by TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS executions (
    id UUID PRIMARY KEY,
    job_id UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    external_job_id BIGINT NOT NULL,
    execution_id TEXT NOT NULL,
    status TEXT NOT NULL,
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ,
    duration_ms BIGINT,
    http_status INTEGER,
    response_body TEXT,
    response_size BIGINT,
    error_message TEXT,
    error_code INTEGER,
    retry_attempt INTEGER NOT NULL DEFAULT 0,
    triggered_by TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    UNIQUE (external_job_id, execution_id)
);

CREATE INDEX IF NOT EXISTS idx_executions_job_start
    ON executions (job_id, start_time DESC);
"#;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<Job, StoreError> {
        let category: String = row.try_get("category")?;
        let priority: String = row.try_get("priority")?;
        let status: String = row.try_get("status")?;
        let schedule: serde_json::Value = row.try_get("schedule")?;
        let tags: serde_json::Value = row.try_get("tags")?;

        Ok(Job {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            title: row.try_get("title")?,
            url: row.try_get("url")?,
            enabled: row.try_get("enabled")?,
            timezone: row.try_get("timezone")?,
            schedule: serde_json::from_value(schedule)
                .map_err(|e| StoreError::Corrupt(format!("schedule: {e}")))?,
            category: JobCategory::parse(&category)
                .ok_or_else(|| StoreError::Corrupt(format!("category: {category}")))?,
            priority: JobPriority::parse(&priority)
                .ok_or_else(|| StoreError::Corrupt(format!("priority: {priority}")))?,
            status: JobStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("status: {status}")))?,
            last_execution: row.try_get("last_execution")?,
            next_execution: row.try_get("next_execution")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            description: row.try_get("description")?,
            tags: serde_json::from_value(tags)
                .map_err(|e| StoreError::Corrupt(format!("tags: {e}")))?,
            source: row.try_get("source")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn execution_from_row(row: &sqlx::postgres::PgRow) -> Result<Execution, StoreError> {
        let status: String = row.try_get("status")?;
        let triggered_by: String = row.try_get("triggered_by")?;
        Ok(Execution {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            external_job_id: row.try_get("external_job_id")?,
            execution_id: row.try_get("execution_id")?,
            status: ExecutionStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("execution status: {status}")))?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            duration_ms: row.try_get("duration_ms")?,
            http_status: row.try_get("http_status")?,
            response_body: row.try_get("response_body")?,
            response_size: row.try_get("response_size")?,
            error_message: row.try_get("error_message")?,
            error_code: row.try_get("error_code")?,
            retry_attempt: row.try_get("retry_attempt")?,
            triggered_by: TriggerKind::parse(&triggered_by)
                .ok_or_else(|| StoreError::Corrupt(format!("triggered_by: {triggered_by}")))?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn fetch_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::job_from_row(&r)).transpose()
    }
}

#[async_trait]
impl MirrorStore for PgStore {
    async fn init_schema(&self) -> Result<(), StoreError> {
        // CREATE TABLE IF NOT EXISTS statements must run one at a time.
        for statement in SCHEMA_SQL.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn upsert_job(&self, draft: JobDraft) -> Result<Job, StoreError> {
        let now = Utc::now();
        let template = job_from_draft(draft, now);
        let schedule = serde_json::to_value(&template.schedule)
            .map_err(|e| StoreError::Corrupt(format!("schedule: {e}")))?;

        let row = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, external_id, title, url, enabled, timezone, schedule,
                category, priority, status, last_execution, next_execution,
                retry_count, max_retries, description, tags, source,
                created_by, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, '[]'::jsonb, $16, $17, $18, $18
            )
            ON CONFLICT (external_id) DO UPDATE SET
                title = EXCLUDED.title,
                url = EXCLUDED.url,
                enabled = EXCLUDED.enabled,
                timezone = EXCLUDED.timezone,
                schedule = EXCLUDED.schedule,
                category = EXCLUDED.category,
                priority = EXCLUDED.priority,
                status = EXCLUDED.status,
                last_execution = EXCLUDED.last_execution,
                next_execution = EXCLUDED.next_execution,
                source = EXCLUDED.source,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(template.id)
        .bind(template.external_id)
        .bind(&template.title)
        .bind(&template.url)
        .bind(template.enabled)
        .bind(&template.timezone)
        .bind(schedule)
        .bind(template.category.as_str())
        .bind(template.priority.as_str())
        .bind(template.status.as_str())
        .bind(template.last_execution)
        .bind(template.next_execution)
        .bind(template.retry_count)
        .bind(template.max_retries)
        .bind(&template.description)
        .bind(&template.source)
        .bind(&template.created_by)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Self::job_from_row(&row)
    }

    async fn job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        self.fetch_job(id).await
    }

    async fn jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM jobs
             WHERE ($1::text IS NULL OR category = $1)
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR created_by = $3)
             ORDER BY updated_at DESC, id
            "#,
        )
        .bind(filter.category.map(|c| c.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.created_by.as_deref())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::job_from_row).collect()
    }

    async fn apply_patch(&self, id: Uuid, patch: &JobPatch) -> Result<Option<Job>, StoreError> {
        // Read-modify-write keeps the patch semantics identical to the memory
        // store; the mirror runs one sync at a time so this is not contended.
        let Some(mut job) = self.fetch_job(id).await? else {
            return Ok(None);
        };
        patch_job(&mut job, patch, Utc::now());

        let schedule = serde_json::to_value(&job.schedule)
            .map_err(|e| StoreError::Corrupt(format!("schedule: {e}")))?;
        let tags = serde_json::to_value(&job.tags)
            .map_err(|e| StoreError::Corrupt(format!("tags: {e}")))?;

        sqlx::query(
            r#"
            UPDATE jobs SET
                title = $2, url = $3, enabled = $4, timezone = $5,
                schedule = $6, category = $7, priority = $8, status = $9,
                description = $10, tags = $11, max_retries = $12, updated_at = $13
             WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(&job.title)
        .bind(&job.url)
        .bind(job.enabled)
        .bind(&job.timezone)
        .bind(schedule)
        .bind(job.category.as_str())
        .bind(job.priority.as_str())
        .bind(job.status.as_str())
        .bind(&job.description)
        .bind(tags)
        .bind(job.max_retries)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(Some(job))
    }

    async fn delete_job(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_last_execution(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE jobs SET last_execution = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_execution_if_absent(&self, execution: Execution) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO executions (
                id, job_id, external_job_id, execution_id, status, start_time,
                end_time, duration_ms, http_status, response_body, response_size,
                error_message, error_code, retry_attempt, triggered_by, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (external_job_id, execution_id) DO NOTHING
            "#,
        )
        .bind(execution.id)
        .bind(execution.job_id)
        .bind(execution.external_job_id)
        .bind(&execution.execution_id)
        .bind(execution.status.as_str())
        .bind(execution.start_time)
        .bind(execution.end_time)
        .bind(execution.duration_ms)
        .bind(execution.http_status)
        .bind(&execution.response_body)
        .bind(execution.response_size)
        .bind(&execution.error_message)
        .bind(execution.error_code)
        .bind(execution.retry_attempt)
        .bind(execution.triggered_by.as_str())
        .bind(execution.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_execution(&self, execution: Execution) -> Result<(), StoreError> {
        let inserted = self.insert_execution_if_absent(execution).await?;
        if !inserted {
            return Err(StoreError::Database(
                "execution identity already present".to_string(),
            ));
        }
        Ok(())
    }

    async fn set_execution_status(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        error_message: Option<String>,
        error_code: Option<i32>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE executions SET
                status = $2,
                end_time = CASE WHEN $3 THEN NOW() ELSE end_time END,
                error_message = COALESCE($4, error_message),
                error_code = COALESCE($5, error_code)
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(status.is_terminal())
        .bind(error_message)
        .bind(error_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn executions_for_job(&self, job_id: Uuid, limit: usize) -> Result<Vec<Execution>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM executions WHERE job_id = $1 ORDER BY start_time DESC LIMIT $2",
        )
        .bind(job_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::execution_from_row).collect()
    }

    async fn executions(&self, limit: usize) -> Result<Vec<Execution>, StoreError> {
        let rows = sqlx::query("SELECT * FROM executions ORDER BY start_time DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::execution_from_row).collect()
    }

    async fn statistics(&self) -> Result<MirrorStatistics, StoreError> {
        let job_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'active') AS active,
                   COUNT(*) FILTER (WHERE status = 'paused') AS paused,
                   COUNT(*) FILTER (WHERE status = 'error') AS error
              FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let execution_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'success') AS successful,
                   COUNT(*) FILTER (WHERE status IN ('failed', 'timeout')) AS failed
              FROM executions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let category_rows = sqlx::query("SELECT category, COUNT(*) AS n FROM jobs GROUP BY category")
            .fetch_all(&self.pool)
            .await?;

        let mut jobs_by_category = BTreeMap::new();
        for row in &category_rows {
            let category: String = row.try_get("category")?;
            let n: i64 = row.try_get("n")?;
            jobs_by_category.insert(category, n);
        }

        Ok(MirrorStatistics {
            total_jobs: job_row.try_get("total")?,
            active_jobs: job_row.try_get("active")?,
            paused_jobs: job_row.try_get("paused")?,
            error_jobs: job_row.try_get("error")?,
            total_executions: execution_row.try_get("total")?,
            successful_executions: execution_row.try_get("successful")?,
            failed_executions: execution_row.try_get("failed")?,
            jobs_by_category,
        })
    }
}
