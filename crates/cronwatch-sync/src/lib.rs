//! Reconciliation engine: mirrors the external scheduler account into the
//! local store ([`SyncEngine`]) and provides the local CRUD / run-now
//! operations layered on top of it ([`JobService`]).
//!
//! This crate never schedules anything itself; all scheduling authority lives
//! in the external service and the mirror is refreshed on demand.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cronwatch_client::{
    ApiError, ClientConfig, ExternalJob, ExternalJobPatch, ExternalSchedule, SchedulerApi,
};
use cronwatch_core::{
    execution_status_from_code, infer_category_priority, Execution, ExecutionStatus, Job,
    JobStatus, Schedule, TriggerKind,
};
use cronwatch_store::{
    JobDraft, JobFilter, JobPatch, MirrorStatistics, MirrorStore, StoreError,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "cronwatch-sync";

/// Provenance tag stamped on every mirrored job.
pub const MIRROR_SOURCE: &str = "cron-job.org";

/// Error taxonomy for every public operation. No panic crosses this boundary;
/// callers receive these as values.
#[derive(Debug, Error)]
pub enum OpsError {
    /// Non-2xx or transport failure from the external scheduler.
    #[error(transparent)]
    External(#[from] ApiError),
    #[error("not found: {0}")]
    NotFound(String),
    /// Job authorship is confined to the external service's own dashboard;
    /// this rejection is permanent, not retryable.
    #[error("job creation is not supported; author jobs in the external scheduler dashboard")]
    Unsupported,
    /// The operation needs an external identity the job does not have yet.
    #[error("job {0} is not linked to an external job")]
    NotMirrored(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_key: String,
    pub api_base: String,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("CRONWATCH_API_KEY").unwrap_or_default(),
            api_base: std::env::var("CRONWATCH_API_BASE")
                .unwrap_or_else(|_| cronwatch_client::DEFAULT_BASE_URL.to_string()),
            http_timeout_secs: std::env::var("CRONWATCH_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            user_agent: std::env::var("CRONWATCH_USER_AGENT")
                .unwrap_or_else(|_| "cronwatch/0.1".to_string()),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_key: self.api_key.clone(),
            base_url: self.api_base.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub jobs_synced: usize,
    pub executions_synced: usize,
    /// Jobs whose history fetch failed; their job rows were still mirrored.
    pub history_failures: usize,
}

/// Pull-based mirror of the external account. Overlapping invocations are not
/// serialized: the upsert and existence-checked-insert invariants make a
/// double-run produce benign duplicate writes, not duplicate rows.
pub struct SyncEngine {
    api: Arc<dyn SchedulerApi>,
    store: Arc<dyn MirrorStore>,
}

impl SyncEngine {
    pub fn new(api: Arc<dyn SchedulerApi>, store: Arc<dyn MirrorStore>) -> Self {
        Self { api, store }
    }

    /// Mirrors every external job, then reconciles each job's execution
    /// history sequentially. A failed history fetch for one job is logged and
    /// skipped; only a failed job-list fetch aborts the whole sync.
    pub async fn sync_jobs(&self) -> Result<SyncSummary, OpsError> {
        let started_at = Utc::now();
        let external_jobs = self.api.list_jobs().await?;

        let mut jobs_synced = 0usize;
        let mut executions_synced = 0usize;
        let mut history_failures = 0usize;

        for external in &external_jobs {
            let job = self.store.upsert_job(draft_from_external(external)).await?;
            jobs_synced += 1;

            match self.api.job_history(external.job_id).await {
                Ok(entries) => {
                    executions_synced += self.reconcile_history(&job, external.job_id, entries).await?;
                }
                Err(err) => {
                    warn!(
                        external_id = external.job_id,
                        code = err.code,
                        error = %err.message,
                        "history fetch failed; skipping job's executions"
                    );
                    history_failures += 1;
                }
            }
        }

        let summary = SyncSummary {
            started_at,
            finished_at: Utc::now(),
            jobs_synced,
            executions_synced,
            history_failures,
        };
        info!(
            jobs = summary.jobs_synced,
            executions = summary.executions_synced,
            failures = summary.history_failures,
            "sync complete"
        );
        Ok(summary)
    }

    async fn reconcile_history(
        &self,
        job: &Job,
        external_job_id: i64,
        entries: Vec<cronwatch_client::ExternalHistoryEntry>,
    ) -> Result<usize, OpsError> {
        let mut inserted = 0usize;
        for entry in entries {
            let execution_id = entry
                .identifier
                .clone()
                .unwrap_or_else(|| format!("{}-{}", external_job_id, entry.date));
            let Some(start_time) = DateTime::from_timestamp(entry.date, 0) else {
                warn!(external_id = external_job_id, epoch = entry.date, "unrepresentable history timestamp");
                continue;
            };

            let execution = Execution::from_history(
                job.id,
                external_job_id,
                execution_id,
                execution_status_from_code(entry.status),
                start_time,
                entry.duration,
                entry.http_status,
                entry.body.as_deref(),
            );
            if self.store.insert_execution_if_absent(execution).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

fn epoch_opt(epoch: Option<i64>) -> Option<DateTime<Utc>> {
    epoch.filter(|e| *e > 0).and_then(|e| DateTime::from_timestamp(e, 0))
}

fn draft_from_external(external: &ExternalJob) -> JobDraft {
    let (category, priority) = infer_category_priority(&external.title, &external.url);
    JobDraft {
        external_id: external.job_id,
        title: external.title.clone(),
        url: external.url.clone(),
        enabled: external.enabled,
        timezone: external.schedule.timezone.clone(),
        schedule: Schedule {
            hours: external.schedule.hours.clone(),
            minutes: external.schedule.minutes.clone(),
            mdays: external.schedule.mdays.clone(),
            months: external.schedule.months.clone(),
            wdays: external.schedule.wdays.clone(),
        },
        category,
        priority,
        status: if external.enabled {
            JobStatus::Active
        } else {
            JobStatus::Paused
        },
        last_execution: epoch_opt(external.last_execution),
        next_execution: epoch_opt(external.next_execution),
        source: MIRROR_SOURCE.to_string(),
    }
}

fn external_patch(job: &Job, patch: &JobPatch) -> ExternalJobPatch {
    ExternalJobPatch {
        title: patch.title.clone(),
        url: patch.url.clone(),
        enabled: patch.enabled,
        schedule: patch.schedule.as_ref().map(|s| ExternalSchedule {
            timezone: patch
                .timezone
                .clone()
                .unwrap_or_else(|| job.timezone.clone()),
            hours: s.hours.clone(),
            minutes: s.minutes.clone(),
            mdays: s.mdays.clone(),
            months: s.months.clone(),
            wdays: s.wdays.clone(),
        }),
    }
}

/// Local CRUD + run-now operations. Mutating actions call the external
/// service first and only then touch the local mirror, so a rejected external
/// update never leaves local drift.
pub struct JobService {
    api: Arc<dyn SchedulerApi>,
    store: Arc<dyn MirrorStore>,
}

impl JobService {
    pub fn new(api: Arc<dyn SchedulerApi>, store: Arc<dyn MirrorStore>) -> Self {
        Self { api, store }
    }

    pub async fn get_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, OpsError> {
        Ok(self.store.jobs(filter).await?)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Job, OpsError> {
        self.store
            .job(id)
            .await?
            .ok_or_else(|| OpsError::NotFound(format!("job {id}")))
    }

    /// Pushes the update externally first (when the job is linked), then
    /// applies the same patch locally. An external rejection aborts the whole
    /// operation.
    pub async fn update_job(&self, id: Uuid, patch: JobPatch) -> Result<Job, OpsError> {
        let job = self.get_job(id).await?;

        if let Some(external_id) = job.external_id {
            let remote = external_patch(&job, &patch);
            if !remote.is_empty() {
                self.api.update_job(external_id, &remote).await?;
            }
        }

        self.store
            .apply_patch(id, &patch)
            .await?
            .ok_or_else(|| OpsError::NotFound(format!("job {id}")))
    }

    /// External deletion is attempted but non-fatal: the mirror's purpose is
    /// local bookkeeping, and an orphaned external job is picked up again by
    /// the next sync.
    pub async fn delete_job(&self, id: Uuid) -> Result<(), OpsError> {
        let job = self.get_job(id).await?;

        if let Some(external_id) = job.external_id {
            if let Err(err) = self.api.delete_job(external_id).await {
                warn!(
                    external_id,
                    code = err.code,
                    error = %err.message,
                    "external delete failed; removing local mirror anyway"
                );
            }
        }

        self.store.delete_job(id).await?;
        Ok(())
    }

    /// Always rejected. The external dashboard is the system of record for
    /// job authorship; accepting creations here would make two sources of
    /// truth for scheduling semantics.
    pub async fn create_job(&self, _payload: serde_json::Value) -> Result<Job, OpsError> {
        Err(OpsError::Unsupported)
    }

    /// Records a pending execution, asks the external service to run the job
    /// now, and transitions the record to running (or failed). Completion is
    /// only observed by the next sync's history reconciliation.
    pub async fn execute_job(&self, id: Uuid, triggered_by: TriggerKind) -> Result<Execution, OpsError> {
        let job = self.get_job(id).await?;
        let external_id = job.external_id.ok_or(OpsError::NotMirrored(id))?;

        let mut execution = Execution::manual(job.id, external_id, triggered_by);
        self.store.insert_execution(execution.clone()).await?;

        match self.api.run_job(external_id).await {
            Ok(()) => {
                self.store
                    .set_execution_status(execution.id, ExecutionStatus::Running, None, None)
                    .await?;
                self.store
                    .set_last_execution(job.id, execution.start_time)
                    .await?;
                execution.status = ExecutionStatus::Running;
                Ok(execution)
            }
            Err(err) => {
                self.store
                    .set_execution_status(
                        execution.id,
                        ExecutionStatus::Failed,
                        Some(err.message.clone()),
                        Some(err.code as i32),
                    )
                    .await?;
                Err(OpsError::External(err))
            }
        }
    }

    pub async fn job_history(&self, id: Uuid, limit: usize) -> Result<Vec<Execution>, OpsError> {
        // Resolve first so an unknown id reports NotFound, not an empty list.
        let job = self.get_job(id).await?;
        Ok(self.store.executions_for_job(job.id, limit).await?)
    }

    pub async fn all_executions(&self, limit: usize) -> Result<Vec<Execution>, OpsError> {
        Ok(self.store.executions(limit).await?)
    }

    pub async fn statistics(&self) -> Result<MirrorStatistics, OpsError> {
        Ok(self.store.statistics().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cronwatch_client::ExternalHistoryEntry;
    use cronwatch_core::{JobCategory, JobPriority};
    use cronwatch_store::MemoryStore;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockScheduler {
        jobs: Vec<ExternalJob>,
        history: HashMap<i64, Vec<ExternalHistoryEntry>>,
        fail_list: bool,
        fail_history_for: Option<i64>,
        fail_update: bool,
        fail_delete: bool,
        fail_run: bool,
        calls: Mutex<Vec<String>>,
    }

    impl MockScheduler {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SchedulerApi for MockScheduler {
        async fn list_jobs(&self) -> Result<Vec<ExternalJob>, ApiError> {
            self.record("list");
            if self.fail_list {
                return Err(ApiError::http(503, "listing unavailable"));
            }
            Ok(self.jobs.clone())
        }

        async fn job_history(&self, external_id: i64) -> Result<Vec<ExternalHistoryEntry>, ApiError> {
            self.record(format!("history:{external_id}"));
            if self.fail_history_for == Some(external_id) {
                return Err(ApiError::transport("connection reset"));
            }
            Ok(self.history.get(&external_id).cloned().unwrap_or_default())
        }

        async fn update_job(&self, external_id: i64, _patch: &ExternalJobPatch) -> Result<(), ApiError> {
            self.record(format!("update:{external_id}"));
            if self.fail_update {
                return Err(ApiError::http(400, "rejected"));
            }
            Ok(())
        }

        async fn delete_job(&self, external_id: i64) -> Result<(), ApiError> {
            self.record(format!("delete:{external_id}"));
            if self.fail_delete {
                return Err(ApiError::transport("timed out"));
            }
            Ok(())
        }

        async fn run_job(&self, external_id: i64) -> Result<(), ApiError> {
            self.record(format!("run:{external_id}"));
            if self.fail_run {
                return Err(ApiError::http(403, "forbidden"));
            }
            Ok(())
        }
    }

    fn external_job(job_id: i64, title: &str, enabled: bool) -> ExternalJob {
        ExternalJob {
            job_id,
            title: title.to_string(),
            url: format!("https://blog.example.com/hooks/{job_id}"),
            enabled,
            schedule: ExternalSchedule::default(),
            last_execution: Some(1_700_000_000),
            next_execution: Some(1_700_086_400),
        }
    }

    fn history_entry(identifier: &str, date: i64, status: i64) -> ExternalHistoryEntry {
        ExternalHistoryEntry {
            identifier: Some(identifier.to_string()),
            date,
            duration: 1500,
            status,
            http_status: Some(200),
            body: None,
        }
    }

    fn engine_with(mock: MockScheduler) -> (Arc<MockScheduler>, Arc<MemoryStore>, SyncEngine, JobService) {
        let api = Arc::new(mock);
        let store = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(api.clone(), store.clone());
        let service = JobService::new(api.clone(), store.clone());
        (api, store, engine, service)
    }

    #[tokio::test]
    async fn sync_mirrors_jobs_and_history() {
        let mut mock = MockScheduler::default();
        mock.jobs = vec![external_job(42, "Content Generation - daily", true)];
        mock.history
            .insert(42, vec![history_entry("e1", 1_700_000_000, 1)]);
        let (_, _, engine, service) = engine_with(mock);

        let summary = engine.sync_jobs().await.unwrap();
        assert_eq!(summary.jobs_synced, 1);
        assert_eq!(summary.executions_synced, 1);
        assert_eq!(summary.history_failures, 0);

        let jobs = service.get_jobs(&JobFilter::default()).await.unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.external_id, Some(42));
        assert_eq!(job.category, JobCategory::Content);
        assert_eq!(job.priority, JobPriority::Medium);
        assert_eq!(job.status, JobStatus::Active);

        let executions = service.job_history(job.id, 10).await.unwrap();
        assert_eq!(executions.len(), 1);
        let execution = &executions[0];
        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.duration_ms, Some(1500));
        assert_eq!(execution.start_time.timestamp(), 1_700_000_000);
        assert_eq!(
            execution.end_time.unwrap() - execution.start_time,
            chrono::Duration::milliseconds(1500)
        );
    }

    #[tokio::test]
    async fn sync_twice_is_idempotent() {
        let mut mock = MockScheduler::default();
        mock.jobs = vec![
            external_job(1, "content gen", true),
            external_job(2, "nightly backup", false),
        ];
        mock.history.insert(1, vec![history_entry("e1", 1_700_000_000, 1)]);
        mock.history.insert(2, vec![history_entry("e2", 1_700_000_100, 0)]);
        let (_, _, engine, service) = engine_with(mock);

        let first = engine.sync_jobs().await.unwrap();
        let second = engine.sync_jobs().await.unwrap();

        assert_eq!(first.jobs_synced, 2);
        assert_eq!(first.executions_synced, 2);
        assert_eq!(second.jobs_synced, 2);
        assert_eq!(second.executions_synced, 0);

        let jobs = service.get_jobs(&JobFilter::default()).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(service.all_executions(100).await.unwrap().len(), 2);

        let paused = jobs.iter().find(|j| j.external_id == Some(2)).unwrap();
        assert_eq!(paused.status, JobStatus::Paused);
    }

    #[tokio::test]
    async fn sync_aborts_when_job_list_fails() {
        let mock = MockScheduler {
            fail_list: true,
            ..Default::default()
        };
        let (_, store, engine, _) = engine_with(mock);

        let err = engine.sync_jobs().await.unwrap_err();
        match err {
            OpsError::External(api) => assert_eq!(api.code, 503),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.jobs(&JobFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_failure_for_one_job_does_not_abort_others() {
        let mut mock = MockScheduler::default();
        mock.jobs = vec![
            external_job(1, "job a", true),
            external_job(2, "job b", true),
            external_job(3, "job c", true),
        ];
        mock.history.insert(1, vec![history_entry("a1", 1_700_000_000, 1)]);
        mock.history.insert(3, vec![history_entry("c1", 1_700_000_200, 1)]);
        mock.fail_history_for = Some(2);
        let (_, _, engine, service) = engine_with(mock);

        let summary = engine.sync_jobs().await.unwrap();
        assert_eq!(summary.jobs_synced, 3);
        assert_eq!(summary.executions_synced, 2);
        assert_eq!(summary.history_failures, 1);

        // The failed job's row is still mirrored.
        assert_eq!(service.get_jobs(&JobFilter::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn history_without_identifier_gets_synthesized_identity() {
        let mut mock = MockScheduler::default();
        mock.jobs = vec![external_job(7, "job", true)];
        mock.history.insert(
            7,
            vec![ExternalHistoryEntry {
                identifier: None,
                date: 1_700_000_000,
                duration: 100,
                status: 1,
                http_status: Some(200),
                body: None,
            }],
        );
        let (_, _, engine, service) = engine_with(mock);

        engine.sync_jobs().await.unwrap();
        engine.sync_jobs().await.unwrap();

        let executions = service.all_executions(10).await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].execution_id, "7-1700000000");
    }

    #[tokio::test]
    async fn unknown_status_codes_map_to_failed() {
        let mut mock = MockScheduler::default();
        mock.jobs = vec![external_job(7, "job", true)];
        mock.history.insert(
            7,
            vec![
                history_entry("e1", 1_700_000_000, 99),
                history_entry("e2", 1_700_000_100, -1),
            ],
        );
        let (_, _, engine, service) = engine_with(mock);

        engine.sync_jobs().await.unwrap();
        let executions = service.all_executions(10).await.unwrap();
        let by_id = |id: &str| executions.iter().find(|e| e.execution_id == id).unwrap();
        assert_eq!(by_id("e1").status, ExecutionStatus::Failed);
        assert_eq!(by_id("e2").status, ExecutionStatus::Timeout);
        assert!(by_id("e2").error_message.is_some());
    }

    #[tokio::test]
    async fn create_job_is_always_rejected() {
        let (_, store, _, service) = engine_with(MockScheduler::default());
        let err = service
            .create_job(serde_json::json!({"title": "new job"}))
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Unsupported));
        assert!(store.jobs(&JobFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_pushes_external_before_local() {
        let mut mock = MockScheduler::default();
        mock.jobs = vec![external_job(42, "old title", true)];
        let (api, _, engine, service) = engine_with(mock);

        engine.sync_jobs().await.unwrap();
        let job = service.get_jobs(&JobFilter::default()).await.unwrap().remove(0);

        let updated = service
            .update_job(
                job.id,
                JobPatch {
                    title: Some("new title".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "new title");
        assert!(api.calls().contains(&"update:42".to_string()));
    }

    #[tokio::test]
    async fn rejected_external_update_leaves_local_untouched() {
        let mut mock = MockScheduler::default();
        mock.jobs = vec![external_job(42, "old title", true)];
        mock.fail_update = true;
        let (_, _, engine, service) = engine_with(mock);

        engine.sync_jobs().await.unwrap();
        let job = service.get_jobs(&JobFilter::default()).await.unwrap().remove(0);

        let err = service
            .update_job(
                job.id,
                JobPatch {
                    title: Some("new title".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::External(_)));

        let unchanged = service.get_job(job.id).await.unwrap();
        assert_eq!(unchanged.title, "old title");
    }

    #[tokio::test]
    async fn local_only_patch_skips_the_external_call() {
        let mut mock = MockScheduler::default();
        mock.jobs = vec![external_job(42, "job", true)];
        mock.fail_update = true;
        let (_, _, engine, service) = engine_with(mock);

        engine.sync_jobs().await.unwrap();
        let job = service.get_jobs(&JobFilter::default()).await.unwrap().remove(0);

        // Tags and description exist only locally; no external field changes,
        // so the failing external endpoint must not be called.
        let updated = service
            .update_job(
                job.id,
                JobPatch {
                    tags: Some(vec!["blog".to_string()]),
                    description: Some("mirrored from the blog dashboard".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.tags, vec!["blog".to_string()]);
    }

    #[tokio::test]
    async fn delete_proceeds_when_external_delete_fails() {
        let mut mock = MockScheduler::default();
        mock.jobs = vec![external_job(42, "job", true)];
        mock.fail_delete = true;
        let (api, store, engine, service) = engine_with(mock);

        engine.sync_jobs().await.unwrap();
        let job = service.get_jobs(&JobFilter::default()).await.unwrap().remove(0);

        service.delete_job(job.id).await.unwrap();
        assert!(api.calls().contains(&"delete:42".to_string()));
        assert!(store.jobs(&JobFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn execute_job_records_running_and_stamps_last_execution() {
        let mut mock = MockScheduler::default();
        mock.jobs = vec![external_job(42, "job", true)];
        let (_, _, engine, service) = engine_with(mock);

        engine.sync_jobs().await.unwrap();
        let job = service.get_jobs(&JobFilter::default()).await.unwrap().remove(0);

        let execution = service.execute_job(job.id, TriggerKind::Manual).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert_eq!(execution.triggered_by, TriggerKind::Manual);

        let job = service.get_job(job.id).await.unwrap();
        assert_eq!(job.last_execution, Some(execution.start_time));

        let stored = service.job_history(job.id, 10).await.unwrap();
        assert_eq!(stored[0].status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn failed_run_now_leaves_a_failed_execution() {
        let mut mock = MockScheduler::default();
        mock.jobs = vec![external_job(42, "job", true)];
        mock.fail_run = true;
        let (_, _, engine, service) = engine_with(mock);

        engine.sync_jobs().await.unwrap();
        let job = service.get_jobs(&JobFilter::default()).await.unwrap().remove(0);

        let err = service.execute_job(job.id, TriggerKind::Manual).await.unwrap_err();
        match err {
            OpsError::External(api) => assert_eq!(api.code, 403),
            other => panic!("unexpected error: {other:?}"),
        }

        let stored = service.job_history(job.id, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, ExecutionStatus::Failed);
        assert_eq!(stored[0].error_code, Some(403));
    }

    #[tokio::test]
    async fn unknown_job_ids_report_not_found() {
        let (_, _, _, service) = engine_with(MockScheduler::default());
        let missing = Uuid::new_v4();
        assert!(matches!(service.get_job(missing).await, Err(OpsError::NotFound(_))));
        assert!(matches!(
            service.job_history(missing, 10).await,
            Err(OpsError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_job(missing).await,
            Err(OpsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn statistics_reflect_the_mirror() {
        let mut mock = MockScheduler::default();
        mock.jobs = vec![
            external_job(1, "content gen", true),
            external_job(2, "nightly backup", false),
        ];
        mock.history.insert(1, vec![history_entry("e1", 1_700_000_000, 1)]);
        mock.history.insert(2, vec![history_entry("e2", 1_700_000_100, 0)]);
        let (_, _, engine, service) = engine_with(mock);

        engine.sync_jobs().await.unwrap();
        let stats = service.statistics().await.unwrap();
        assert_eq!(stats.total_jobs, 2);
        assert_eq!(stats.active_jobs, 1);
        assert_eq!(stats.paused_jobs, 1);
        assert_eq!(stats.successful_executions, 1);
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.success_rate(), Some(0.5));
    }
}
