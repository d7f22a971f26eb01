//! Core domain model for the scheduler mirror: jobs, executions, and the
//! pure classification helpers shared by the sync and operations layers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "cronwatch-core";

/// Sentinel inside a schedule field meaning "every unit" (every hour, every
/// minute, ...), mirrored verbatim from the external representation.
pub const SCHEDULE_EVERY: i32 = -1;

/// Stored response bodies are capped at this many bytes; the original size is
/// kept separately on the execution record.
pub const RESPONSE_BODY_LIMIT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobCategory {
    Content,
    Maintenance,
    Publishing,
    Analytics,
}

impl JobCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Maintenance => "maintenance",
            Self::Publishing => "publishing",
            Self::Analytics => "analytics",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "content" => Some(Self::Content),
            "maintenance" => Some(Self::Maintenance),
            "publishing" => Some(Self::Publishing),
            "analytics" => Some(Self::Analytics),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    Medium,
    High,
}

impl JobPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Paused,
    Disabled,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Disabled => "disabled",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "disabled" => Some(Self::Disabled),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Schedule,
    Manual,
    Retry,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Manual => "manual",
            Self::Retry => "retry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "schedule" => Some(Self::Schedule),
            "manual" => Some(Self::Manual),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }
}

/// Schedule fields mirrored verbatim from the external scheduler; each vector
/// holds the selected units, or the single `SCHEDULE_EVERY` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub hours: Vec<i32>,
    pub minutes: Vec<i32>,
    pub mdays: Vec<i32>,
    pub months: Vec<i32>,
    pub wdays: Vec<i32>,
}

impl Schedule {
    pub fn every() -> Self {
        Self {
            hours: vec![SCHEDULE_EVERY],
            minutes: vec![SCHEDULE_EVERY],
            mdays: vec![SCHEDULE_EVERY],
            months: vec![SCHEDULE_EVERY],
            wdays: vec![SCHEDULE_EVERY],
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::every()
    }
}

/// Local mirror of one externally scheduled job. Created only by sync, never
/// by direct user creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// At most one local job references a given external id.
    pub external_id: Option<i64>,
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
    pub retry_count: i32,
    pub max_retries: i32,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Provenance: which external service this row mirrors.
    pub source: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One observed run of a job. Identity is the (external_job_id, execution_id)
/// composite; re-syncing the same history entry must not duplicate rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub job_id: Uuid,
    pub external_job_id: i64,
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub http_status: Option<i32>,
    pub response_body: Option<String>,
    pub response_size: Option<i64>,
    pub error_message: Option<String>,
    pub error_code: Option<i32>,
    pub retry_attempt: i32,
    pub triggered_by: TriggerKind,
    pub created_at: DateTime<Utc>,
}

impl Execution {
    /// Historical execution as reported by the external service, already
    /// terminal on arrival.
    pub fn from_history(
        job_id: Uuid,
        external_job_id: i64,
        execution_id: String,
        status: ExecutionStatus,
        start_time: DateTime<Utc>,
        duration_ms: i64,
        http_status: Option<i32>,
        body: Option<&str>,
    ) -> Self {
        let (response_body, response_size) = match body {
            Some(b) => (Some(truncate_body(b)), Some(b.len() as i64)),
            None => (None, None),
        };
        let error_message = match status {
            ExecutionStatus::Failed => Some("execution reported as failed".to_string()),
            ExecutionStatus::Timeout => Some("execution timed out".to_string()),
            _ => None,
        };
        Self {
            id: Uuid::new_v4(),
            job_id,
            external_job_id,
            execution_id,
            status,
            start_time,
            end_time: Some(start_time + Duration::milliseconds(duration_ms)),
            duration_ms: Some(duration_ms),
            http_status,
            response_body,
            response_size,
            error_message,
            error_code: None,
            retry_attempt: 0,
            triggered_by: TriggerKind::Schedule,
            created_at: Utc::now(),
        }
    }

    /// In-flight record for a manual "run now"; starts pending and is moved to
    /// running or failed by the operations layer.
    pub fn manual(job_id: Uuid, external_job_id: i64, triggered_by: TriggerKind) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            job_id,
            external_job_id,
            // No external identifier exists yet; synthesize one from the job
            // and the record's own id so back-to-back triggers never share a
            // composite identity.
            execution_id: format!("manual-{}-{}", external_job_id, id.simple()),
            status: ExecutionStatus::Pending,
            start_time: now,
            end_time: None,
            duration_ms: None,
            http_status: None,
            response_body: None,
            response_size: None,
            error_message: None,
            error_code: None,
            retry_attempt: 0,
            triggered_by,
            created_at: now,
        }
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= RESPONSE_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = RESPONSE_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

/// Total mapping from the external scheduler's numeric status codes onto the
/// local execution status. Unknown codes fail closed.
pub fn execution_status_from_code(code: i64) -> ExecutionStatus {
    match code {
        1 => ExecutionStatus::Success,
        0 => ExecutionStatus::Failed,
        -1 => ExecutionStatus::Timeout,
        _ => ExecutionStatus::Failed,
    }
}

const CONTENT_KEYWORDS: &[&str] = &["content", "blog", "article", "post", "generat", "write"];
const MAINTENANCE_KEYWORDS: &[&str] = &["maintenance", "cleanup", "clean", "backup", "health", "monitor", "prune"];
const PUBLISHING_KEYWORDS: &[&str] = &["publish", "deploy", "release", "newsletter", "social"];
const ANALYTICS_KEYWORDS: &[&str] = &["analytic", "report", "stats", "metric", "track"];

const HIGH_PRIORITY_KEYWORDS: &[&str] = &["critical", "urgent", "important", "production", "hourly"];

/// Deterministic category + priority classification from a job's title and
/// target URL. First-match-wins over the ordered keyword lists, with a
/// URL-based secondary check and a `content`/`medium` fallback.
pub fn infer_category_priority(title: &str, url: &str) -> (JobCategory, JobPriority) {
    let title = title.to_lowercase();
    let url = url.to_lowercase();

    let category = category_from_text(&title)
        .or_else(|| category_from_text(&url))
        .unwrap_or(JobCategory::Content);

    // Maintenance-style titles and the fallback both land on medium; only
    // urgency keywords escalate.
    let priority = if HIGH_PRIORITY_KEYWORDS.iter().any(|k| title.contains(k)) {
        JobPriority::High
    } else {
        JobPriority::Medium
    };

    (category, priority)
}

fn category_from_text(text: &str) -> Option<JobCategory> {
    let ordered: &[(&[&str], JobCategory)] = &[
        (CONTENT_KEYWORDS, JobCategory::Content),
        (MAINTENANCE_KEYWORDS, JobCategory::Maintenance),
        (PUBLISHING_KEYWORDS, JobCategory::Publishing),
        (ANALYTICS_KEYWORDS, JobCategory::Analytics),
    ];
    for (keywords, category) in ordered {
        if keywords.iter().any(|k| text.contains(k)) {
            return Some(*category);
        }
    }
    None
}
