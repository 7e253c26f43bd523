//! Response bodies of the staging API
//!
//! These mirror the server's JSON. Fields the CLI never prints are left out;
//! serde ignores them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub claimed_count: usize,
    pub claimed_ids: Vec<Uuid>,
    pub batch_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub timeout_minutes: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    pub released_keywords: u64,
    pub released_rules: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub synced_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOverview {
    pub pending_count: i64,
    pub claimed_count: i64,
    pub reviewed_count: i64,
    pub synced_count: i64,
    pub ignored_count: i64,
    pub total_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyTaskStats {
    pub claimed_count: i64,
    pub reviewed_count: i64,
    pub ignored_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatorStat {
    pub annotator: String,
    pub reviewed_count: i64,
    pub ignored_count: i64,
    pub total_count: i64,
}

/// Listing row; payload columns depend on the kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalSummary {
    pub id: Uuid,
    pub status: String,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub tag_code: Option<String>,
    #[serde(default)]
    pub claimed_by: Option<String>,
    #[serde(default)]
    pub annotator: Option<String>,
}

impl ProposalSummary {
    /// Keyword text or rule tag code
    pub fn subject(&self) -> &str {
        self.keyword
            .as_deref()
            .or(self.tag_code.as_deref())
            .unwrap_or("-")
    }
}

/// `{"error": {"code", "message"}}`
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}
