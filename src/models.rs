//! Request and response bodies for the staging API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::staging::{Decision, FinalFields, ProposalDraft, ProposalKind, ProposalStatus, ReviewItem};

/// Request to claim a batch of pending proposals
#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub task_type: ProposalKind,
    pub batch_size: Option<u32>,
}

/// Decision on a single claimed proposal
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: Decision,
    #[serde(flatten)]
    pub fields: FinalFields,
}

#[derive(Debug, Deserialize)]
pub struct BatchReviewRequest {
    pub items: Vec<ReviewItem>,
}

/// Request to seed proposals
#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub items: Vec<ProposalDraft>,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub ids: Vec<Uuid>,
    pub scenario_id: Option<String>,
}

/// Target scenario for sync-all; absent means global
#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    pub scenario_id: Option<String>,
}

/// Query string of the proposal listing
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<ProposalStatus>,
    /// Only proposals currently claimed by the caller
    #[serde(default)]
    pub mine: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TaskTypeQuery {
    pub task_type: ProposalKind,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportMockQuery {
    pub count: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub created_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_request_flattens_fields() {
        let req: ReviewRequest =
            serde_json::from_str(r#"{"status": "REVIEWED", "final_risk": "Low"}"#).unwrap();
        assert_eq!(req.status, Decision::Reviewed);
        assert_eq!(req.fields.final_risk.as_deref(), Some("Low"));
        assert!(req.fields.final_tag.is_none());
    }

    #[test]
    fn test_claim_request_accepts_plural_task_type() {
        let req: ClaimRequest = serde_json::from_str(r#"{"task_type": "keywords"}"#).unwrap();
        assert_eq!(req.task_type, ProposalKind::Keyword);
        assert!(req.batch_size.is_none());
    }

    #[test]
    fn test_batch_review_item() {
        let id = Uuid::new_v4();
        let body = format!(
            r#"{{"items": [{{"id": "{}", "status": "IGNORED"}}]}}"#,
            id
        );
        let req: BatchReviewRequest = serde_json::from_str(&body).unwrap();
        assert_eq!(req.items[0].id, id);
        assert_eq!(req.items[0].status, Decision::Ignored);
    }

    #[test]
    fn test_rejects_unknown_decision() {
        let result: Result<ReviewRequest, _> = serde_json::from_str(r#"{"status": "SYNCED"}"#);
        assert!(result.is_err());
    }
}
