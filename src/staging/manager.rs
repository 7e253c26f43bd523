//! Staging manager for claiming, reviewing and reclaiming proposals
//!
//! The manager handles:
//! - Claiming bounded batches under a lease
//! - Applying annotator decisions
//! - Returning expired leases to the pool
//! - Seeding and deleting proposals
//! - Progress statistics

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::promote::{ConfigWriter, SyncOutcome, SyncPromoter, SyncScope};
use super::proposal::{Decision, FinalFields, Proposal, ProposalDraft, ProposalKind, ProposalStatus};
use super::stats::{AnnotatorStat, MyTaskStats, TaskOverview};
use crate::error::{AppError, Result};
use crate::store::{OwnerGuard, ProposalFilter, Store};

pub const DEFAULT_LEASE_MINUTES: i64 = 30;
pub const DEFAULT_MAX_BATCH_SIZE: u32 = 50;
pub const DEFAULT_MOCK_COUNT: u32 = 100;
pub const MAX_MOCK_COUNT: u32 = 1000;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

const MOCK_TAGS: [&str; 5] = ["POLITICS", "VIOLENCE", "ADULT", "GAMBLING", "DRUGS"];
const MOCK_RISKS: [&str; 3] = ["High", "Medium", "Low"];
const MOCK_STRATEGIES: [&str; 4] = ["BLOCK", "REWRITE", "PASS", "MANUAL_REVIEW"];

/// Tunables for the staging workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingSettings {
    pub lease: Duration,
    pub max_batch_size: u32,
    /// Require the reviewer to hold an unexpired claim on the proposal
    pub strict_ownership: bool,
}

impl Default for StagingSettings {
    fn default() -> Self {
        Self {
            lease: Duration::minutes(DEFAULT_LEASE_MINUTES),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            strict_ownership: false,
        }
    }
}

/// Result of a claim call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub claimed_count: usize,
    pub claimed_ids: Vec<Uuid>,
    pub batch_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub timeout_minutes: i64,
}

/// One item of a batch review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: Uuid,
    pub status: Decision,
    #[serde(flatten)]
    pub fields: FinalFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFailure {
    pub id: Uuid,
    pub error: String,
}

/// Per-item results of a batch review
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReviewOutcome {
    pub success_count: usize,
    pub failed_count: usize,
    pub failures: Vec<ReviewFailure>,
}

/// Rows returned to the pool by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    pub released_keywords: u64,
    pub released_rules: u64,
}

impl ReleaseOutcome {
    pub fn total(&self) -> u64 {
        self.released_keywords + self.released_rules
    }
}

/// Coordinates the proposal lifecycle over the store
#[derive(Clone)]
pub struct StagingManager {
    store: Store,
    promoter: SyncPromoter,
    settings: StagingSettings,
}

impl StagingManager {
    pub fn new(store: Store, writer: Arc<dyn ConfigWriter>, settings: StagingSettings) -> Self {
        Self {
            promoter: SyncPromoter::new(store.clone(), writer),
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &StagingSettings {
        &self.settings
    }

    // Claiming

    /// Lease up to `batch_size` PENDING proposals to `annotator`
    pub async fn claim(
        &self,
        kind: ProposalKind,
        batch_size: u32,
        annotator: &str,
    ) -> Result<ClaimOutcome> {
        let annotator = annotator.trim();
        if annotator.is_empty() {
            return Err(AppError::BadRequest("annotator must not be empty".to_string()));
        }
        if batch_size == 0 {
            return Err(AppError::BadRequest("batch_size must be at least 1".to_string()));
        }
        let limit = batch_size.min(self.settings.max_batch_size);

        let batch_id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + self.settings.lease;

        let claimed_ids = self
            .store
            .claim_pending(kind, i64::from(limit), annotator, batch_id, now, expires_at)
            .await?;

        tracing::info!(
            kind = %kind,
            annotator,
            %batch_id,
            requested = batch_size,
            claimed = claimed_ids.len(),
            "claimed batch"
        );

        Ok(ClaimOutcome {
            claimed_count: claimed_ids.len(),
            claimed_ids,
            batch_id,
            expires_at,
            timeout_minutes: self.settings.lease.num_minutes(),
        })
    }

    // Reviewing

    /// Record a REVIEWED or IGNORED decision on a CLAIMED proposal
    pub async fn review(
        &self,
        kind: ProposalKind,
        id: Uuid,
        decision: Decision,
        fields: &FinalFields,
        reviewer: &str,
    ) -> Result<Proposal> {
        let proposal = self.get(kind, id).await?;
        if !proposal.status.can_transition_to(decision.status()) {
            return Err(AppError::InvalidState(format!(
                "Proposal {} is {}, cannot move to {}",
                id,
                proposal.status,
                decision.status()
            )));
        }

        let now = Utc::now();
        let guard = if self.settings.strict_ownership {
            if !proposal.is_claimed_by(reviewer) {
                return Err(AppError::Unauthorized(format!(
                    "Proposal {} is not claimed by {}",
                    id, reviewer
                )));
            }
            if proposal.lease_expired(now) {
                return Err(AppError::Unauthorized(format!(
                    "Lease on proposal {} has expired",
                    id
                )));
            }
            Some(OwnerGuard {
                annotator: reviewer,
                now,
            })
        } else {
            None
        };

        let verdict = proposal.payload.verdict(decision, fields);
        let applied = self
            .store
            .apply_verdict(id, &verdict, reviewer, now, guard)
            .await?;
        if !applied {
            tracing::warn!(%id, reviewer, "review lost race");
            return Err(AppError::StoreConflict(format!(
                "Proposal {} changed while being reviewed",
                id
            )));
        }

        tracing::info!(
            %id,
            kind = %kind,
            reviewer,
            status = %verdict.status,
            modified = verdict.is_modified,
            "proposal reviewed"
        );

        self.store.get(id).await
    }

    /// Review each item independently; one failure never aborts the rest
    pub async fn review_batch(
        &self,
        kind: ProposalKind,
        items: &[ReviewItem],
        reviewer: &str,
    ) -> BatchReviewOutcome {
        let mut outcome = BatchReviewOutcome::default();

        for item in items {
            match self
                .review(kind, item.id, item.status, &item.fields, reviewer)
                .await
            {
                Ok(_) => outcome.success_count += 1,
                Err(e) => {
                    outcome.failed_count += 1;
                    outcome.failures.push(ReviewFailure {
                        id: item.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            kind = %kind,
            reviewer,
            succeeded = outcome.success_count,
            failed = outcome.failed_count,
            "batch review finished"
        );
        outcome
    }

    // Reclaiming

    pub async fn release_expired(&self) -> Result<ReleaseOutcome> {
        self.release_expired_at(Utc::now()).await
    }

    /// Return every CLAIMED proposal whose lease ended at or before `now`
    pub async fn release_expired_at(&self, now: DateTime<Utc>) -> Result<ReleaseOutcome> {
        let outcome = ReleaseOutcome {
            released_keywords: self.store.release_expired(ProposalKind::Keyword, now).await?,
            released_rules: self.store.release_expired(ProposalKind::Rule, now).await?,
        };

        if outcome.total() > 0 {
            tracing::info!(
                keywords = outcome.released_keywords,
                rules = outcome.released_rules,
                "released expired claims"
            );
        }
        Ok(outcome)
    }

    // Records

    /// Fetch a proposal of the given kind
    pub async fn get(&self, kind: ProposalKind, id: Uuid) -> Result<Proposal> {
        let proposal = self.store.get(id).await?;
        if proposal.kind() != kind {
            return Err(AppError::NotFound(format!("{} proposal {} not found", kind, id)));
        }
        Ok(proposal)
    }

    pub async fn list(&self, filter: ProposalFilter) -> Result<Vec<Proposal>> {
        let limit = match filter.limit {
            n if n <= 0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        let offset = filter.offset.max(0);
        self.store.list(&filter.page(limit, offset)).await
    }

    pub async fn create_batch(
        &self,
        kind: ProposalKind,
        drafts: Vec<ProposalDraft>,
    ) -> Result<Vec<Proposal>> {
        if drafts.is_empty() {
            return Err(AppError::BadRequest("items must not be empty".to_string()));
        }
        let created = self.store.create_batch(kind, drafts).await?;
        tracing::info!(kind = %kind, count = created.len(), "proposals created");
        Ok(created)
    }

    /// Seed randomly generated PENDING proposals
    pub async fn import_mock(&self, kind: ProposalKind, count: Option<u32>) -> Result<usize> {
        let count = count.unwrap_or(DEFAULT_MOCK_COUNT);
        if count == 0 || count > MAX_MOCK_COUNT {
            return Err(AppError::BadRequest(format!(
                "count must be between 1 and {}",
                MAX_MOCK_COUNT
            )));
        }

        let drafts = mock_drafts(kind, count as usize);
        let created = self.store.create_batch(kind, drafts).await?;
        tracing::info!(kind = %kind, count = created.len(), "mock proposals imported");
        Ok(created.len())
    }

    /// Delete an IGNORED proposal
    pub async fn delete(&self, kind: ProposalKind, id: Uuid) -> Result<()> {
        let proposal = self.get(kind, id).await?;
        if proposal.status != ProposalStatus::Ignored {
            return Err(AppError::InvalidState(format!(
                "Only IGNORED proposals can be deleted, {} is {}",
                id, proposal.status
            )));
        }

        if !self.store.delete_ignored(id).await? {
            // Status moved between the read and the delete
            let current = self.store.get(id).await?;
            return Err(AppError::InvalidState(format!(
                "Only IGNORED proposals can be deleted, {} is {}",
                id, current.status
            )));
        }

        tracing::info!(%id, kind = %kind, "ignored proposal deleted");
        Ok(())
    }

    // Promotion

    pub async fn sync(&self, kind: ProposalKind, ids: &[Uuid], scope: &SyncScope) -> SyncOutcome {
        self.promoter.sync(kind, ids, scope).await
    }

    pub async fn sync_all(&self, kind: ProposalKind, scope: &SyncScope) -> Result<SyncOutcome> {
        self.promoter.sync_all(kind, scope).await
    }

    // Statistics

    pub async fn annotator_stats(&self, kind: ProposalKind) -> Result<Vec<AnnotatorStat>> {
        self.store.annotator_stats(kind).await
    }

    pub async fn my_task_stats(&self, kind: ProposalKind, caller: &str) -> Result<MyTaskStats> {
        let (reviewed, ignored) = self.store.decisions_by(kind, caller).await?;
        let leases = self.store.active_leases(kind, caller).await?;
        Ok(MyTaskStats::from_leases(
            kind,
            reviewed,
            ignored,
            &leases,
            Utc::now(),
        ))
    }

    pub async fn task_overview(&self, kind: ProposalKind) -> Result<TaskOverview> {
        let counts = self.store.count_by_status(kind).await?;
        Ok(TaskOverview::from_counts(&counts))
    }
}

fn mock_drafts(kind: ProposalKind, count: usize) -> Vec<ProposalDraft> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let tag = MOCK_TAGS.choose(&mut rng).copied().unwrap_or("POLITICS");
            match kind {
                ProposalKind::Keyword => {
                    let risk = MOCK_RISKS.choose(&mut rng).copied().unwrap_or("Low");
                    let suffix: u32 = rng.gen_range(1000..10000);
                    ProposalDraft::keyword(
                        format!("{}_{}", tag.to_ascii_lowercase(), suffix),
                        tag,
                        risk,
                    )
                }
                ProposalKind::Rule => {
                    let strategy = MOCK_STRATEGIES.choose(&mut rng).copied().unwrap_or("BLOCK");
                    let extra_condition = if rng.gen_bool(0.3) {
                        MOCK_RISKS
                            .choose(&mut rng)
                            .map(|risk| format!("risk_level={}", risk))
                    } else {
                        None
                    };
                    ProposalDraft::rule(tag, extra_condition, strategy)
                }
            }
        })
        .collect()
}
