//! Proposals and their review lifecycle
//!
//! A proposal is a machine-generated keyword or rule suggestion. Both kinds
//! share one lifecycle; only the payload differs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which pool a proposal belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    #[serde(alias = "keywords")]
    Keyword,
    #[serde(alias = "rules")]
    Rule,
}

impl ProposalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalKind::Keyword => "keyword",
            ProposalKind::Rule => "rule",
        }
    }
}

impl std::fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProposalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyword" | "keywords" => Ok(ProposalKind::Keyword),
            "rule" | "rules" => Ok(ProposalKind::Rule),
            _ => Err(format!("Invalid proposal kind: {}", s)),
        }
    }
}

/// Lifecycle status of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    /// Waiting in the pool
    Pending,
    /// Leased to an annotator
    Claimed,
    /// Accepted by an annotator, ready to sync
    Reviewed,
    /// Rejected by an annotator
    Ignored,
    /// Promoted into production configuration
    Synced,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "PENDING",
            ProposalStatus::Claimed => "CLAIMED",
            ProposalStatus::Reviewed => "REVIEWED",
            ProposalStatus::Ignored => "IGNORED",
            ProposalStatus::Synced => "SYNCED",
        }
    }

    /// Lifecycle edges; SYNCED has none
    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Pending, Claimed)
                | (Claimed, Pending)
                | (Claimed, Reviewed)
                | (Claimed, Ignored)
                | (Reviewed, Synced)
        )
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ProposalStatus::Pending),
            "CLAIMED" => Ok(ProposalStatus::Claimed),
            "REVIEWED" => Ok(ProposalStatus::Reviewed),
            "IGNORED" => Ok(ProposalStatus::Ignored),
            "SYNCED" => Ok(ProposalStatus::Synced),
            _ => Err(format!("Invalid proposal status: {}", s)),
        }
    }
}

/// An annotator's decision on a claimed proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Reviewed,
    Ignored,
}

impl Decision {
    pub fn status(&self) -> ProposalStatus {
        match self {
            Decision::Reviewed => ProposalStatus::Reviewed,
            Decision::Ignored => ProposalStatus::Ignored,
        }
    }
}

/// Annotator-chosen values; any field may be omitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_risk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_strategy: Option<String>,
    /// Corrected rule condition; absent keeps the proposed one
    #[serde(default, alias = "extra_condition", skip_serializing_if = "Option::is_none")]
    pub final_extra_condition: Option<String>,
}

impl FinalFields {
    pub fn keyword(tag: impl Into<String>, risk: impl Into<String>) -> Self {
        Self {
            final_tag: Some(tag.into()),
            final_risk: Some(risk.into()),
            ..Self::default()
        }
    }

    pub fn rule(strategy: impl Into<String>) -> Self {
        Self {
            final_strategy: Some(strategy.into()),
            ..Self::default()
        }
    }

    pub fn with_extra_condition(mut self, condition: impl Into<String>) -> Self {
        self.final_extra_condition = Some(condition.into());
        self
    }
}

/// Blank strings count as "not supplied"
fn supplied(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordPayload {
    pub keyword: String,
    pub predicted_tag: String,
    pub predicted_risk: String,
    pub final_tag: Option<String>,
    pub final_risk: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePayload {
    pub tag_code: String,
    pub extra_condition: Option<String>,
    pub predicted_strategy: String,
    pub final_strategy: Option<String>,
    #[serde(default)]
    pub final_extra_condition: Option<String>,
}

impl RulePayload {
    /// Condition to promote: the reviewed one when set, else the proposed one
    pub fn effective_condition(&self) -> Option<&str> {
        self.final_extra_condition
            .as_deref()
            .or(self.extra_condition.as_deref())
    }
}

/// Kind-specific content of a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalPayload {
    Keyword(KeywordPayload),
    Rule(RulePayload),
}

/// Values written by a review transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: ProposalStatus,
    pub final_tag: Option<String>,
    pub final_risk: Option<String>,
    pub final_strategy: Option<String>,
    pub final_extra_condition: Option<String>,
    pub is_modified: bool,
}

impl ProposalPayload {
    pub fn kind(&self) -> ProposalKind {
        match self {
            ProposalPayload::Keyword(_) => ProposalKind::Keyword,
            ProposalPayload::Rule(_) => ProposalKind::Rule,
        }
    }

    /// Resolve the final values for a decision.
    ///
    /// REVIEWED falls back to the model prediction for anything the annotator
    /// left out. IGNORED writes no final values.
    pub fn verdict(&self, decision: Decision, fields: &FinalFields) -> Verdict {
        let ignored = Verdict {
            status: ProposalStatus::Ignored,
            final_tag: None,
            final_risk: None,
            final_strategy: None,
            final_extra_condition: None,
            is_modified: false,
        };
        if decision == Decision::Ignored {
            return ignored;
        }

        match self {
            ProposalPayload::Keyword(kw) => {
                let tag = supplied(&fields.final_tag).unwrap_or(kw.predicted_tag.as_str());
                let risk = supplied(&fields.final_risk).unwrap_or(kw.predicted_risk.as_str());
                Verdict {
                    status: ProposalStatus::Reviewed,
                    is_modified: tag != kw.predicted_tag || risk != kw.predicted_risk,
                    final_tag: Some(tag.to_string()),
                    final_risk: Some(risk.to_string()),
                    final_strategy: None,
                    final_extra_condition: None,
                }
            }
            ProposalPayload::Rule(rule) => {
                let strategy =
                    supplied(&fields.final_strategy).unwrap_or(rule.predicted_strategy.as_str());
                Verdict {
                    status: ProposalStatus::Reviewed,
                    is_modified: strategy != rule.predicted_strategy,
                    final_tag: None,
                    final_risk: None,
                    final_strategy: Some(strategy.to_string()),
                    final_extra_condition: supplied(&fields.final_extra_condition)
                        .map(str::to_string)
                        .or_else(|| rule.extra_condition.clone()),
                }
            }
        }
    }
}

/// A proposal record with its lifecycle fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    #[serde(flatten)]
    pub payload: ProposalPayload,
    pub status: ProposalStatus,
    pub is_modified: bool,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub batch_id: Option<Uuid>,
    pub annotator: Option<String>,
    pub annotated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn kind(&self) -> ProposalKind {
        self.payload.kind()
    }

    pub fn is_claimed_by(&self, annotator: &str) -> bool {
        self.status == ProposalStatus::Claimed && self.claimed_by.as_deref() == Some(annotator)
    }

    /// Whether a claimed proposal's lease has run out at `now` (inclusive)
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        match self.lease_expires_at {
            Some(expires_at) => self.status == ProposalStatus::Claimed && expires_at <= now,
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordDraft {
    pub keyword: String,
    pub predicted_tag: String,
    pub predicted_risk: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub tag_code: String,
    #[serde(default)]
    pub extra_condition: Option<String>,
    pub predicted_strategy: String,
}

/// Input for seeding a new proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProposalDraft {
    Keyword(KeywordDraft),
    Rule(RuleDraft),
}

impl ProposalDraft {
    pub fn keyword(
        keyword: impl Into<String>,
        predicted_tag: impl Into<String>,
        predicted_risk: impl Into<String>,
    ) -> Self {
        ProposalDraft::Keyword(KeywordDraft {
            keyword: keyword.into(),
            predicted_tag: predicted_tag.into(),
            predicted_risk: predicted_risk.into(),
        })
    }

    pub fn rule(
        tag_code: impl Into<String>,
        extra_condition: Option<String>,
        predicted_strategy: impl Into<String>,
    ) -> Self {
        ProposalDraft::Rule(RuleDraft {
            tag_code: tag_code.into(),
            extra_condition,
            predicted_strategy: predicted_strategy.into(),
        })
    }

    pub fn kind(&self) -> ProposalKind {
        match self {
            ProposalDraft::Keyword(_) => ProposalKind::Keyword,
            ProposalDraft::Rule(_) => ProposalKind::Rule,
        }
    }

    pub fn into_payload(self) -> ProposalPayload {
        match self {
            ProposalDraft::Keyword(d) => ProposalPayload::Keyword(KeywordPayload {
                keyword: d.keyword,
                predicted_tag: d.predicted_tag,
                predicted_risk: d.predicted_risk,
                final_tag: None,
                final_risk: None,
            }),
            ProposalDraft::Rule(d) => ProposalPayload::Rule(RulePayload {
                tag_code: d.tag_code,
                extra_condition: d.extra_condition,
                predicted_strategy: d.predicted_strategy,
                final_strategy: None,
                final_extra_condition: None,
            }),
        }
    }
}
