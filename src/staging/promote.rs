//! Promotion of reviewed proposals into production configuration
//!
//! Each proposal is promoted in its own transaction: the production write and
//! the REVIEWED -> SYNCED flip commit together or not at all. The flip runs
//! first so the transaction holds the write lock before anything is read.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::sync::Arc;
use uuid::Uuid;

use super::proposal::{Proposal, ProposalKind, ProposalPayload, ProposalStatus};
use crate::error::{AppError, Result};
use crate::store::Store;

/// Blacklist category for scenario keywords
const SCENARIO_KEYWORD_BLACKLIST: i64 = 1;
/// Synced rules always match on the tag code
const RULE_MATCH_TYPE: &str = "TAG";

/// Where promoted configuration lands
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncScope {
    #[default]
    Global,
    Scenario(String),
}

impl SyncScope {
    /// Blank scenario ids fall back to global scope
    pub fn from_scenario(scenario_id: Option<String>) -> Self {
        match scenario_id {
            Some(id) if !id.trim().is_empty() => SyncScope::Scenario(id.trim().to_string()),
            _ => SyncScope::Global,
        }
    }
}

/// Configuration row derived from a reviewed proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotedRecord {
    Keyword {
        keyword: String,
        tag_code: String,
        risk_level: String,
    },
    Rule {
        tag_code: String,
        extra_condition: Option<String>,
        strategy: String,
    },
}

impl PromotedRecord {
    pub fn from_proposal(proposal: &Proposal) -> Self {
        match &proposal.payload {
            ProposalPayload::Keyword(kw) => PromotedRecord::Keyword {
                keyword: kw.keyword.clone(),
                tag_code: kw.final_tag.clone().unwrap_or_else(|| kw.predicted_tag.clone()),
                risk_level: kw
                    .final_risk
                    .clone()
                    .unwrap_or_else(|| kw.predicted_risk.clone()),
            },
            ProposalPayload::Rule(rule) => PromotedRecord::Rule {
                tag_code: rule.tag_code.clone(),
                extra_condition: rule.effective_condition().map(str::to_string),
                strategy: rule
                    .final_strategy
                    .clone()
                    .unwrap_or_else(|| rule.predicted_strategy.clone()),
            },
        }
    }
}

/// Writes promoted records into the production configuration.
/// Writes go through the caller's connection so they share its transaction.
#[async_trait]
pub trait ConfigWriter: Send + Sync {
    async fn write(
        &self,
        conn: &mut SqliteConnection,
        record: &PromotedRecord,
        scope: &SyncScope,
    ) -> Result<()>;
}

/// Upserts into the console's keyword library and rule tables
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConfigWriter;

impl SqliteConfigWriter {
    async fn upsert_global_keyword(
        conn: &mut SqliteConnection,
        keyword: &str,
        tag_code: &str,
        risk_level: &str,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE lib_global_keywords SET tag_code = ?, risk_level = ?, is_active = 1
            WHERE keyword = ?
            "#,
        )
        .bind(tag_code)
        .bind(risk_level)
        .bind(keyword)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO lib_global_keywords (id, keyword, tag_code, risk_level, is_active)
                VALUES (?, ?, ?, ?, 1)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(keyword)
            .bind(tag_code)
            .bind(risk_level)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn upsert_scenario_keyword(
        conn: &mut SqliteConnection,
        scenario_id: &str,
        keyword: &str,
        tag_code: &str,
        risk_level: &str,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE lib_scenario_keywords SET tag_code = ?, risk_level = ?, is_active = 1
            WHERE scenario_id = ? AND keyword = ?
            "#,
        )
        .bind(tag_code)
        .bind(risk_level)
        .bind(scenario_id)
        .bind(keyword)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO lib_scenario_keywords
                    (id, scenario_id, keyword, tag_code, risk_level, is_active, category)
                VALUES (?, ?, ?, ?, ?, 1, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(scenario_id)
            .bind(keyword)
            .bind(tag_code)
            .bind(risk_level)
            .bind(SCENARIO_KEYWORD_BLACKLIST)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn upsert_global_rule(
        conn: &mut SqliteConnection,
        tag_code: &str,
        extra_condition: Option<&str>,
        strategy: &str,
    ) -> Result<()> {
        // `IS` so a NULL condition matches a NULL condition
        let updated = sqlx::query(
            r#"
            UPDATE rule_global_defaults SET strategy = ?, is_active = 1
            WHERE tag_code = ? AND extra_condition IS ?
            "#,
        )
        .bind(strategy)
        .bind(tag_code)
        .bind(extra_condition)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO rule_global_defaults (id, tag_code, extra_condition, strategy, is_active)
                VALUES (?, ?, ?, ?, 1)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(tag_code)
            .bind(extra_condition)
            .bind(strategy)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn upsert_scenario_rule(
        conn: &mut SqliteConnection,
        scenario_id: &str,
        tag_code: &str,
        extra_condition: Option<&str>,
        strategy: &str,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE rule_scenario_policy SET strategy = ?, is_active = 1
            WHERE scenario_id = ? AND match_type = ? AND match_value = ?
              AND extra_condition IS ?
            "#,
        )
        .bind(strategy)
        .bind(scenario_id)
        .bind(RULE_MATCH_TYPE)
        .bind(tag_code)
        .bind(extra_condition)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO rule_scenario_policy
                    (id, scenario_id, match_type, match_value, extra_condition, strategy, is_active)
                VALUES (?, ?, ?, ?, ?, ?, 1)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(scenario_id)
            .bind(RULE_MATCH_TYPE)
            .bind(tag_code)
            .bind(extra_condition)
            .bind(strategy)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigWriter for SqliteConfigWriter {
    async fn write(
        &self,
        conn: &mut SqliteConnection,
        record: &PromotedRecord,
        scope: &SyncScope,
    ) -> Result<()> {
        match (record, scope) {
            (
                PromotedRecord::Keyword {
                    keyword,
                    tag_code,
                    risk_level,
                },
                SyncScope::Global,
            ) => Self::upsert_global_keyword(conn, keyword, tag_code, risk_level).await,
            (
                PromotedRecord::Keyword {
                    keyword,
                    tag_code,
                    risk_level,
                },
                SyncScope::Scenario(scenario_id),
            ) => {
                Self::upsert_scenario_keyword(conn, scenario_id, keyword, tag_code, risk_level)
                    .await
            }
            (
                PromotedRecord::Rule {
                    tag_code,
                    extra_condition,
                    strategy,
                },
                SyncScope::Global,
            ) => {
                Self::upsert_global_rule(conn, tag_code, extra_condition.as_deref(), strategy)
                    .await
            }
            (
                PromotedRecord::Rule {
                    tag_code,
                    extra_condition,
                    strategy,
                },
                SyncScope::Scenario(scenario_id),
            ) => {
                Self::upsert_scenario_rule(
                    conn,
                    scenario_id,
                    tag_code,
                    extra_condition.as_deref(),
                    strategy,
                )
                .await
            }
        }
    }
}

/// Result of a sync call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub synced_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
}

enum Promotion {
    Synced,
    Skipped,
}

/// Moves REVIEWED proposals into production through a `ConfigWriter`
#[derive(Clone)]
pub struct SyncPromoter {
    store: Store,
    writer: Arc<dyn ConfigWriter>,
}

impl SyncPromoter {
    pub fn new(store: Store, writer: Arc<dyn ConfigWriter>) -> Self {
        Self { store, writer }
    }

    pub async fn sync(&self, kind: ProposalKind, ids: &[Uuid], scope: &SyncScope) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        for &id in ids {
            match self.promote_one(kind, id, scope).await {
                Ok(Promotion::Synced) => outcome.synced_count += 1,
                Ok(Promotion::Skipped) => outcome.skipped_count += 1,
                Err(e) => {
                    tracing::warn!(%id, kind = %kind, error = %e, "sync failed, proposal left REVIEWED");
                    outcome.failed_count += 1;
                }
            }
        }

        tracing::info!(
            kind = %kind,
            synced = outcome.synced_count,
            skipped = outcome.skipped_count,
            failed = outcome.failed_count,
            "sync finished"
        );
        outcome
    }

    pub async fn sync_all(&self, kind: ProposalKind, scope: &SyncScope) -> Result<SyncOutcome> {
        let ids = self
            .store
            .ids_with_status(kind, ProposalStatus::Reviewed)
            .await?;
        Ok(self.sync(kind, &ids, scope).await)
    }

    async fn promote_one(&self, kind: ProposalKind, id: Uuid, scope: &SyncScope) -> Result<Promotion> {
        let mut tx = self.store.pool().begin().await?;

        // Unknown, other kind, not REVIEWED, or taken by a concurrent sync
        if !self.store.mark_synced(&mut tx, kind, id, Utc::now()).await? {
            return Ok(Promotion::Skipped);
        }

        let proposal = self.store.get_in(&mut tx, id).await?.ok_or_else(|| {
            AppError::Internal(format!("Proposal {} vanished during sync", id))
        })?;

        let record = PromotedRecord::from_proposal(&proposal);
        // Dropping `tx` on error rolls back the flip and any partial production write
        self.writer.write(&mut tx, &record, scope).await?;

        tx.commit().await?;
        tracing::debug!(%id, kind = %kind, "proposal synced");
        Ok(Promotion::Synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::proposal::{Decision, FinalFields, ProposalDraft};
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_store() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Store::new(pool);
        store.run_migrations().await.unwrap();
        store
    }

    async fn reviewed(store: &Store, draft: ProposalDraft, fields: FinalFields) -> Uuid {
        let kind = draft.kind();
        let created = store.create_batch(kind, vec![draft]).await.unwrap();
        let now = Utc::now();
        store
            .claim_pending(kind, 1, "alice", Uuid::new_v4(), now, now + Duration::minutes(30))
            .await
            .unwrap();
        let verdict = created[0].payload.verdict(Decision::Reviewed, &fields);
        assert!(store
            .apply_verdict(created[0].id, &verdict, "alice", now, None)
            .await
            .unwrap());
        created[0].id
    }

    #[test]
    fn test_scope_from_blank_scenario() {
        assert_eq!(SyncScope::from_scenario(None), SyncScope::Global);
        assert_eq!(SyncScope::from_scenario(Some("  ".into())), SyncScope::Global);
        assert_eq!(
            SyncScope::from_scenario(Some("app-1".into())),
            SyncScope::Scenario("app-1".into())
        );
    }

    #[tokio::test]
    async fn test_global_keyword_upsert() {
        let store = setup_store().await;
        let promoter = SyncPromoter::new(store.clone(), Arc::new(SqliteConfigWriter));

        let first = reviewed(
            &store,
            ProposalDraft::keyword("spin to win", "GAMBLING", "Medium"),
            FinalFields::default(),
        )
        .await;
        let second = reviewed(
            &store,
            ProposalDraft::keyword("spin to win", "GAMBLING", "Medium"),
            FinalFields::keyword("GAMBLING", "High"),
        )
        .await;

        let outcome = promoter
            .sync(ProposalKind::Keyword, &[first, second], &SyncScope::Global)
            .await;
        assert_eq!(outcome.synced_count, 2);

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT tag_code, risk_level FROM lib_global_keywords WHERE keyword = 'spin to win'",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(rows, vec![("GAMBLING".to_string(), "High".to_string())]);
    }

    #[tokio::test]
    async fn test_scenario_rule_upsert_matches_null_condition() {
        let store = setup_store().await;
        let promoter = SyncPromoter::new(store.clone(), Arc::new(SqliteConfigWriter));
        let scope = SyncScope::Scenario("app-7".into());

        let first = reviewed(
            &store,
            ProposalDraft::rule("DRUGS", None, "BLOCK"),
            FinalFields::default(),
        )
        .await;
        promoter.sync(ProposalKind::Rule, &[first], &scope).await;

        let second = reviewed(
            &store,
            ProposalDraft::rule("DRUGS", None, "BLOCK"),
            FinalFields::rule("MANUAL_REVIEW"),
        )
        .await;
        promoter.sync(ProposalKind::Rule, &[second], &scope).await;

        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT match_type, match_value, strategy FROM rule_scenario_policy WHERE scenario_id = 'app-7'",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(
            rows,
            vec![("TAG".to_string(), "DRUGS".to_string(), "MANUAL_REVIEW".to_string())]
        );
    }

    #[tokio::test]
    async fn test_rule_sync_uses_reviewed_condition() {
        let store = setup_store().await;
        let promoter = SyncPromoter::new(store.clone(), Arc::new(SqliteConfigWriter));

        let id = reviewed(
            &store,
            ProposalDraft::rule("VIOLENCE", Some("unsafe".into()), "BLOCK"),
            FinalFields::rule("BLOCK").with_extra_condition("controversial"),
        )
        .await;
        let outcome = promoter
            .sync(ProposalKind::Rule, &[id], &SyncScope::Global)
            .await;
        assert_eq!(outcome.synced_count, 1);

        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT tag_code, extra_condition FROM rule_global_defaults",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(
            rows,
            vec![("VIOLENCE".to_string(), Some("controversial".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_sync_skips_wrong_kind_and_status() {
        let store = setup_store().await;
        let promoter = SyncPromoter::new(store.clone(), Arc::new(SqliteConfigWriter));

        let pending = store
            .create_batch(
                ProposalKind::Keyword,
                vec![ProposalDraft::keyword("k", "ADULT", "Low")],
            )
            .await
            .unwrap();
        let rule = reviewed(
            &store,
            ProposalDraft::rule("ADULT", None, "PASS"),
            FinalFields::default(),
        )
        .await;

        let outcome = promoter
            .sync(
                ProposalKind::Keyword,
                &[pending[0].id, rule, Uuid::new_v4()],
                &SyncScope::Global,
            )
            .await;
        assert_eq!(
            outcome,
            SyncOutcome {
                synced_count: 0,
                skipped_count: 3,
                failed_count: 0
            }
        );
        assert_eq!(store.get(rule).await.unwrap().status, ProposalStatus::Reviewed);
    }

    #[tokio::test]
    async fn test_sync_all_only_reviewed() {
        let store = setup_store().await;
        let promoter = SyncPromoter::new(store.clone(), Arc::new(SqliteConfigWriter));
        reviewed(
            &store,
            ProposalDraft::keyword("a", "VIOLENCE", "High"),
            FinalFields::default(),
        )
        .await;
        store
            .create_batch(
                ProposalKind::Keyword,
                vec![ProposalDraft::keyword("b", "VIOLENCE", "Low")],
            )
            .await
            .unwrap();

        let outcome = promoter
            .sync_all(ProposalKind::Keyword, &SyncScope::Global)
            .await
            .unwrap();
        assert_eq!(outcome.synced_count, 1);
        assert_eq!(outcome.skipped_count, 0);

        let again = promoter
            .sync_all(ProposalKind::Keyword, &SyncScope::Global)
            .await
            .unwrap();
        assert_eq!(again, SyncOutcome::default());
    }
}
