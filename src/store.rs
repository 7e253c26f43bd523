//! Database store for staging proposals
//!
//! Every lifecycle transition is a single conditional statement guarded on
//! `status`, so concurrent callers can never both win the same row.

use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::staging::proposal::{
    KeywordPayload, Proposal, ProposalDraft, ProposalKind, ProposalPayload, ProposalStatus,
    RulePayload, Verdict,
};
use crate::staging::stats::AnnotatorStat;

const PROPOSAL_COLUMNS: &str = "id, kind, keyword, predicted_tag, predicted_risk, final_tag, \
     final_risk, tag_code, extra_condition, predicted_strategy, final_strategy, \
     final_extra_condition, status, \
     is_modified, claimed_by, claimed_at, lease_expires_at, batch_id, annotator, annotated_at, \
     created_at, updated_at";

/// Open a SQLite pool, creating the database file if needed
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(StdDuration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Listing filter for proposals of one kind
#[derive(Debug, Clone)]
pub struct ProposalFilter {
    pub kind: ProposalKind,
    pub status: Option<ProposalStatus>,
    pub claimed_by: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ProposalFilter {
    pub fn new(kind: ProposalKind) -> Self {
        Self {
            kind,
            status: None,
            claimed_by: None,
            limit: 50,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: ProposalStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn claimed_by(mut self, annotator: impl Into<String>) -> Self {
        self.claimed_by = Some(annotator.into());
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// Extra conditions a reviewer must satisfy in strict-ownership mode
#[derive(Debug, Clone, Copy)]
pub struct OwnerGuard<'a> {
    pub annotator: &'a str,
    pub now: DateTime<Utc>,
}

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // Proposal records

    /// Insert PENDING proposals in one transaction
    pub async fn create_batch(
        &self,
        kind: ProposalKind,
        drafts: Vec<ProposalDraft>,
    ) -> Result<Vec<Proposal>> {
        if let Some(draft) = drafts.iter().find(|d| d.kind() != kind) {
            return Err(AppError::BadRequest(format!(
                "Expected {} proposals, got a {} draft",
                kind,
                draft.kind()
            )));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let id = Uuid::new_v4();
            let payload = draft.into_payload();
            let cols = PayloadColumns::of(&payload);

            sqlx::query(
                r#"
                INSERT INTO staging_proposals
                    (id, kind, keyword, predicted_tag, predicted_risk, tag_code, extra_condition,
                     predicted_strategy, status, is_modified, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
                "#,
            )
            .bind(id.to_string())
            .bind(kind.as_str())
            .bind(cols.keyword)
            .bind(cols.predicted_tag)
            .bind(cols.predicted_risk)
            .bind(cols.tag_code)
            .bind(cols.extra_condition)
            .bind(cols.predicted_strategy)
            .bind(ProposalStatus::Pending.as_str())
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            created.push(Proposal {
                id,
                payload,
                status: ProposalStatus::Pending,
                is_modified: false,
                claimed_by: None,
                claimed_at: None,
                lease_expires_at: None,
                batch_id: None,
                annotator: None,
                annotated_at: None,
                created_at: now,
                updated_at: now,
            });
        }

        tx.commit().await?;
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<Proposal> {
        fetch_proposal(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Proposal {} not found", id)))
    }

    /// Fetch inside an open transaction
    pub async fn get_in(&self, conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Proposal>> {
        fetch_proposal(conn, id).await
    }

    pub async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>> {
        let sql = format!(
            r#"
            SELECT {PROPOSAL_COLUMNS}
            FROM staging_proposals
            WHERE kind = ?
              AND (? IS NULL OR status = ?)
              AND (? IS NULL OR claimed_by = ?)
            ORDER BY created_at ASC, rowid ASC
            LIMIT ? OFFSET ?
            "#
        );
        let status = filter.status.map(|s| s.as_str());

        let rows = sqlx::query_as::<_, ProposalRow>(&sql)
            .bind(filter.kind.as_str())
            .bind(status)
            .bind(status)
            .bind(filter.claimed_by.as_deref())
            .bind(filter.claimed_by.as_deref())
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn ids_with_status(
        &self,
        kind: ProposalKind,
        status: ProposalStatus,
    ) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT id FROM staging_proposals
            WHERE kind = ? AND status = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(kind.as_str())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        ids.iter().map(|id| parse_uuid(id)).collect()
    }

    /// Delete a proposal only while it is IGNORED; returns whether a row went away
    pub async fn delete_ignored(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM staging_proposals WHERE id = ? AND status = 'IGNORED'
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // Lifecycle transitions

    /// Select-and-mark up to `limit` PENDING rows in one statement.
    /// Returns the ids this call actually won.
    pub async fn claim_pending(
        &self,
        kind: ProposalKind,
        limit: i64,
        annotator: &str,
        batch_id: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE staging_proposals
            SET status = 'CLAIMED',
                claimed_by = ?,
                claimed_at = ?,
                lease_expires_at = ?,
                batch_id = ?,
                updated_at = ?
            WHERE id IN (
                SELECT id FROM staging_proposals
                WHERE kind = ? AND status = 'PENDING'
                ORDER BY created_at ASC, rowid ASC
                LIMIT ?
            )
            AND status = 'PENDING'
            RETURNING id
            "#,
        )
        .bind(annotator)
        .bind(now)
        .bind(expires_at)
        .bind(batch_id.to_string())
        .bind(now)
        .bind(kind.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        ids.iter().map(|id| parse_uuid(id)).collect()
    }

    /// Move a CLAIMED row to REVIEWED or IGNORED, clearing its claim.
    /// Returns false when the row was no longer CLAIMED (or no longer owned).
    pub async fn apply_verdict(
        &self,
        id: Uuid,
        verdict: &Verdict,
        annotator: &str,
        now: DateTime<Utc>,
        guard: Option<OwnerGuard<'_>>,
    ) -> Result<bool> {
        let owner = guard.map(|g| g.annotator);
        let not_expired_at = guard.map(|g| g.now);

        let result = sqlx::query(
            r#"
            UPDATE staging_proposals
            SET status = ?,
                final_tag = ?,
                final_risk = ?,
                final_strategy = ?,
                final_extra_condition = ?,
                is_modified = ?,
                annotator = ?,
                annotated_at = ?,
                updated_at = ?,
                claimed_by = NULL,
                claimed_at = NULL,
                lease_expires_at = NULL,
                batch_id = NULL
            WHERE id = ?
              AND status = 'CLAIMED'
              AND (? IS NULL OR claimed_by = ?)
              AND (? IS NULL OR lease_expires_at > ?)
            "#,
        )
        .bind(verdict.status.as_str())
        .bind(verdict.final_tag.as_deref())
        .bind(verdict.final_risk.as_deref())
        .bind(verdict.final_strategy.as_deref())
        .bind(verdict.final_extra_condition.as_deref())
        .bind(verdict.is_modified)
        .bind(annotator)
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .bind(owner)
        .bind(owner)
        .bind(not_expired_at)
        .bind(not_expired_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Return claims of one kind whose lease ended at or before `now`
    pub async fn release_expired(&self, kind: ProposalKind, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE staging_proposals
            SET status = 'PENDING',
                claimed_by = NULL,
                claimed_at = NULL,
                lease_expires_at = NULL,
                batch_id = NULL,
                updated_at = ?
            WHERE kind = ? AND status = 'CLAIMED' AND lease_expires_at <= ?
            "#,
        )
        .bind(now)
        .bind(kind.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Flip a REVIEWED row of `kind` to SYNCED inside the promotion transaction.
    ///
    /// Run first in the transaction: the UPDATE takes the write lock up front,
    /// so a busy database waits on the busy timeout instead of failing a
    /// read-to-write upgrade. Returns false when the row is not REVIEWED.
    pub async fn mark_synced(
        &self,
        conn: &mut SqliteConnection,
        kind: ProposalKind,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE staging_proposals SET status = 'SYNCED', updated_at = ?
            WHERE id = ? AND kind = ? AND status = 'REVIEWED'
            "#,
        )
        .bind(now)
        .bind(id.to_string())
        .bind(kind.as_str())
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // Read-only projections

    pub async fn count_by_status(&self, kind: ProposalKind) -> Result<Vec<(ProposalStatus, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT status, COUNT(*) FROM staging_proposals
            WHERE kind = ?
            GROUP BY status
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, count)| Ok((parse_status(&status)?, count)))
            .collect()
    }

    pub async fn annotator_stats(&self, kind: ProposalKind) -> Result<Vec<AnnotatorStat>> {
        let stats = sqlx::query_as::<_, AnnotatorStat>(
            r#"
            SELECT annotator,
                   COUNT(CASE WHEN status IN ('REVIEWED', 'SYNCED') THEN 1 END) AS reviewed_count,
                   COUNT(CASE WHEN status = 'IGNORED' THEN 1 END) AS ignored_count,
                   COUNT(*) AS total_count
            FROM staging_proposals
            WHERE kind = ? AND annotator IS NOT NULL
            GROUP BY annotator
            ORDER BY annotator ASC
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(stats)
    }

    /// (reviewed, ignored) counts for one annotator
    pub async fn decisions_by(&self, kind: ProposalKind, annotator: &str) -> Result<(i64, i64)> {
        let counts = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(CASE WHEN status IN ('REVIEWED', 'SYNCED') THEN 1 END),
                   COUNT(CASE WHEN status = 'IGNORED' THEN 1 END)
            FROM staging_proposals
            WHERE kind = ? AND annotator = ?
            "#,
        )
        .bind(kind.as_str())
        .bind(annotator)
        .fetch_one(&self.pool)
        .await?;

        Ok(counts)
    }

    /// Lease expiries of everything the annotator currently holds
    pub async fn active_leases(
        &self,
        kind: ProposalKind,
        annotator: &str,
    ) -> Result<Vec<DateTime<Utc>>> {
        let leases = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            r#"
            SELECT lease_expires_at FROM staging_proposals
            WHERE kind = ? AND status = 'CLAIMED' AND claimed_by = ?
            "#,
        )
        .bind(kind.as_str())
        .bind(annotator)
        .fetch_all(&self.pool)
        .await?;

        Ok(leases.into_iter().flatten().collect())
    }
}

async fn fetch_proposal<'e, E>(executor: E, id: Uuid) -> Result<Option<Proposal>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {PROPOSAL_COLUMNS} FROM staging_proposals WHERE id = ?");
    let row = sqlx::query_as::<_, ProposalRow>(&sql)
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;

    row.map(Proposal::try_from).transpose()
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))
}

fn parse_status(value: &str) -> Result<ProposalStatus> {
    value
        .parse()
        .map_err(|e| AppError::Internal(format!("Invalid status: {}", e)))
}

/// Payload values spread over the nullable per-kind columns
struct PayloadColumns<'a> {
    keyword: Option<&'a str>,
    predicted_tag: Option<&'a str>,
    predicted_risk: Option<&'a str>,
    tag_code: Option<&'a str>,
    extra_condition: Option<&'a str>,
    predicted_strategy: Option<&'a str>,
}

impl<'a> PayloadColumns<'a> {
    fn of(payload: &'a ProposalPayload) -> Self {
        match payload {
            ProposalPayload::Keyword(kw) => Self {
                keyword: Some(&kw.keyword),
                predicted_tag: Some(&kw.predicted_tag),
                predicted_risk: Some(&kw.predicted_risk),
                tag_code: None,
                extra_condition: None,
                predicted_strategy: None,
            },
            ProposalPayload::Rule(rule) => Self {
                keyword: None,
                predicted_tag: None,
                predicted_risk: None,
                tag_code: Some(&rule.tag_code),
                extra_condition: rule.extra_condition.as_deref(),
                predicted_strategy: Some(&rule.predicted_strategy),
            },
        }
    }
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct ProposalRow {
    id: String,
    kind: String,
    keyword: Option<String>,
    predicted_tag: Option<String>,
    predicted_risk: Option<String>,
    final_tag: Option<String>,
    final_risk: Option<String>,
    tag_code: Option<String>,
    extra_condition: Option<String>,
    predicted_strategy: Option<String>,
    final_strategy: Option<String>,
    final_extra_condition: Option<String>,
    status: String,
    is_modified: bool,
    claimed_by: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    lease_expires_at: Option<DateTime<Utc>>,
    batch_id: Option<String>,
    annotator: Option<String>,
    annotated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn required(value: Option<String>, column: &str) -> Result<String> {
    value.ok_or_else(|| AppError::Internal(format!("Missing {} column", column)))
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = AppError;

    fn try_from(row: ProposalRow) -> Result<Self> {
        let kind: ProposalKind = row
            .kind
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid kind: {}", e)))?;

        let payload = match kind {
            ProposalKind::Keyword => ProposalPayload::Keyword(KeywordPayload {
                keyword: required(row.keyword, "keyword")?,
                predicted_tag: required(row.predicted_tag, "predicted_tag")?,
                predicted_risk: required(row.predicted_risk, "predicted_risk")?,
                final_tag: row.final_tag,
                final_risk: row.final_risk,
            }),
            ProposalKind::Rule => ProposalPayload::Rule(RulePayload {
                tag_code: required(row.tag_code, "tag_code")?,
                extra_condition: row.extra_condition,
                predicted_strategy: required(row.predicted_strategy, "predicted_strategy")?,
                final_strategy: row.final_strategy,
                final_extra_condition: row.final_extra_condition,
            }),
        };

        let batch_id = row
            .batch_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| AppError::Internal(format!("Invalid batch_id UUID: {}", e)))?;

        Ok(Proposal {
            id: parse_uuid(&row.id)?,
            payload,
            status: parse_status(&row.status)?,
            is_modified: row.is_modified,
            claimed_by: row.claimed_by,
            claimed_at: row.claimed_at,
            lease_expires_at: row.lease_expires_at,
            batch_id,
            annotator: row.annotator,
            annotated_at: row.annotated_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
