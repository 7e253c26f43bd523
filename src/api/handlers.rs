use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    BatchReviewRequest, ClaimRequest, CreateBatchRequest, CreatedResponse, ImportMockQuery,
    ListQuery, ReviewRequest, ScopeQuery, SyncRequest, TaskTypeQuery,
};
use crate::staging::{
    Actor, AnnotatorStat, BatchReviewOutcome, Capability, ClaimOutcome, MyTaskStats, Proposal,
    ProposalKind, ReleaseOutcome, SyncOutcome, SyncScope, TaskOverview,
};
use crate::store::ProposalFilter;
use crate::AppState;

pub async fn health() -> &'static str {
    "ok"
}

// -- Claims --

pub async fn claim(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<ClaimOutcome>> {
    actor.require(Capability::Claim)?;
    let batch_size = req
        .batch_size
        .unwrap_or(state.manager.settings().max_batch_size);
    let outcome = state
        .manager
        .claim(req.task_type, batch_size, &actor.user_id)
        .await?;
    Ok(Json(outcome))
}

pub async fn release_expired(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<ReleaseOutcome>> {
    actor.require(Capability::Reclaim)?;
    Ok(Json(state.manager.release_expired().await?))
}

// -- Proposals --

pub async fn list_proposals(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(kind): Path<ProposalKind>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Proposal>>> {
    let mut filter = ProposalFilter::new(kind).page(
        query.limit.unwrap_or(0),
        query.offset.unwrap_or(0),
    );
    if let Some(status) = query.status {
        filter = filter.with_status(status);
    }
    if query.mine || !actor.can(Capability::ViewAll) {
        filter = filter.claimed_by(actor.user_id.clone());
    }

    Ok(Json(state.manager.list(filter).await?))
}

pub async fn create_proposals(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(kind): Path<ProposalKind>,
    Json(req): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<Vec<Proposal>>)> {
    actor.require(Capability::Import)?;
    let created = state.manager.create_batch(kind, req.items).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn import_mock(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(kind): Path<ProposalKind>,
    Query(query): Query<ImportMockQuery>,
) -> Result<(StatusCode, Json<CreatedResponse>)> {
    actor.require(Capability::Import)?;
    let created_count = state.manager.import_mock(kind, query.count).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { created_count })))
}

pub async fn get_proposal(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path((kind, id)): Path<(ProposalKind, Uuid)>,
) -> Result<Json<Proposal>> {
    Ok(Json(state.manager.get(kind, id).await?))
}

pub async fn review_proposal(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((kind, id)): Path<(ProposalKind, Uuid)>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<Proposal>> {
    actor.require(Capability::Review)?;
    let proposal = state
        .manager
        .review(kind, id, req.status, &req.fields, &actor.user_id)
        .await?;
    Ok(Json(proposal))
}

pub async fn batch_review(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(kind): Path<ProposalKind>,
    Json(req): Json<BatchReviewRequest>,
) -> Result<Json<BatchReviewOutcome>> {
    actor.require(Capability::Review)?;
    let outcome = state
        .manager
        .review_batch(kind, &req.items, &actor.user_id)
        .await;
    Ok(Json(outcome))
}

pub async fn delete_proposal(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((kind, id)): Path<(ProposalKind, Uuid)>,
) -> Result<StatusCode> {
    actor.require(Capability::Delete)?;
    state.manager.delete(kind, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Promotion --

pub async fn sync(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(kind): Path<ProposalKind>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncOutcome>> {
    actor.require(Capability::Sync)?;
    let scope = SyncScope::from_scenario(req.scenario_id);
    Ok(Json(state.manager.sync(kind, &req.ids, &scope).await))
}

pub async fn sync_all(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(kind): Path<ProposalKind>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<SyncOutcome>> {
    actor.require(Capability::Sync)?;
    let scope = SyncScope::from_scenario(query.scenario_id);
    Ok(Json(state.manager.sync_all(kind, &scope).await?))
}

// -- Statistics --

pub async fn annotator_stats(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Query(query): Query<TaskTypeQuery>,
) -> Result<Json<Vec<AnnotatorStat>>> {
    Ok(Json(state.manager.annotator_stats(query.task_type).await?))
}

pub async fn my_task_stats(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<TaskTypeQuery>,
) -> Result<Json<MyTaskStats>> {
    let stats = state
        .manager
        .my_task_stats(query.task_type, &actor.user_id)
        .await?;
    Ok(Json(stats))
}

pub async fn task_overview(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Query(query): Query<TaskTypeQuery>,
) -> Result<Json<TaskOverview>> {
    Ok(Json(state.manager.task_overview(query.task_type).await?))
}
