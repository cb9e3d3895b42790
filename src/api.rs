//! HTTP routes over the dossier store

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    Caller, Comment, CommentView, CreateCommentRequest, CreateDossierRequest, Dossier,
    DossierDetail, DossierStatus, DossierSummary, ListQuery, UpdateDossierRequest,
};
use crate::AppState;

/// Header carrying the id of the authenticated user, set by the access layer
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/dossiers", post(create_dossier))
        .route("/dossiers/made", get(list_made))
        .route("/dossiers/received", get(list_received))
        .route("/dossiers/pending", get(list_pending))
        .route("/dossiers/in-process", get(list_in_process))
        .route("/dossiers/released", get(list_released))
        .route(
            "/dossiers/:id",
            get(get_dossier).put(update_dossier).delete(delete_dossier),
        )
        .route("/dossiers/:id/accept", patch(accept_dossier))
        .route("/dossiers/:id/comments", post(create_comment))
        .route("/dossiers/:id/comments/:category", get(list_comments))
        .with_state(state)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthenticated("Missing user identity".to_string()))?;

        let user_id = header
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(|| AppError::Unauthenticated("Malformed user identity".to_string()))?;

        state.directory.caller(user_id).await
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn create_dossier(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CreateDossierRequest>,
) -> Result<(StatusCode, Json<Dossier>)> {
    let dossier = state.store.create(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(dossier)))
}

async fn get_dossier(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<DossierDetail>> {
    Ok(Json(state.store.get(&caller, id).await?))
}

async fn update_dossier(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDossierRequest>,
) -> Result<Json<Dossier>> {
    Ok(Json(state.store.update(&caller, id, req).await?))
}

async fn delete_dossier(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.store.delete(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptResponse {
    dossier_id: Uuid,
    status: DossierStatus,
}

async fn accept_dossier(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<AcceptResponse>> {
    let status = state.store.accept(&caller, id).await?;
    Ok(Json(AcceptResponse {
        dossier_id: id,
        status,
    }))
}

async fn list_made(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DossierSummary>>> {
    Ok(Json(state.store.list_made(&caller, &query).await?))
}

async fn list_received(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DossierSummary>>> {
    Ok(Json(state.store.list_received(&caller, &query, None).await?))
}

async fn list_pending(
    state: State<Arc<AppState>>,
    caller: Caller,
    query: Query<ListQuery>,
) -> Result<Json<Vec<DossierSummary>>> {
    queue(state, caller, query, DossierStatus::Pending).await
}

async fn list_in_process(
    state: State<Arc<AppState>>,
    caller: Caller,
    query: Query<ListQuery>,
) -> Result<Json<Vec<DossierSummary>>> {
    queue(state, caller, query, DossierStatus::InProcess).await
}

async fn list_released(
    state: State<Arc<AppState>>,
    caller: Caller,
    query: Query<ListQuery>,
) -> Result<Json<Vec<DossierSummary>>> {
    queue(state, caller, query, DossierStatus::Released).await
}

async fn queue(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<ListQuery>,
    status: DossierStatus,
) -> Result<Json<Vec<DossierSummary>>> {
    Ok(Json(
        state
            .store
            .list_received(&caller, &query, Some(status))
            .await?,
    ))
}

async fn create_comment(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>)> {
    let comment = state.store.create_comment(&caller, id, req).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn list_comments(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((id, category)): Path<(Uuid, String)>,
) -> Result<Json<Vec<CommentView>>> {
    Ok(Json(
        state.store.list_comments(&caller, id, &category).await?,
    ))
}
