use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use rouse_core::MorningCallChanges;
use rouse_types::api::{CreateMorningCallRequest, UpdateMorningCallRequest};
use rouse_types::models::MorningCall;

use crate::auth::AppState;
use crate::error::{ApiResult, blocking};
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::Identity;

pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiJson(req): ApiJson<CreateMorningCallRequest>,
) -> ApiResult<impl IntoResponse> {
    let call = blocking(move || {
        state.morning_calls.create(
            identity.user_id,
            req.receiver_id,
            req.scheduled_time,
            req.message,
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(call)))
}

pub async fn list_sent(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<MorningCall>>> {
    let calls = blocking(move || state.morning_calls.list_sent(identity.user_id)).await?;
    Ok(Json(calls))
}

pub async fn list_received(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<MorningCall>>> {
    let calls = blocking(move || state.morning_calls.list_received(identity.user_id)).await?;
    Ok(Json(calls))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<MorningCall>> {
    let call = blocking(move || state.morning_calls.get(id, identity.user_id)).await?;
    Ok(Json(call))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateMorningCallRequest>,
) -> ApiResult<Json<MorningCall>> {
    let changes = MorningCallChanges {
        scheduled_time: req.scheduled_time,
        message: req.message,
    };
    let call = blocking(move || state.morning_calls.update(id, identity.user_id, changes)).await?;
    Ok(Json(call))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<MorningCall>> {
    let call = blocking(move || state.morning_calls.cancel(id, identity.user_id)).await?;
    Ok(Json(call))
}

pub async fn confirm(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<MorningCall>> {
    let call = blocking(move || state.morning_calls.confirm_wake(id, identity.user_id)).await?;
    Ok(Json(call))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    blocking(move || state.morning_calls.delete(id, identity.user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
