use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use rouse_types::api::{FriendRequestQuery, FriendRequestResponse, FriendResponse, SendFriendRequest};
use rouse_types::error::DomainError;
use rouse_types::models::Relationship;

use crate::auth::AppState;
use crate::error::{ApiResult, blocking};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::Identity;

pub async fn send_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiJson(req): ApiJson<SendFriendRequest>,
) -> ApiResult<impl IntoResponse> {
    let relationship = blocking(move || {
        let receiver_id = match (req.receiver_id, req.username) {
            (Some(id), None) => id,
            (None, Some(username)) => state.users.find_by_username(&username)?.id,
            _ => {
                return Err(DomainError::InvalidInput(
                    "exactly one of receiver_id or username is required".into(),
                ));
            }
        };
        state.relationships.send(identity.user_id, receiver_id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(relationship)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiQuery(query): ApiQuery<FriendRequestQuery>,
) -> ApiResult<Json<Vec<FriendRequestResponse>>> {
    let requests = blocking(move || {
        state
            .relationships
            .list_friend_requests(identity.user_id, query.direction)
    })
    .await?;

    Ok(Json(
        requests
            .into_iter()
            .map(|r| FriendRequestResponse {
                relationship: r.relationship,
                counterpart: r.counterpart,
            })
            .collect(),
    ))
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Relationship>> {
    let relationship = blocking(move || state.relationships.accept(id, identity.user_id)).await?;
    Ok(Json(relationship))
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Relationship>> {
    let relationship = blocking(move || state.relationships.reject(id, identity.user_id)).await?;
    Ok(Json(relationship))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<FriendResponse>>> {
    let friends = blocking(move || state.relationships.list_friends(identity.user_id)).await?;

    Ok(Json(
        friends
            .into_iter()
            .map(|f| FriendResponse {
                relationship_id: f.relationship_id,
                user: f.user,
                friends_since: f.since,
            })
            .collect(),
    ))
}

pub async fn get_relationship(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Relationship>> {
    let relationship = blocking(move || state.relationships.get(id, identity.user_id)).await?;
    Ok(Json(relationship))
}

/// Logical removal. Also lifts a block when called by the blocker.
pub async fn remove(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    blocking(move || state.relationships.remove(id, identity.user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn block(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Relationship>> {
    let relationship = blocking(move || state.relationships.block(id, identity.user_id)).await?;
    Ok(Json(relationship))
}

pub async fn block_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> ApiResult<Json<Relationship>> {
    let relationship =
        blocking(move || state.relationships.block_user(identity.user_id, user_id)).await?;
    Ok(Json(relationship))
}
