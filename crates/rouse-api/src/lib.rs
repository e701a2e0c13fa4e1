pub mod auth;
pub mod error;
pub mod extract;
pub mod friends;
pub mod middleware;
pub mod morning_calls;


use axum::{
    Router,
    routing::{get, post},
};

use crate::auth::AppState;
use crate::middleware::require_session;

/// Every HTTP route. Everything except register and login requires a session.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout-all", post(auth::logout_all))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/password", post(auth::change_password))
        .route("/me", get(auth::me))
        .route("/sessions", get(auth::list_sessions))
        .route(
            "/friends/requests",
            post(friends::send_request).get(friends::list_requests),
        )
        .route("/friends/requests/{id}/accept", post(friends::accept))
        .route("/friends/requests/{id}/reject", post(friends::reject))
        .route("/friends", get(friends::list_friends))
        .route(
            "/relationships/{id}",
            get(friends::get_relationship).delete(friends::remove),
        )
        .route("/relationships/{id}/block", post(friends::block))
        .route("/users/{user_id}/block", post(friends::block_user))
        .route("/morning-calls", post(morning_calls::create))
        .route("/morning-calls/sent", get(morning_calls::list_sent))
        .route("/morning-calls/received", get(morning_calls::list_received))
        .route(
            "/morning-calls/{id}",
            get(morning_calls::get)
                .patch(morning_calls::update)
                .delete(morning_calls::delete),
        )
        .route("/morning-calls/{id}/cancel", post(morning_calls::cancel))
        .route("/morning-calls/{id}/confirm", post(morning_calls::confirm))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
