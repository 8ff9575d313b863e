//! Management API
//!
//! Owner-session-protected surface; separate from the API-key data plane.

pub mod keys;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route("/keys", get(keys::list_keys))
        .route("/keys", post(keys::create_key))
        .route("/keys/{key_id}/rotate", post(keys::rotate_key))
        .route("/keys/{key_id}/revoke", post(keys::revoke_key))
        .route("/keys/{key_id}/usage", get(keys::key_usage))
}
