pub mod handlers;
pub mod mac;
pub mod provisioner;
pub mod types;

use axum::{routing::post, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/device-users/login", post(handlers::device_login_handler))
        .route("/device-users/enroll", post(handlers::enroll_handler))
}
