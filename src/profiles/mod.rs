mod edit;

use axum::{routing::post, Router};

use crate::AppState;

pub use edit::{submit_name, validate_name, MAX_NAME_LEN};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(edit::submit))
}
