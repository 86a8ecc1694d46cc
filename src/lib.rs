pub mod auth;
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod nav;
pub mod notice;
pub mod profiles;
pub mod res;
pub mod rooms;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::anyhow;
use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}, routing::{get, post}, Router};
use serde_json::Value;
use tracing::error;

use auth::{Clients, IdentityProvider};
use store::Store;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub identity: Arc<dyn IdentityProvider>,
    pub clients: Clients,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index::index))
        .route("/style.css", get(res::stylesheet))
        .route("/notices/{id}/dismiss", post(notice::dismiss))
        .route("/notices/{id}/retry", post(notice::retry))

        .merge(auth::router())
        .nest("/rooms", rooms::router())
        .nest("/profile", profiles::router())
        .route("/sidebar/ws", get(rooms::sidebar_ws))
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(anyhow!("expected {field} in {self}"))?
            .as_str()
            .ok_or(anyhow!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        Ok(
            self.get(field)
            .ok_or(anyhow!("expected {field} in {self}"))?
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
