use axum::response::{IntoResponse, Redirect, Response};

/// Screens a user intent can navigate to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Entry,
    Room(String),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Entry => "/".to_owned(),
            Route::Room(id) => format!("/rooms/{id}"),
        }
    }
}

impl IntoResponse for Route {
    fn into_response(self) -> Response {
        Redirect::to(&self.path()).into_response()
    }
}
