mod new;
pub mod pipeline;
pub mod preview;
mod room;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use new::create_room;
pub use room::{load_room, RoomView};
pub use ws::sidebar_ws;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new", get(new::new_room_page).post(new::new_room))
        .route("/{id}", get(room::room))
}
