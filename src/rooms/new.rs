use axum::{debug_handler, response::{Html, IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    error::ChatError,
    include_res,
    nav::Route,
    res::fill,
    notice::Intent,
    session::{Context, Ctx},
    store::{DocRef, FieldUpdate, ROOMS, USERS},
    AppResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ModalAction {
    Confirm,
    Cancel,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomForm {
    #[serde(default)]
    name: String,
    action: ModalAction,
}

impl NewRoomForm {
    /// The name to create a room with, or `None` if the modal was dismissed.
    fn confirmed_name(self) -> Option<String> {
        match self.action {
            ModalAction::Confirm => Some(self.name),
            ModalAction::Cancel => None,
        }
    }
}

/// Creates a room with the signed-in user as its only member and adds it to
/// their chats. An empty name does nothing.
///
/// The two writes are not atomic. When the membership write fails the room
/// stays behind without any member pointing at it, reported as
/// [`ChatError::OrphanedRoom`].
pub async fn create_room(ctx: &mut Context, name: &str) -> Result<Option<Route>, ChatError> {
    if name.is_empty() {
        return Ok(None);
    }
    let uid = ctx.session.uid().ok_or(ChatError::SignedOut)?;
    let user = DocRef::new(USERS, uid);

    let room = ctx
        .store
        .add(ROOMS, json!({ "name": name, "members": [user.to_string()] }))
        .await
        .map_err(ChatError::Write)?;
    info!(%room, name, "room created");

    ctx.store
        .update(&user, vec![FieldUpdate::array_union("rooms", vec![json!(room.to_string())])])
        .await
        .map_err(|source| {
            warn!(%room, %user, error = %source, "room left without membership");
            ChatError::OrphanedRoom { room: room.clone(), source }
        })?;

    if let Some(mut record) = ctx.session.user().cloned() {
        if !record.rooms.contains(&room) {
            record.rooms.push(room.clone());
        }
        ctx.session.set_user(record);
    }

    Ok(Some(Route::Room(room.id().to_owned())))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_room_page(ctx: Ctx) -> AppResult<Response> {
    if !ctx.session.is_signed_in() {
        return Ok(Redirect::to("/login?return_url=/rooms/new").into_response());
    }

    Ok(Html(
        fill(include_res!(str, "/pages/new_room.html"), &[("notices", &ctx.notices.render())])
    ).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_room(
    mut ctx: Ctx,
    Form(form): Form<NewRoomForm>,
) -> AppResult<Response> {
    let Some(name) = form.confirmed_name() else {
        return Ok(Route::Entry.into_response());
    };

    let response = match create_room(&mut ctx, &name).await {
        Ok(route) => route.unwrap_or(Route::Entry).into_response(),
        Err(err) => {
            ctx.notices.report(&err, Some(Intent::CreateRoom(name)));
            Route::Entry.into_response()
        }
    };

    ctx.persist().await?;
    Ok(response)
}
