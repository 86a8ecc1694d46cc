use axum::{debug_handler, extract::Path, response::{Html, IntoResponse, Redirect, Response}};

use crate::{
    error::ChatError,
    include_res,
    model::{Message, RoomData},
    res::{self, escape, fill},
    session::{Context, Ctx},
    store::{DocRef, Direction, Query, MESSAGES, ROOMS, USERS},
    AppResult,
};

/// A room the signed-in user belongs to, with its messages oldest first.
pub struct RoomView {
    pub id: String,
    pub data: RoomData,
    pub messages: Vec<Message>,
}

/// `None` when the room does not exist or the user is not one of its members.
pub async fn load_room(ctx: &Context, room_id: &str) -> Result<Option<RoomView>, ChatError> {
    let Some(uid) = ctx.session.uid() else {
        return Ok(None);
    };
    let room = DocRef::new(ROOMS, room_id);
    let Some(doc) = ctx.store.get(&room).await.map_err(ChatError::Read)? else {
        return Ok(None);
    };

    let data = RoomData::from_value(&doc.data);
    if !data.members.contains(&DocRef::new(USERS, uid)) {
        return Ok(None);
    }

    let messages = ctx
        .store
        .query(&Query::collection(room.child(MESSAGES)).order_by("timestamp", Direction::Ascending))
        .await
        .map_err(ChatError::Read)?
        .iter()
        .filter_map(|doc| doc.decode().ok())
        .collect();

    Ok(Some(RoomView { id: room_id.to_owned(), data, messages }))
}

pub(crate) fn message_to_html(message: &Message) -> String {
    let mut content_html = String::new();
    // raw html in messages is shown as text
    let events = pulldown_cmark::Parser::new(&message.content).map(|event| match event {
        pulldown_cmark::Event::Html(html) | pulldown_cmark::Event::InlineHtml(html) => {
            pulldown_cmark::Event::Text(html)
        }
        event => event,
    });
    pulldown_cmark::html::push_html(&mut content_html, events);

    fill(include_res!(str, "/pages/rooms/message.html"), &[
        ("timestamp", &message.timestamp.to_string()),
        ("name", &escape(&message.name)),
        ("content", &content_html),
    ])
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room(
    Path(room_id): Path<String>,
    ctx: Ctx,
) -> AppResult<Response> {
    if !ctx.session.is_signed_in() {
        return Ok(Redirect::to(&format!("/login?return_url=/rooms/{room_id}")).into_response());
    }

    let Some(view) = load_room(&ctx, &room_id).await? else {
        return Ok(res::sorry("room"));
    };

    let messages: String = view.messages.iter().map(message_to_html).collect();

    let body = fill(include_res!(str, "/pages/rooms/room.html"), &[
        ("room_id", &escape(&view.id)),
        ("messages", &messages),
        ("room_name", &escape(view.data.display_name())),
    ]);

    Ok(Html(body).into_response())
}
