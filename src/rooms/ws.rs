use axum::{
    debug_handler,
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{include_res, model::RoomEntry, res::{escape, fill}, session::Ctx, store::Store};

use super::{pipeline::RoomList, preview::Previews};

#[derive(Debug, Deserialize)]
struct SidebarInput {
    search: String,
}

/// Live sidebar: pushes the rendered room list whenever the user's rooms,
/// the search text or a room's latest message change.
#[debug_handler(state = crate::AppState)]
pub async fn sidebar_ws(
    State(store): State<Store>,
    ctx: Ctx,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(uid) = ctx.session.uid().map(str::to_owned) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(async move |socket: WebSocket| {
        let (sender, receiver) = socket.split();
        run_sidebar(store, uid, sender, receiver).await
    })
}

pub(crate) async fn run_sidebar<Tx, Rx, E>(store: Store, uid: String, mut sender: Tx, mut receiver: Rx)
where
    Tx: Sink<WsMessage> + Unpin,
    Rx: Stream<Item = Result<WsMessage, E>> + Unpin,
{
    info!(%uid, "sidebar connected");

    let mut rooms = RoomList::new(store.clone());
    let mut previews = Previews::new(store);
    rooms.set_user(Some(&uid));

    let mut last_sent = None;
    loop {
        let html = render_rooms(rooms.filtered(), &previews);
        if last_sent.as_ref() != Some(&html) {
            if sender.send(WsMessage::Text(html.clone().into())).await.is_err() {
                break;
            }
            last_sent = Some(html);
        }

        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let Ok(input) = serde_json::from_str::<SidebarInput>(text.as_str()) else {
                        debug!(%uid, "ignoring sidebar input");
                        continue;
                    };
                    rooms.set_search(&input.search);
                }
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
            Some(()) = rooms.changed() => {}
            Some(_) = previews.changed() => {}
        }

        let visible: Vec<String> = rooms.filtered().iter().map(|room| room.id.clone()).collect();
        previews.sync(&visible);
    }

    info!(%uid, "sidebar disconnected");
}

pub(crate) fn render_rooms(rooms: &[RoomEntry], previews: &Previews) -> String {
    if rooms.is_empty() {
        return include_res!(str, "/pages/no_rooms.html").to_owned();
    }

    rooms
        .iter()
        .map(|room| {
            let preview = previews.preview(&room.id).unwrap_or_default();
            fill(include_res!(str, "/pages/room_item.html"), &[
                ("id", &escape(&room.id)),
                ("name", &escape(room.data.display_name())),
                ("preview", &escape(&preview)),
            ])
        })
        .collect()
}
