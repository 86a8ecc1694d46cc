use axum::{debug_handler, response::{Html, IntoResponse, Redirect, Response}};

use crate::{include_res, res::{escape, fill}, session::Ctx, AppResult};

/// Sidebar shell. The room list itself arrives over `/sidebar/ws`.
#[debug_handler(state = crate::AppState)]
pub async fn index(ctx: Ctx) -> AppResult<Response> {
    let Some(user) = ctx.session.user() else {
        return Ok(
            Redirect::to("/login")
                .into_response()
        );
    };

    let photo = ctx
        .session
        .identity()
        .and_then(|identity| identity.photo_url.as_deref())
        .or(user.photo_url.as_deref())
        .unwrap_or_default();

    Ok(
        Html(
            fill(include_res!(str, "/pages/index.html"), &[
                ("notices", &ctx.notices.render()),
                ("photo", &escape(photo)),
                ("name", &escape(&user.name)),
            ])
        ).into_response()
    )
}
