use axum::{debug_handler, response::IntoResponse};

use crate::{session::Ctx, AppResult};

use super::sign_out;

#[debug_handler(state = crate::AppState)]
pub(crate) async fn logout(mut ctx: Ctx) -> AppResult<impl IntoResponse> {
    let route = sign_out(&mut ctx).await;
    ctx.persist().await?;
    Ok(route)
}
