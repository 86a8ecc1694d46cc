//! Dismissible failure notices, each optionally carrying the intent to retry.

use axum::{
    debug_handler,
    extract::Path,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    AppResult, auth,
    auth::ClientProvider,
    error::ChatError,
    include_res,
    nav::Route,
    profiles,
    res::{escape, fill},
    rooms,
    session::Ctx,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Intent {
    SignIn(ClientProvider),
    SignOut,
    SubmitName(String),
    CreateRoom(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub id: u64,
    pub message: String,
    pub retry: Option<Intent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notices {
    next_id: u64,
    items: Vec<Notice>,
}

impl Notices {
    pub fn push(&mut self, message: impl Into<String>, retry: Option<Intent>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.items.push(Notice {
            id,
            message: message.into(),
            retry,
        });
        id
    }

    /// Records a failed intent; validation failures are dropped.
    pub fn report(&mut self, err: &ChatError, retry: Option<Intent>) {
        if err.is_user_visible() {
            self.push(err.to_string(), retry);
        }
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        self.take(id).is_some()
    }

    pub fn take(&mut self, id: u64) -> Option<Notice> {
        let index = self.items.iter().position(|n| n.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(|notice| {
                let id = notice.id.to_string();
                let retry = match notice.retry {
                    Some(_) => fill(include_res!(str, "/pages/notice_retry.html"), &[("id", &id)]),
                    None => String::new(),
                };
                fill(include_res!(str, "/pages/notice.html"), &[
                    ("retry", &retry),
                    ("id", &id),
                    ("message", &escape(&notice.message)),
                ])
            })
            .collect()
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn dismiss(Path(id): Path<u64>, mut ctx: Ctx) -> AppResult<Redirect> {
    ctx.notices.dismiss(id);
    ctx.persist().await?;
    Ok(Redirect::to("/"))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn retry(Path(id): Path<u64>, mut ctx: Ctx) -> AppResult<Response> {
    let Some(notice) = ctx.notices.take(id) else {
        return Ok(Redirect::to("/").into_response());
    };
    let Some(intent) = notice.retry else {
        ctx.persist().await?;
        return Ok(Redirect::to("/").into_response());
    };

    info!(?intent, "retrying");
    let response = match intent {
        // the provider round trip has to start over
        Intent::SignIn(provider) => Redirect::to(&format!("/login/{}", provider.slug())).into_response(),
        Intent::SignOut => auth::sign_out(&mut ctx).await.into_response(),
        Intent::SubmitName(name) => {
            if let Err(err) = profiles::submit_name(&mut ctx, &name).await {
                ctx.notices.report(&err, Some(Intent::SubmitName(name)));
            }
            Route::Entry.into_response()
        }
        Intent::CreateRoom(name) => match rooms::create_room(&mut ctx, &name).await {
            Ok(route) => route.unwrap_or(Route::Entry).into_response(),
            Err(err) => {
                ctx.notices.report(&err, Some(Intent::CreateRoom(name)));
                Route::Entry.into_response()
            }
        },
    };

    ctx.persist().await?;
    Ok(response)
}
