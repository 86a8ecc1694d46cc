use axum::{debug_handler, extract::{Path, Query, State}, response::{Html, IntoResponse, Redirect, Response}};
use oauth2::{CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;

use crate::{include_res, res::{escape, fill}, session::{Ctx, CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppResult};

use super::{clients::ClientProvider, Clients};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) return_url: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login_page(
    State(clients): State<Clients>,
    ctx: Ctx,
) -> AppResult<Response> {
    if ctx.session.is_signed_in() {
        return Ok(Redirect::to("/").into_response());
    }

    let providers: String = clients
        .providers()
        .into_iter()
        .map(|provider| {
            fill(include_res!(str, "/pages/provider_button.html"), &[
                ("slug", provider.slug()),
                ("name", &escape(&provider.to_string())),
            ])
        })
        .collect();

    Ok(Html(
        fill(include_res!(str, "/pages/login.html"), &[
            ("notices", &ctx.notices.render()),
            ("providers", &providers),
        ])
    ).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login(
    Path(provider): Path<ClientProvider>,
    Query(LoginQuery { return_url }): Query<LoginQuery>,
    State(clients): State<Clients>,
    ctx: Ctx,
) -> AppResult<Response> {
    let client = clients.get_client(provider)?;
    
    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new("openid".to_string()))
        .add_scope(Scope::new("profile".to_string()))
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    let session = ctx.browser_session();
    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;
    if let Some(return_url) = return_url.filter(|url| is_local_path(url)) {
        session.insert(RETURN_URL, return_url).await?;
    }

    Ok(Redirect::to(authorize_url.as_str()).into_response())
}

/// Only same-site paths are accepted as post-login destinations.
pub(crate) fn is_local_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains('\\')
}
