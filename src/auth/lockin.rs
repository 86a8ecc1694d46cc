use axum::{debug_handler, extract::{Path, Query}, response::{IntoResponse, Redirect, Response}};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::warn;

use crate::{
    error::ChatError,
    notice::Intent,
    session::{Ctx, CSRF_STATE, PKCE_VERIFIER, RETURN_URL},
    AppResult,
};

use super::{clients::ClientProvider, login::is_local_path, sign_in, AuthGrant};

#[derive(Debug, Default, Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    /// Set by the provider instead of `code`, e.g. `access_denied`.
    pub error: Option<String>,
}

/// Pulls the round-trip secrets out of the session and checks the provider's
/// answer against them. The secrets are consumed whatever the outcome.
async fn take_grant(
    session: &Session,
    provider: ClientProvider,
    LockinQuery { state, code, error }: LockinQuery,
) -> Result<(AuthGrant, Option<String>), ChatError> {
    let stored_state = session.remove::<String>(CSRF_STATE).await.map_err(ChatError::auth)?;
    let pkce_verifier = session.remove::<String>(PKCE_VERIFIER).await.map_err(ChatError::auth)?;
    let return_url = session.remove::<String>(RETURN_URL).await.map_err(ChatError::auth)?;

    if let Some(error) = error {
        return Err(ChatError::Auth(format!("{provider} declined the sign-in ({error})")));
    }
    let (Some(state), Some(code)) = (state, code) else {
        return Err(ChatError::Auth(format!("{provider} sent an incomplete answer")));
    };
    let (Some(stored_state), Some(pkce_verifier)) = (stored_state, pkce_verifier) else {
        return Err(ChatError::Auth("the sign-in took too long, please try again".to_owned()));
    };
    if state != stored_state {
        return Err(ChatError::Auth("the sign-in could not be verified, please try again".to_owned()));
    }

    Ok((AuthGrant { provider, code, pkce_verifier }, return_url))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(query): Query<LockinQuery>,
    mut ctx: Ctx,
) -> AppResult<Response> {
    let session = ctx.browser_session().clone();

    let outcome = match take_grant(&session, provider, query).await {
        Ok((grant, return_url)) => sign_in(&mut ctx, grant).await.map(|()| return_url),
        Err(err) => Err(err),
    };

    let response = match outcome {
        Ok(return_url) => {
            let return_url = return_url.filter(|url| is_local_path(url)).unwrap_or("/".to_string());
            Redirect::to(return_url.as_str())
        }
        Err(err) => {
            warn!(%provider, error = %err, "sign-in callback failed");
            ctx.notices.report(&err, Some(Intent::SignIn(provider)));
            Redirect::to("/login")
        }
    };

    ctx.persist().await?;
    Ok(response.into_response())
}
