//! Per-browser session state and the context handed to every intent.

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use anyhow::anyhow;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{
    AppError, AppResult, AppState,
    auth::IdentityProvider,
    model::{IdentityUser, UserRecord},
    notice::Notices,
    store::Store,
};

pub(crate) const CSRF_STATE: &str = "csrf_state";
pub(crate) const PKCE_VERIFIER: &str = "pkce_verifier";
pub(crate) const RETURN_URL: &str = "return_url";
pub(crate) const SESSION_STATE: &str = "session_state";
pub(crate) const NOTICES: &str = "notices";

/// The signed-in identity and its application record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    identity: Option<IdentityUser>,
    user: Option<UserRecord>,
}

impl SessionState {
    pub fn identity(&self) -> Option<&IdentityUser> {
        self.identity.as_ref()
    }

    pub fn user(&self) -> Option<&UserRecord> {
        self.user.as_ref()
    }

    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.uid.as_str())
    }

    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }

    pub fn set_identity_user(&mut self, identity: IdentityUser) {
        self.identity = Some(identity);
    }

    pub fn set_user(&mut self, user: UserRecord) {
        self.user = Some(user);
    }

    pub fn clear(&mut self) {
        self.identity = None;
        self.user = None;
    }
}

/// Everything an intent may touch: the backends, this browser's session
/// state and its pending notices.
pub struct Context {
    pub store: Store,
    pub identity: Arc<dyn IdentityProvider>,
    pub session: SessionState,
    pub notices: Notices,
}

impl Context {
    pub fn new(store: Store, identity: Arc<dyn IdentityProvider>) -> Self {
        Context {
            store,
            identity,
            session: SessionState::default(),
            notices: Notices::default(),
        }
    }
}

/// Extracts a [`Context`] from the request's session; changes are kept only
/// after [`Ctx::persist`].
pub struct Ctx {
    context: Context,
    browser: Session,
}

impl Ctx {
    pub async fn persist(&self) -> AppResult<()> {
        self.browser.insert(SESSION_STATE, &self.context.session).await?;
        self.browser.insert(NOTICES, &self.context.notices).await?;
        Ok(())
    }

    pub fn browser_session(&self) -> &Session {
        &self.browser
    }
}

impl Deref for Ctx {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.context
    }
}

impl DerefMut for Ctx {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.context
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let browser = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| anyhow!(msg))?;
        let app = AppState::from_ref(state);

        let mut context = Context::new(app.store, app.identity);
        context.session = browser.get(SESSION_STATE).await?.unwrap_or_default();
        context.notices = browser.get(NOTICES).await?.unwrap_or_default();

        Ok(Ctx { context, browser })
    }
}
