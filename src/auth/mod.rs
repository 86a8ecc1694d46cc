use async_trait::async_trait;
use axum::{routing::get, Router};
use rand::seq::IndexedRandom;
use tracing::{info, warn};

use crate::{
    error::ChatError,
    model::{IdentityUser, UserRecord},
    nav::Route,
    notice::Intent,
    session::Context,
    store::{DocRef, Store, StoreError, USERS},
    AppState,
};

mod clients;
mod firebase;
mod login;
mod lockin;
mod logout;

pub use clients::{ClientProvider, Clients};
pub use firebase::FirebaseIdentity;

/// Result of the interactive part of a sign-in, ready to be exchanged.
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub provider: ClientProvider,
    pub code: String,
    pub pkce_verifier: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, grant: AuthGrant) -> Result<IdentityUser, ChatError>;

    async fn sign_out(&self, user: &IdentityUser) -> Result<(), ChatError>;

    async fn update_display_name(&self, user: &IdentityUser, name: &str) -> Result<IdentityUser, ChatError>;
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::login_page))
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", get(logout::logout))
}

fn random_alias() -> String {
    let adjectives = [
        "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy", "Sad",
        "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Dark", "Lucky",
        ];

    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
        "Falcon", "Hawk", "Shark", "Panda", "Kitten", "Puppy", "Phoenix", "Griffin",
        "Unicorn", "Turtle", "Dolphin", "Whale", "Elephant", "Giraffe", "Zebra",
    ];

    let mut rng = rand::rng();
    format!(
        "{} {}",
        adjectives.choose(&mut rng).unwrap_or(&"Nameless"),
        nouns.choose(&mut rng).unwrap_or(&"User"),
    )
}

/// Loads `users/{uid}`, creating it on first sign-in.
pub(crate) async fn ensure_user_record(store: &Store, identity: &IdentityUser) -> Result<UserRecord, ChatError> {
    let doc = DocRef::new(USERS, identity.uid.as_str());
    if let Some(existing) = store.get(&doc).await.map_err(ChatError::Read)? {
        return existing.decode().map_err(ChatError::Read);
    }

    let record = UserRecord {
        name: identity.display_name.clone().filter(|n| !n.is_empty()).unwrap_or_else(random_alias),
        google_uid: identity.uid.clone(),
        photo_url: identity.photo_url.clone(),
        rooms: vec![],
    };
    info!(uid = %identity.uid, name = %record.name, "creating user record");
    let data = serde_json::to_value(&record).map_err(|source| {
        ChatError::Write(StoreError::Malformed { path: doc.to_string(), source })
    })?;
    store.set(&doc, data).await.map_err(ChatError::Write)?;

    Ok(record)
}

/// Completes a sign-in. Session state only changes once both the identity
/// and its record are in hand.
pub async fn sign_in(ctx: &mut Context, grant: AuthGrant) -> Result<(), ChatError> {
    let provider = grant.provider;
    let identity = ctx.identity.sign_in(grant).await.inspect_err(|err| {
        warn!(%provider, error = %err, "sign-in failed");
    })?;
    let record = ensure_user_record(&ctx.store, &identity).await?;

    info!(uid = %identity.uid, %provider, "signed in");
    ctx.session.set_identity_user(identity);
    ctx.session.set_user(record);
    Ok(())
}

/// Signs out and returns to the entry screen. Local state is cleared even
/// when the provider call fails; that failure becomes a notice.
pub async fn sign_out(ctx: &mut Context) -> Route {
    if let Some(identity) = ctx.session.identity().cloned() {
        if let Err(err) = ctx.identity.sign_out(&identity).await {
            warn!(uid = %identity.uid, error = %err, "provider sign-out failed");
            ctx.notices.report(&err, Some(Intent::SignOut));
        } else {
            info!(uid = %identity.uid, "signed out");
        }
    }

    ctx.session.clear();
    Route::Entry
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{identity_user, FakeIdentity, TestBackend};

    fn grant() -> AuthGrant {
        AuthGrant {
            provider: ClientProvider::Google,
            code: "code".into(),
            pkce_verifier: "verifier".into(),
        }
    }

    #[tokio::test]
    async fn first_sign_in_creates_record() {
        let backend = TestBackend::new(FakeIdentity::new(identity_user("u1", Some("Ada")))).await;
        let mut ctx = backend.context();

        sign_in(&mut ctx, grant()).await.unwrap();

        assert_eq!(ctx.session.uid(), Some("u1"));
        assert_eq!(ctx.session.user().unwrap().name, "Ada");
        let stored = backend.store.get(&DocRef::new(USERS, "u1")).await.unwrap().unwrap();
        assert_eq!(stored.data["name"], "Ada");
        assert_eq!(stored.data["rooms"], json!([]));
    }

    #[tokio::test]
    async fn existing_record_is_reused() {
        let backend = TestBackend::new(FakeIdentity::new(identity_user("u1", Some("Ada")))).await;
        backend
            .store
            .set(
                &DocRef::new(USERS, "u1"),
                json!({ "name": "Countess", "google_uid": "u1", "rooms": ["rooms/r1"] }),
            )
            .await
            .unwrap();
        let mut ctx = backend.context();

        sign_in(&mut ctx, grant()).await.unwrap();

        let user = ctx.session.user().unwrap();
        assert_eq!(user.name, "Countess");
        assert_eq!(user.rooms, vec![DocRef::new("rooms", "r1")]);
    }

    #[tokio::test]
    async fn nameless_identity_gets_an_alias() {
        let backend = TestBackend::new(FakeIdentity::new(identity_user("u1", None))).await;
        let mut ctx = backend.context();

        sign_in(&mut ctx, grant()).await.unwrap();
        assert!(!ctx.session.user().unwrap().name.is_empty());
    }

    #[tokio::test]
    async fn failed_sign_in_leaves_session_alone() {
        let identity = FakeIdentity::new(identity_user("u1", Some("Ada")));
        identity.fail_sign_in(true);
        let backend = TestBackend::new(identity).await;
        let mut ctx = backend.context();

        let err = sign_in(&mut ctx, grant()).await.unwrap_err();
        assert!(matches!(err, ChatError::Auth(_)));
        assert!(!ctx.session.is_signed_in());
        assert!(ctx.session.user().is_none());
    }

    #[tokio::test]
    async fn sign_out_always_clears_and_returns_to_entry() {
        let identity = FakeIdentity::new(identity_user("u1", Some("Ada")));
        let backend = TestBackend::new(identity).await;
        let mut ctx = backend.context();

        // signed out already
        assert_eq!(sign_out(&mut ctx).await, Route::Entry);

        sign_in(&mut ctx, grant()).await.unwrap();
        backend.identity.fail_sign_out(true);
        assert_eq!(sign_out(&mut ctx).await, Route::Entry);
        assert!(!ctx.session.is_signed_in());
        assert!(ctx.session.user().is_none());
        assert_eq!(ctx.notices.iter().count(), 1);
        assert_eq!(backend.identity.sign_outs(), 1);
    }
}
