//! Fakes shared by the unit tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, request, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_sessions::{MemoryStore, SessionManagerLayer};

use crate::{
    AppState,
    auth::{AuthGrant, Clients, IdentityProvider},
    error::ChatError,
    model::IdentityUser,
    session::Context,
    store::{
        Change, DocRef, Document, DocumentStore, FieldUpdate, Query, SqliteStore, Store,
        StoreError, StoreResult,
    },
};

pub(crate) fn identity_user(uid: &str, name: Option<&str>) -> IdentityUser {
    IdentityUser {
        uid: uid.to_owned(),
        display_name: name.map(str::to_owned),
        photo_url: None,
        email: None,
        id_token: Some(format!("token-{uid}")),
    }
}

pub(crate) struct FakeIdentity {
    user: IdentityUser,
    fail_sign_in: AtomicBool,
    fail_sign_out: AtomicBool,
    fail_update: AtomicBool,
    sign_outs: AtomicUsize,
    display_names: Mutex<Vec<String>>,
}

impl FakeIdentity {
    pub(crate) fn new(user: IdentityUser) -> Self {
        FakeIdentity {
            user,
            fail_sign_in: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            sign_outs: AtomicUsize::new(0),
            display_names: Mutex::new(vec![]),
        }
    }

    pub(crate) fn fail_sign_in(&self, fail: bool) {
        self.fail_sign_in.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    /// Every display name pushed to the provider, in order.
    pub(crate) fn display_names(&self) -> Vec<String> {
        self.display_names.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in(&self, _grant: AuthGrant) -> Result<IdentityUser, ChatError> {
        if self.fail_sign_in.load(Ordering::SeqCst) {
            return Err(ChatError::Auth("popup closed by user".into()));
        }
        Ok(self.user.clone())
    }

    async fn sign_out(&self, _user: &IdentityUser) -> Result<(), ChatError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(ChatError::Auth("network unreachable".into()));
        }
        Ok(())
    }

    async fn update_display_name(&self, user: &IdentityUser, name: &str) -> Result<IdentityUser, ChatError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(ChatError::Auth("token expired".into()));
        }
        self.display_names.lock().unwrap().push(name.to_owned());
        Ok(IdentityUser {
            display_name: Some(name.to_owned()),
            ..user.clone()
        })
    }
}

/// In-memory SQLite store with switchable write failures and a query counter.
pub(crate) struct FlakyStore {
    inner: SqliteStore,
    fail_add: AtomicBool,
    fail_update: AtomicBool,
    queries: AtomicUsize,
}

impl FlakyStore {
    pub(crate) async fn new() -> Self {
        FlakyStore {
            inner: SqliteStore::in_memory().await.unwrap(),
            fail_add: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fail_add(&self, fail: bool) {
        self.fail_add.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

fn injected() -> StoreError {
    StoreError::Database(sqlx::Error::Protocol("injected failure".into()))
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, doc: &DocRef) -> StoreResult<Option<Document>> {
        self.inner.get(doc).await
    }

    async fn set(&self, doc: &DocRef, data: Value) -> StoreResult<()> {
        self.inner.set(doc, data).await
    }

    async fn add(&self, collection: &str, data: Value) -> StoreResult<DocRef> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.add(collection, data).await
    }

    async fn update(&self, doc: &DocRef, updates: Vec<FieldUpdate>) -> StoreResult<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.update(doc, updates).await
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(query).await
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.inner.changes()
    }
}

pub(crate) struct TestBackend {
    pub(crate) flaky: Arc<FlakyStore>,
    pub(crate) store: Store,
    pub(crate) identity: Arc<FakeIdentity>,
}

impl TestBackend {
    pub(crate) async fn new(identity: FakeIdentity) -> Self {
        let flaky = Arc::new(FlakyStore::new().await);
        TestBackend {
            store: flaky.clone(),
            flaky,
            identity: Arc::new(identity),
        }
    }

    pub(crate) fn context(&self) -> Context {
        Context::new(self.store.clone(), self.identity.clone())
    }

    /// A context already holding the fake identity and its stored record.
    pub(crate) async fn signed_in(&self) -> Context {
        let mut ctx = self.context();
        let identity = self.identity.user.clone();
        let record = crate::auth::ensure_user_record(&self.store, &identity).await.unwrap();
        ctx.session.set_identity_user(identity);
        ctx.session.set_user(record);
        ctx
    }
}

/// A response reduced to what the page tests look at.
#[derive(Debug)]
pub(crate) struct Page {
    pub(crate) status: StatusCode,
    pub(crate) location: Option<String>,
    pub(crate) body: String,
}

impl Page {
    pub(crate) fn redirects_to(&self, path: &str) -> bool {
        self.status == StatusCode::SEE_OTHER && self.location.as_deref() == Some(path)
    }
}

/// Drives the full router in-process, carrying the session cookie between
/// requests the way a browser would.
pub(crate) struct Browser {
    app: Router,
    cookie: Option<String>,
}

impl Browser {
    pub(crate) fn new(backend: &TestBackend) -> Self {
        let clients = Clients::from_json(
            json!({
                "firebase": { "apikey": "k" },
                "google": { "client_id": "id", "client_secret": "secret" },
            }),
            "http://localhost:8080",
        )
        .unwrap();
        let state = AppState {
            store: backend.store.clone(),
            identity: backend.identity.clone(),
            clients,
        };
        let app = crate::router()
            .with_state(state)
            .layer(SessionManagerLayer::new(MemoryStore::default()).with_secure(false));

        Browser { app, cookie: None }
    }

    pub(crate) async fn get(&mut self, uri: &str) -> Page {
        self.send(Request::builder().uri(uri), Body::empty()).await
    }

    pub(crate) async fn post_form(&mut self, uri: &str, form: &str) -> Page {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(request, Body::from(form.to_owned())).await
    }

    /// Runs the provider round trip against the fake identity.
    pub(crate) async fn sign_in(&mut self) -> Page {
        let start = self.get("/login/google").await;
        let authorize = reqwest::Url::parse(start.location.as_deref().unwrap()).unwrap();
        let (_, state) = authorize.query_pairs().find(|(key, _)| key == "state").unwrap();
        self.get(&format!("/lockin/google?state={state}&code=c")).await
    }

    async fn send(&mut self, request: request::Builder, body: Body) -> Page {
        let request = match &self.cookie {
            Some(cookie) => request.header(header::COOKIE, cookie),
            None => request,
        };
        let response = self.app.clone().oneshot(request.body(body).unwrap()).await.unwrap();

        if let Some(cookie) = response.headers().get(header::SET_COOKIE) {
            let cookie = cookie.to_str().unwrap();
            self.cookie = Some(cookie.split(';').next().unwrap().to_owned());
        }
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|value| value.to_str().unwrap().to_owned());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        Page { status, location, body: String::from_utf8(body.to_vec()).unwrap() }
    }
}
