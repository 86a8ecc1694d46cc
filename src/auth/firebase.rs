use async_trait::async_trait;
use oauth2::{AuthorizationCode, PkceCodeVerifier, TokenResponse};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::ChatError, model::IdentityUser};

use super::{AuthGrant, Clients, IdentityProvider};

const IDENTITY_TOOLKIT: &str = "https://identitytoolkit.googleapis.com/v1";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest<'a> {
    id_token: &'a str,
    display_name: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    display_name: Option<String>,
    photo_url: Option<String>,
    email: Option<String>,
    id_token: Option<String>,
}

impl AccountResponse {
    fn into_user(self, previous: Option<&IdentityUser>) -> IdentityUser {
        IdentityUser {
            uid: self.local_id,
            display_name: self.display_name,
            photo_url: self.photo_url.or_else(|| previous.and_then(|p| p.photo_url.clone())),
            email: self.email.or_else(|| previous.and_then(|p| p.email.clone())),
            id_token: self.id_token.or_else(|| previous.and_then(|p| p.id_token.clone())),
        }
    }
}

/// OAuth sign-in bridged into a Firebase identity through the identity
/// toolkit REST API.
pub struct FirebaseIdentity {
    clients: Clients,
    http_client: reqwest::Client,
}

impl FirebaseIdentity {
    pub fn new(clients: Clients) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(FirebaseIdentity { clients, http_client })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{IDENTITY_TOOLKIT}/accounts:{method}?key={}", self.clients.firebase_apikey)
    }

    async fn call<B: Serialize + Sync>(&self, method: &str, body: &B) -> Result<AccountResponse, ChatError> {
        self.http_client
            .post(self.endpoint(method))
            .json(body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(ChatError::auth)?
            .json()
            .await
            .map_err(ChatError::auth)
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn sign_in(&self, grant: AuthGrant) -> Result<IdentityUser, ChatError> {
        let client = self.clients.get_client(grant.provider).map_err(|err| ChatError::auth(err.0))?;
        let token_result = client
            .exchange_code(AuthorizationCode::new(grant.code))
            .set_pkce_verifier(PkceCodeVerifier::new(grant.pkce_verifier))
            .request_async(&self.http_client)
            .await
            .map_err(ChatError::auth)?;

        let access_token = token_result.access_token().secret();
        let account = self
            .call("signInWithIdp", &SignInWithIdpRequest {
                post_body: format!("access_token={access_token}&providerId={}", grant.provider.id()),
                request_uri: "http://localhost/".to_owned(),
                return_idp_credential: true,
                return_secure_token: true,
            })
            .await?;

        Ok(account.into_user(None))
    }

    async fn sign_out(&self, user: &IdentityUser) -> Result<(), ChatError> {
        // identity toolkit tokens are stateless; forgetting them is the sign-out
        debug!(uid = %user.uid, "dropping identity token");
        Ok(())
    }

    async fn update_display_name(&self, user: &IdentityUser, name: &str) -> Result<IdentityUser, ChatError> {
        let id_token = user
            .id_token
            .as_deref()
            .ok_or_else(|| ChatError::Auth("session has no identity token".to_owned()))?;

        let account = self
            .call("update", &UpdateProfileRequest {
                id_token,
                display_name: name,
                return_secure_token: true,
            })
            .await?;

        Ok(account.into_user(Some(user)))
    }
}
