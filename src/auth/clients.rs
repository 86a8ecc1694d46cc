use std::fmt;

use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppResult, GetField};

pub(crate) type HappyClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    /// Provider id understood by the identity toolkit.
    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    /// Path segment used in `/login/{provider}`.
    pub fn slug(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

struct ProviderEndpoints {
    key: &'static str,
    auth_url: &'static str,
    token_url: &'static str,
}

const GOOGLE: ProviderEndpoints = ProviderEndpoints {
    key: "google",
    auth_url: "https://accounts.google.com/o/oauth2/auth",
    token_url: "https://oauth2.googleapis.com/token",
};

const GITHUB: ProviderEndpoints = ProviderEndpoints {
    key: "github",
    auth_url: "https://github.com/login/oauth/authorize",
    token_url: "https://github.com/login/oauth/access_token",
};

/// OAuth clients per provider plus the identity toolkit key they sign into.
#[derive(Clone)]
pub struct Clients {
    pub(crate) firebase_apikey: String,
    google_client: Option<HappyClient>,
    github_client: Option<HappyClient>,
}

impl Clients {
    /// Reads `client_secret.json`: `firebase.apikey` is required, `google`
    /// and `github` sections (`client_id`, `client_secret`) are optional.
    pub fn from_json(json: Value, public_url: &str) -> AppResult<Clients> {
        let firebase_apikey = json.get_obj_field("firebase")?.get_str_field("apikey")?;
        let google_client = Self::client(&json, &GOOGLE, public_url)?;
        let github_client = Self::client(&json, &GITHUB, public_url)?;

        Ok(
            Clients {
                firebase_apikey,
                google_client,
                github_client,
            }
        )
    }

    fn client(json: &Value, endpoints: &ProviderEndpoints, public_url: &str) -> AppResult<Option<HappyClient>> {
        let Some(json) = json.get(endpoints.key) else {
            return Ok(None);
        };
        let client_id = ClientId::new(json.get_str_field("client_id")?);
        let client_secret = ClientSecret::new(json.get_str_field("client_secret")?);

        let auth_url = AuthUrl::new(endpoints.auth_url.to_string())?;
        let token_url = TokenUrl::new(endpoints.token_url.to_string())?;
        let redirect_url = RedirectUrl::new(format!(
            "{}/lockin/{}",
            public_url.trim_end_matches('/'),
            endpoints.key
        ))?;

        Ok(Some(
            BasicClient::new(client_id)
            .set_client_secret(client_secret)
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url)
        ))
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<HappyClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or_else(|| anyhow::anyhow!("OAuth provider {provider} keys not supplied").into())
    }

    pub fn providers(&self) -> Vec<ClientProvider> {
        let mut providers = vec![];
        if self.google_client.is_some() {
            providers.push(ClientProvider::Google);
        }
        if self.github_client.is_some() {
            providers.push(ClientProvider::Github);
        }
        providers
    }
}
