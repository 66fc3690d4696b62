use std::{fmt, path::Path};

use oauth2::{basic::BasicClient, AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RedirectUrl, TokenUrl};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::GetField;

type HappyClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    pub const ALL: [ClientProvider; 2] = [ClientProvider::Google, ClientProvider::Github];

    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    pub fn slug(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    pub fn scopes(&self) -> &[&str] {
        use ClientProvider::*;
        match self {
            Google => &["openid", "email", "profile"],
            Github => &["read:user", "user:email"],
        }
    }

    pub fn userinfo_url(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "https://www.googleapis.com/oauth2/v2/userinfo",
            Github => "https://api.github.com/user",
        }
    }

    fn endpoints(&self) -> (&str, &str) {
        use ClientProvider::*;
        match self {
            Google => ("https://accounts.google.com/o/oauth2/auth", "https://oauth2.googleapis.com/token"),
            Github => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Default)]
pub struct Clients {
    google_client: Option<HappyClient>,
    github_client: Option<HappyClient>,
}

impl Clients {
    /// Reads `{"google": {...}, "github": {...}}`; both sections are optional.
    pub fn from_json(json: &Value, public_url: &str) -> anyhow::Result<Clients> {
        let client = |provider: ClientProvider| -> anyhow::Result<Option<HappyClient>> {
            let Some(json) = json.get(provider.slug()) else {
                return Ok(None);
            };
            let client_id = ClientId::new(json.get_str_field("client_id")?);
            let client_secret = ClientSecret::new(json.get_str_field("client_secret")?);

            let (auth_url, token_url) = provider.endpoints();
            let redirect_url = format!("{}/auth/oauth/{}/callback", public_url.trim_end_matches('/'), provider.slug());

            Ok(Some(
                BasicClient::new(client_id)
                .set_client_secret(client_secret)
                .set_auth_uri(AuthUrl::new(auth_url.to_owned())?)
                .set_token_uri(TokenUrl::new(token_url.to_owned())?)
                .set_redirect_uri(RedirectUrl::new(redirect_url)?)
            ))
        };

        Ok(
            Clients {
                google_client: client(ClientProvider::Google)?,
                github_client: client(ClientProvider::Github)?,
            }
        )
    }

    /// Federated sign-in is optional: without a secrets file only email and
    /// password accounts work.
    pub async fn load(path: Option<&Path>, public_url: &str) -> anyhow::Result<Clients> {
        let Some(path) = path else {
            warn!("no OAuth secrets configured, federated sign-in disabled");
            return Ok(Clients::default());
        };
        let json: Value = serde_json::from_str(&tokio::fs::read_to_string(path).await?)?;
        let clients = Clients::from_json(&json, public_url)?;
        info!("OAuth providers: {:?}", clients.providers());
        Ok(clients)
    }

    pub fn providers(&self) -> Vec<ClientProvider> {
        ClientProvider::ALL
            .into_iter()
            .filter(|p| self.get_client(*p).is_ok())
            .collect()
    }

    pub fn get_client(&self, provider: ClientProvider) -> anyhow::Result<HappyClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or_else(|| anyhow::anyhow!("OAuth provider {provider} keys not supplied"))
    }
}
