use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context as _;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Origin the browser sees; OAuth redirect URIs are built from it.
    pub public_url: String,
    pub client_secret_path: PathBuf,
    pub session_idle_minutes: i64,
}

impl Config {
    /// Reads the environment, after loading `.env` if there is one.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_owned());

        let bind_addr = or("BIND_ADDR", "0.0.0.0:8080");
        let idle = or("SESSION_IDLE_MINUTES", "60");

        Ok(Config {
            database_url: or("DATABASE_URL", "sqlite://roomchat.db?mode=rwc"),
            bind_addr: bind_addr
                .parse()
                .with_context(|| format!("BIND_ADDR {bind_addr:?} is not a socket address"))?,
            public_url: or("PUBLIC_URL", "http://localhost:8080").trim_end_matches('/').to_owned(),
            client_secret_path: or("CLIENT_SECRET_PATH", "client_secret.json").into(),
            session_idle_minutes: idle
                .parse()
                .with_context(|| format!("SESSION_IDLE_MINUTES {idle:?} is not a number"))?,
        })
    }
}
