use std::net::SocketAddr;

use anyhow::Context;

pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub max_connections: u32,
    pub migrations_dir: String,
    pub templates_dir: String,
    pub public_dir: String,
}

impl Config {
    /// Reads `ACCOUNTS_*` variables, after loading a `.env` file if present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let listen_addr: SocketAddr = get("ACCOUNTS_LISTEN_ADDR", "0.0.0.0:3000")
            .parse()
            .context("invalid ACCOUNTS_LISTEN_ADDR")?;
        let max_connections: u32 = get("ACCOUNTS_MAX_CONNECTIONS", "5")
            .parse()
            .context("invalid ACCOUNTS_MAX_CONNECTIONS")?;

        Ok(Self {
            listen_addr,
            database_url: get("ACCOUNTS_DATABASE_URL", "sqlite:accounts.db"),
            max_connections: max_connections.max(1),
            migrations_dir: get("ACCOUNTS_MIGRATIONS_DIR", "./migrations"),
            templates_dir: get("ACCOUNTS_TEMPLATES_DIR", "./src/front/templates"),
            public_dir: get("ACCOUNTS_PUBLIC_DIR", "./src/front/public"),
        })
    }
}
