mod config;
mod front;
mod migration;
pub mod models;
mod service;
mod store;

use env_logger::Env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::try_init_from_env(Env::default().default_filter_or("accounts=info"))?;

    let config = config::Config::from_env()?;

    let store = store::AccountStore::connect(&config.database_url, config.max_connections).await?;
    migration::migrate(store.pool(), &config.migrations_dir).await?;
    log::info!(
        "{} accounts in {}",
        store.count().await?,
        config.database_url
    );

    log::debug!("loading templates from {}", config.templates_dir);
    let t = front::template::Template::new(&config.templates_dir)?;

    let state = front::AppState {
        accounts: service::AccountService::new(store),
        t,
    };
    front::start_web_server(config.listen_addr, state, &config.public_dir).await
}
