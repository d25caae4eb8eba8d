pub mod accounts;
pub mod template;

use std::net::SocketAddr;

use axum::{
    response::{IntoResponse, Redirect},
    routing::get,
    Router,
};
use tower_http::services::ServeDir;

use crate::service::AccountService;

#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub t: template::Template,
}

pub fn new_router(state: AppState, public_dir: &str) -> Router {
    Router::new()
        .route("/", get(index))
        .nest("/accounts", accounts::new_router())
        .nest_service("/public", ServeDir::new(public_dir))
        .with_state(state)
}

pub async fn start_web_server(
    addr: SocketAddr,
    state: AppState,
    public_dir: &str,
) -> anyhow::Result<()> {
    let app = new_router(state, public_dir);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("open website at http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> impl IntoResponse {
    Redirect::to("/accounts")
}
