use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use condun_api::{AuthToken, Uuid};
use structopt::StructOpt;
use tower_http::trace::TraceLayer;

mod db;
mod error;
mod extractors;
mod fuzz;
mod handlers;
mod query;

use error::Error;
use extractors::AppState;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, StructOpt)]
#[structopt(name = "condun-server", about = "Serves the condun API over HTTP")]
struct Opt {
    /// PostgreSQL connection string
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    #[structopt(long, env = "LISTEN", default_value = "127.0.0.1:8000")]
    listen: SocketAddr,

    /// Bearer token for the /api/admin routes, which are disabled when it is not set
    #[structopt(long, env = "ADMIN_TOKEN")]
    admin_token: Option<Uuid>,
}

pub async fn create_sqlx_pool(url: &str) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(url)
        .await
        .with_context(|| format!("opening database {url:?}"))
}

pub fn app(db: sqlx::PgPool, admin_token: Option<AuthToken>) -> Router {
    let state = AppState { db, admin_token };
    Router::new()
        .route("/api/admin/create-user", post(handlers::admin_create_user))
        .route(
            "/api/admin/create-category",
            post(handlers::admin_create_category),
        )
        .route("/api/auth", post(handlers::auth))
        .route("/api/unauth", post(handlers::unauth))
        .route("/api/whoami", get(handlers::whoami))
        .route("/api/fetch-users", get(handlers::fetch_users))
        .route("/api/fetch-categories", get(handlers::fetch_categories))
        .route("/api/search-posts", post(handlers::search_posts))
        .route("/api/post/:id", get(handlers::fetch_post))
        .route("/api/post/:id/comments", get(handlers::fetch_comments))
        .route("/api/post/:id/view", post(handlers::view_post))
        .route("/api/submit-action", post(handlers::submit_action))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = Opt::from_args();
    if opt.admin_token.is_none() {
        tracing::warn!("no admin token set, admin routes will refuse every request");
    }

    let db = create_sqlx_pool(&opt.database_url).await?;
    MIGRATOR
        .run(&db)
        .await
        .context("running pending migrations")?;

    tracing::info!(addr = %opt.listen, "listening");
    axum::Server::bind(&opt.listen)
        .serve(app(db, opt.admin_token.map(AuthToken)).into_make_service())
        .await
        .context("serving axum webserver")
}
