mod auth;
mod config;
mod middleware;

mod db;
mod domain;
mod error;
mod models;
mod routes;
mod store;
mod workflow;

use std::sync::Arc;

use crate::{config::Config, models::AppState, store::postgres::PgStore};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url, cfg.db_max_connections).await?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let state = AppState {
        db: pool,
        schedules: store.clone(),
        bookings: store,
        settings: cfg.booking,
    };

    // Browser clients call the API from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!(
        window_days = cfg.booking.schedule_window_days,
        default_max_number = cfg.booking.default_max_number,
        "Listening on http://{}",
        cfg.bind_addr
    );
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
