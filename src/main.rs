use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpResponse, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;

mod api;
mod auth;
mod clock;
mod config;
mod db;
mod docs;
mod engine;
mod error;
mod model;
mod models;
mod routes;
mod service;
mod store;
mod utils;

use clock::ServerClock;
use config::Config;
use db::{ensure_schema, init_db};
use store::{AttendanceStore, MySqlStore};

use crate::docs::ApiDoc;
use crate::utils::schedule_cache;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index(store: Data<dyn AttendanceStore>, clock: Data<ServerClock>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "store": store.backend_tag(),
        "server_time": clock.now(),
        "clock_offset_ms": clock.offset_ms(),
    }))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    ensure_schema(&pool)
        .await
        .context("Failed to create attendance tables")?;

    schedule_cache::init(Duration::from_secs(config.summary_cache_ttl_secs));

    let clock = Data::new(ServerClock::new());
    match clock.sync(&pool).await {
        Ok(offset_ms) => info!(offset_ms, "Server clock synchronized"),
        Err(e) => warn!(error = %e, "Initial clock sync failed, using local time"),
    }
    clock::spawn_sync_task(
        clock.clone(),
        pool.clone(),
        Duration::from_secs(config.clock_sync_interval_secs.max(1)),
    );

    let store: Arc<dyn AttendanceStore> = Arc::new(MySqlStore::new(pool));
    info!(store = store.backend_tag(), addr = %config.server_addr, "Store ready");

    // Clone values for the closure (avoid move issues)
    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::from(store.clone()))
            .app_data(clock.clone())
            .app_data(Data::new(config.clone()))
            .service(index)
            // Protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
