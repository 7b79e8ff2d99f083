//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, LogMailer, Mailer, PgIdentityAdapter, SmtpMailer},
    config::Config,
    error::ApiError,
    web::{rest::ApiDoc, router, state::AppState},
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use chrono::Duration;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Identity & Mail Adapters ---
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            info!("Magic links will be emailed through {}", smtp.host);
            Arc::new(SmtpMailer::new(smtp.clone()))
        }
        None => {
            warn!("SMTP_HOST not set; magic links will only be logged");
            Arc::new(LogMailer)
        }
    };
    let identity = Arc::new(PgIdentityAdapter::new(
        db_pool,
        mailer,
        Duration::days(config.session_ttl_days),
        Duration::minutes(config.magic_link_ttl_minutes),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(db_adapter, identity, config.clone()));

    // --- 5. Create the Web Router ---
    let origin = config.site_url.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("SITE_URL is not a valid origin: {}", e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
