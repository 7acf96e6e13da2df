use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod auth;
mod config;
mod database;
mod error;
mod handlers;
mod models;
mod resource;
mod state;

use auth::PgAuthProvider;
use models::Player;
use resource::resource_routes;
use state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, SECRET_KEY, etc.
    let _ = dotenvy::dotenv();

    let config = config::config();
    tracing_subscriber::fmt::init();
    tracing::info!(
        "Starting {} API in {:?} mode",
        config.api.title,
        config.environment
    );

    let pool = database::connect()
        .await
        .unwrap_or_else(|e| panic!("failed to connect to database: {}", e));
    let auth_provider = Arc::new(PgAuthProvider::new(pool.clone()));
    let state = AppState::new(pool, auth_provider);

    let app = app(state);

    // Allow tests or deployments to override port via env
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("listening on http://{}", bind_addr);
    axum::serve(listener, app).await.expect("server");
}

fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // OAuth2 token + current-user
        .merge(handlers::security::security_routes())
        // Registered resources: read gated by "player", writes by "admin"
        .merge(resource_routes::<Player>("player", &["player"], &["admin"]))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> axum::response::Json<Value> {
    let config = config::config();

    axum::response::Json(json!({
        "name": config.api.title,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "token": "/token (public - OAuth2 password form)",
            "user": "/user (authenticated)",
            "player": "/player[/:id] (scoped - read: player, write: admin)",
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match database::health_check(&state.pool).await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "status": "ok",
                "timestamp": now,
                "database": "ok"
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "status": "degraded",
                "timestamp": now,
                "database_error": e.to_string()
            })),
        ),
    }
}
