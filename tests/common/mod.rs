use std::sync::Arc;

use anyhow::{ensure, Result};
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tower::ServiceExt;

use cloudraiders_api::auth::provider::hash_password;
use cloudraiders_api::auth::PgAuthProvider;
use cloudraiders_api::handlers::security::security_routes;
use cloudraiders_api::models::Player;
use cloudraiders_api::resource::{
    resource_routes, FieldDef, FieldKind, Resource, ResourceDescriptor,
};
use cloudraiders_api::state::AppState;

/// Natural-key fixture: the client supplies the primary key on create, so
/// the duplicate pre-check actually has a key to look up.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Realm {
    pub name: String,
    pub motto: String,
}

#[derive(Debug, Deserialize)]
pub struct RealmUpdate {
    pub motto: String,
}

static REALM_DESCRIPTOR: Lazy<ResourceDescriptor> = Lazy::new(|| {
    ResourceDescriptor::new(
        "realm",
        vec![
            FieldDef::primary_key("name", FieldKind::Text),
            FieldDef::new("motto", FieldKind::Text),
        ],
    )
    .expect("invalid realm descriptor")
});

impl Resource for Realm {
    type Read = Realm;
    type Create = Realm;
    type Update = RealmUpdate;

    fn descriptor() -> &'static ResourceDescriptor {
        &REALM_DESCRIPTOR
    }

    fn from_create(input: Realm) -> Self {
        input
    }

    fn apply_update(&mut self, input: RealmUpdate) {
        self.motto = input.motto;
    }
}

/// Build the app router against a live test database, or `None` when
/// TEST_DATABASE_URL is unset (the suite then skips itself).
pub async fn test_app() -> Result<Option<Router>> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping integration test");
        return Ok(None);
    };

    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await?;
    prepare_schema(&pool).await?;

    let auth = Arc::new(PgAuthProvider::new(pool.clone()));
    let state = AppState::new(pool, auth);

    let app = Router::new()
        .merge(security_routes())
        .merge(resource_routes::<Player>("player", &["player"], &["admin"]))
        .merge(resource_routes::<Realm>("realm", &["player"], &["admin"]))
        .with_state(state);

    Ok(Some(app))
}

async fn prepare_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS player (\
             id SERIAL PRIMARY KEY,\
             username TEXT NOT NULL)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS realm (\
             name TEXT PRIMARY KEY,\
             motto TEXT NOT NULL)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (\
             username TEXT PRIMARY KEY,\
             email TEXT NOT NULL,\
             disabled BOOLEAN NOT NULL,\
             scopes TEXT[] NOT NULL,\
             password_hash TEXT NOT NULL)",
    )
    .execute(pool)
    .await?;

    seed_user(pool, "admin", false, &["player", "admin"]).await?;
    seed_user(pool, "user", false, &["player"]).await?;
    seed_user(pool, "disabled", true, &["player"]).await?;
    Ok(())
}

async fn seed_user(pool: &PgPool, username: &str, disabled: bool, scopes: &[&str]) -> Result<()> {
    let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
    sqlx::query(
        "INSERT INTO users (username, email, disabled, scopes, password_hash) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (username) DO UPDATE \
         SET disabled = EXCLUDED.disabled, scopes = EXCLUDED.scopes, \
             password_hash = EXCLUDED.password_hash",
    )
    .bind(username)
    .bind(format!("{}@host.com", username))
    .bind(disabled)
    .bind(scopes)
    .bind(hash_password("secret"))
    .execute(pool)
    .await?;
    Ok(())
}

/// Run one request through the router, returning status, headers, and the
/// decoded JSON body (Null for empty bodies).
pub async fn request(
    app: &Router,
    req: Request<Body>,
) -> Result<(StatusCode, HeaderMap, serde_json::Value)> {
    let response = app.clone().oneshot(req).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await?.to_bytes();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, headers, body))
}

/// Log in through POST /token and return the bearer token
pub async fn token_for(app: &Router, username: &str) -> Result<String> {
    let req = Request::builder()
        .method("POST")
        .uri("/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={}&password=secret", username)))?;

    let (status, _, body) = request(app, req).await?;
    ensure!(status == StatusCode::OK, "login failed: {} {}", status, body);
    Ok(body["access_token"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

pub fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .expect("request")
}

pub fn json_request(method: &str, uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}
