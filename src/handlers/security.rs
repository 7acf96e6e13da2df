use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;

use crate::auth::{self, require_scopes, AuthError, Principal, Token};
use crate::error::ApiError;
use crate::state::AppState;

pub fn security_routes() -> Router<AppState> {
    Router::new()
        .route("/token", post(login_for_access_token))
        .route("/user", get(read_user))
}

/// OAuth2 password request form
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub scope: String,
}

/// POST /token - submit OAuth2 form to login
async fn login_for_access_token(
    State(state): State<AppState>,
    Form(form): Form<TokenForm>,
) -> Result<Json<Token>, ApiError> {
    let principal = state
        .auth
        .authenticate(&form.username, &form.password)
        .await
        .map_err(|e| match e {
            AuthError::InvalidCredentials => ApiError::bad_request("Invalid username or password"),
            other => ApiError::from(other),
        })?;

    let scopes: Vec<String> = form.scope.split_whitespace().map(str::to_string).collect();

    // A token may only carry scopes the principal has actually been granted
    if let Some(denied) = scopes.iter().find(|s| !principal.scopes.contains(s)) {
        return Err(ApiError::unauthorized(
            format!("Scope '{}' has not been granted", denied),
            &scopes,
        ));
    }

    let token = auth::generate_token(&principal.username, scopes)?;
    Ok(Json(token))
}

/// GET /user - return the authenticated principal
async fn read_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Principal>, ApiError> {
    let principal = require_scopes(state.auth.as_ref(), &headers, &[]).await?;
    Ok(Json(principal))
}
