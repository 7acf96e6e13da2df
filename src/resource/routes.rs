use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::descriptor::{format_key, KeyValue};
use super::query::{self, ResourceQuery, SortDirection};
use super::Resource;
use crate::auth::require_scopes;
use crate::config;
use crate::error::ApiError;
use crate::state::AppState;

type ScopeSet = Arc<Vec<String>>;

/// Query parameters accepted by the read-list operation. The free-text
/// filter is exposed under the `query` alias.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub offset: i64,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(rename = "query")]
    pub filter: Option<String>,
}

/// `Query<ListParams>` with the extractor rejection mapped into the JSON
/// error envelope, so a malformed `direction` or `offset` reads like every
/// other 400.
struct ListQuery(ListParams);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ListQuery {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<ListParams>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(Self(params))
    }
}

/// Total matching count plus one bounded page of read projections
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub total: i64,
    pub data: Vec<T>,
}

/// Register the five CRUD operations for a model.
///
/// `read` scopes gate the GET operations, `write` scopes the mutating ones.
/// Single-object routes get one path segment per primary-key field in
/// declaration order, decoded positionally by the descriptor. Touching the
/// descriptor here surfaces configuration errors (such as a missing primary
/// key) at registration time.
pub fn resource_routes<M: Resource>(route: &str, read: &[&str], write: &[&str]) -> Router<AppState> {
    let desc = M::descriptor();
    let read: ScopeSet = Arc::new(read.iter().map(|s| s.to_string()).collect());
    let write: ScopeSet = Arc::new(write.iter().map(|s| s.to_string()).collect());

    let collection = format!("/{}", route.trim_matches('/'));
    let item = format!("{}{}", collection, desc.id_path());

    let list_scopes = read.clone();
    let read_scopes = read.clone();
    let create_scopes = write.clone();
    let update_scopes = write.clone();
    let delete_scopes = write.clone();

    Router::new()
        .route(
            &collection,
            get(move |state: State<AppState>, headers: HeaderMap, params: ListQuery| {
                read_list::<M>(state, headers, params, list_scopes.clone())
            })
            .post(move |state: State<AppState>, headers: HeaderMap, payload: Json<M::Create>| {
                create::<M>(state, headers, create_scopes.clone(), payload)
            }),
        )
        .route(
            &item,
            get(
                move |state: State<AppState>, headers: HeaderMap, key: Path<Vec<(String, String)>>| {
                    read_one::<M>(state, headers, key, read_scopes.clone())
                },
            )
            .patch(
                move |state: State<AppState>,
                      headers: HeaderMap,
                      key: Path<Vec<(String, String)>>,
                      payload: Json<M::Update>| {
                    update::<M>(state, headers, key, update_scopes.clone(), payload)
                },
            )
            .delete(
                move |state: State<AppState>, headers: HeaderMap, key: Path<Vec<(String, String)>>| {
                    delete::<M>(state, headers, key, delete_scopes.clone())
                },
            ),
        )
}

/// GET /{route}/{pk...} - read one object by primary key
async fn read_one<M: Resource>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(segments): Path<Vec<(String, String)>>,
    scopes: ScopeSet,
) -> Result<Json<M::Read>, ApiError> {
    require_scopes(state.auth.as_ref(), &headers, &scopes).await?;

    let desc = M::descriptor();
    let key = desc.decode_key(&segments)?;
    let sql = ResourceQuery::new(desc).find_by_key(&key);

    let obj: M = query::fetch_optional(&state.pool, &sql)
        .await?
        .ok_or_else(|| not_found(desc.table(), &key))?;

    Ok(Json(M::Read::from(obj)))
}

/// GET /{route} - paginated list with free-text filter and sorting
async fn read_list<M: Resource>(
    State(state): State<AppState>,
    headers: HeaderMap,
    ListQuery(params): ListQuery,
    scopes: ScopeSet,
) -> Result<Json<Paginated<M::Read>>, ApiError> {
    require_scopes(state.auth.as_ref(), &headers, &scopes).await?;

    let desc = M::descriptor();
    let (offset, limit) = page_bounds(&params);
    let filter = params.filter.as_deref();

    let rq = ResourceQuery::new(desc);
    let list_sql = rq.list(filter, params.sort.as_deref(), params.direction, offset, limit)?;
    let count_sql = rq.count(filter);

    let total = query::fetch_count(&state.pool, &count_sql).await?;
    let rows: Vec<M> = query::fetch_all(&state.pool, &list_sql).await?;

    Ok(Json(Paginated {
        total,
        data: rows.into_iter().map(M::Read::from).collect(),
    }))
}

/// POST /{route} - create from the input projection, returning 201
async fn create<M: Resource>(
    State(state): State<AppState>,
    headers: HeaderMap,
    scopes: ScopeSet,
    Json(input): Json<M::Create>,
) -> Result<(StatusCode, Json<M::Read>), ApiError> {
    require_scopes(state.auth.as_ref(), &headers, &scopes).await?;

    let obj = M::from_create(input);
    obj.validate().map_err(ApiError::unprocessable_entity)?;

    let desc = M::descriptor();
    let row = to_row(&obj)?;
    let rq = ResourceQuery::new(desc);

    let mut tx = state.pool.begin().await?;

    // Best-effort duplicate check when the client supplied the full key; the
    // store's uniqueness constraint remains the authoritative guard against
    // concurrent creators.
    if let Some(key) = desc.key_from_row(&row) {
        let existing: Option<M> = query::fetch_optional(&mut *tx, &rq.find_by_key(&key)).await?;
        if existing.is_some() {
            return Err(ApiError::unprocessable_entity(format!(
                "{} already exists: {}",
                desc.table(),
                format_key(&key)
            )));
        }
    }

    let created: M = query::fetch_one(&mut *tx, &rq.insert(&row)).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(M::Read::from(created))))
}

/// PATCH /{route}/{pk...} - field-by-field overwrite, re-validated
async fn update<M: Resource>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(segments): Path<Vec<(String, String)>>,
    scopes: ScopeSet,
    Json(input): Json<M::Update>,
) -> Result<Json<M::Read>, ApiError> {
    require_scopes(state.auth.as_ref(), &headers, &scopes).await?;

    let desc = M::descriptor();
    let key = desc.decode_key(&segments)?;
    let rq = ResourceQuery::new(desc);

    let mut tx = state.pool.begin().await?;

    let mut obj: M = query::fetch_optional(&mut *tx, &rq.find_by_key(&key))
        .await?
        .ok_or_else(|| not_found(desc.table(), &key))?;

    obj.apply_update(input);
    obj.validate().map_err(ApiError::unprocessable_entity)?;

    let row = to_row(&obj)?;
    let updated: M = query::fetch_one(&mut *tx, &rq.update_by_key(&row)).await?;
    tx.commit().await?;

    Ok(Json(M::Read::from(updated)))
}

/// DELETE /{route}/{pk...} - remove by primary key, returning 204
async fn delete<M: Resource>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(segments): Path<Vec<(String, String)>>,
    scopes: ScopeSet,
) -> Result<StatusCode, ApiError> {
    require_scopes(state.auth.as_ref(), &headers, &scopes).await?;

    let desc = M::descriptor();
    let key = desc.decode_key(&segments)?;
    let rq = ResourceQuery::new(desc);

    let mut tx = state.pool.begin().await?;

    let existing: Option<M> = query::fetch_optional(&mut *tx, &rq.find_by_key(&key)).await?;
    if existing.is_none() {
        return Err(not_found(desc.table(), &key));
    }

    query::execute(&mut *tx, &rq.delete_by_key(&key)).await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

fn not_found(table: &str, key: &[KeyValue]) -> ApiError {
    ApiError::not_found(format!("{} with id {} not found", table, format_key(key)))
}

/// Clamp pagination to configured bounds; an offset past the end of the
/// table simply yields an empty page downstream.
fn page_bounds(params: &ListParams) -> (i64, i64) {
    let api = &config::config().api;
    let limit = params
        .limit
        .unwrap_or(api.default_page_size)
        .clamp(0, api.max_page_size);
    let offset = params.offset.max(0);
    (offset, limit)
}

fn to_row<T: Serialize>(obj: &T) -> Result<Map<String, Value>, ApiError> {
    match serde_json::to_value(obj) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::internal_server_error(
            "model did not serialize to an object",
        )),
        Err(e) => {
            tracing::error!("Failed to serialize model: {}", e);
            Err(ApiError::internal_server_error("Failed to serialize model"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds_apply_defaults_and_caps() {
        let api = &config::config().api;

        let (offset, limit) = page_bounds(&ListParams::default());
        assert_eq!(offset, 0);
        assert_eq!(limit, api.default_page_size);

        let params = ListParams {
            offset: -5,
            limit: Some(api.max_page_size + 1),
            ..Default::default()
        };
        let (offset, limit) = page_bounds(&params);
        assert_eq!(offset, 0);
        assert_eq!(limit, api.max_page_size);
    }

    #[test]
    fn paginated_serializes_total_and_data() {
        let page = Paginated {
            total: 3,
            data: vec!["a", "b"],
        };
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["total"], 3);
        assert_eq!(value["data"].as_array().unwrap().len(), 2);
    }
}
