use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Executor, FromRow, Postgres, Row};

use super::descriptor::{FieldKind, KeyValue, ResourceDescriptor};
use super::error::ResourceError;

/// Generated SQL plus positional parameters bound separately
#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Builds the filtered/sorted/paginated queries for one resource type.
/// All identifiers come from the descriptor (never from request input), so
/// quoting them directly is safe; request values are always bound.
pub struct ResourceQuery<'a> {
    desc: &'a ResourceDescriptor,
}

impl<'a> ResourceQuery<'a> {
    pub fn new(desc: &'a ResourceDescriptor) -> Self {
        Self { desc }
    }

    /// List query: free-text OR filter across default-filter fields,
    /// optional validated sort, always paginated.
    pub fn list(
        &self,
        filter: Option<&str>,
        sort: Option<&str>,
        direction: SortDirection,
        offset: i64,
        limit: i64,
    ) -> Result<SqlResult, ResourceError> {
        let mut params = Vec::new();
        let mut query = format!("SELECT * FROM \"{}\"", self.desc.table());

        if let Some(clause) = self.filter_clause(filter, &mut params) {
            query.push_str(&format!(" WHERE {}", clause));
        }

        if let Some(sort) = sort {
            if !self.desc.has_field(sort) {
                return Err(ResourceError::UnknownSortField(sort.to_string()));
            }
            query.push_str(&format!(" ORDER BY \"{}\" {}", sort, direction.to_sql()));
        }

        query.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        Ok(SqlResult { query, params })
    }

    /// Count of the full filtered set, independent of pagination
    pub fn count(&self, filter: Option<&str>) -> SqlResult {
        let mut params = Vec::new();
        let mut query = format!("SELECT COUNT(*) AS count FROM \"{}\"", self.desc.table());
        if let Some(clause) = self.filter_clause(filter, &mut params) {
            query.push_str(&format!(" WHERE {}", clause));
        }
        SqlResult { query, params }
    }

    /// Exact lookup by primary-key tuple
    pub fn find_by_key(&self, key: &[KeyValue]) -> SqlResult {
        let mut params = Vec::new();
        let query = format!(
            "SELECT * FROM \"{}\" WHERE {}",
            self.desc.table(),
            self.key_clause(key, &mut params)
        );
        SqlResult { query, params }
    }

    /// Insert a serialized row, letting the store generate any primary-key
    /// column whose value is still null. `RETURNING *` reads the stored row
    /// back, generated keys included.
    pub fn insert(&self, row: &Map<String, Value>) -> SqlResult {
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        let mut params = Vec::new();

        for field in self.desc.fields() {
            let value = row.get(field.name).cloned().unwrap_or(Value::Null);
            if field.primary_key && value.is_null() {
                continue;
            }
            params.push(value);
            columns.push(format!("\"{}\"", field.name));
            placeholders.push(format!("${}{}", params.len(), field.kind.cast_suffix()));
        }

        let query = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING *",
            self.desc.table(),
            columns.join(", "),
            placeholders.join(", ")
        );
        SqlResult { query, params }
    }

    /// Field-by-field overwrite of an existing row, addressed by the
    /// primary-key values carried in the serialized row itself.
    pub fn update_by_key(&self, row: &Map<String, Value>) -> SqlResult {
        let mut params = Vec::new();
        let mut sets = Vec::new();

        for field in self.desc.fields() {
            if field.primary_key {
                continue;
            }
            let value = row.get(field.name).cloned().unwrap_or(Value::Null);
            params.push(value);
            sets.push(format!(
                "\"{}\" = ${}{}",
                field.name,
                params.len(),
                field.kind.cast_suffix()
            ));
        }

        let mut wheres = Vec::new();
        for field in self.desc.primary_keys() {
            let value = row.get(field.name).cloned().unwrap_or(Value::Null);
            params.push(value);
            wheres.push(format!(
                "\"{}\" = ${}{}",
                field.name,
                params.len(),
                field.kind.cast_suffix()
            ));
        }

        // A model with only key fields has nothing to overwrite
        let query = if sets.is_empty() {
            format!(
                "SELECT * FROM \"{}\" WHERE {}",
                self.desc.table(),
                wheres.join(" AND ")
            )
        } else {
            format!(
                "UPDATE \"{}\" SET {} WHERE {} RETURNING *",
                self.desc.table(),
                sets.join(", "),
                wheres.join(" AND ")
            )
        };
        SqlResult { query, params }
    }

    pub fn delete_by_key(&self, key: &[KeyValue]) -> SqlResult {
        let mut params = Vec::new();
        let query = format!(
            "DELETE FROM \"{}\" WHERE {}",
            self.desc.table(),
            self.key_clause(key, &mut params)
        );
        SqlResult { query, params }
    }

    /// Case-insensitive substring match ORed across every default-filter
    /// field. Empty or whitespace-only filter text means no filter at all.
    fn filter_clause(&self, filter: Option<&str>, params: &mut Vec<Value>) -> Option<String> {
        let text = filter?.trim();
        if text.is_empty() || self.desc.default_filters().is_empty() {
            return None;
        }

        params.push(Value::from(format!("%{}%", text.to_lowercase())));
        let n = params.len();
        let parts: Vec<String> = self
            .desc
            .default_filters()
            .iter()
            .map(|field| format!("LOWER(\"{}\") LIKE ${}", field, n))
            .collect();
        Some(format!("({})", parts.join(" OR ")))
    }

    fn key_clause(&self, key: &[KeyValue], params: &mut Vec<Value>) -> String {
        self.desc
            .primary_keys()
            .iter()
            .zip(key)
            .map(|(field, value)| {
                params.push(value.to_json());
                format!(
                    "\"{}\" = ${}{}",
                    field.name,
                    params.len(),
                    field.kind.cast_suffix()
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

// --- execution helpers -----------------------------------------------------

pub async fn fetch_all<'e, M, E>(executor: E, sql: &SqlResult) -> Result<Vec<M>, sqlx::Error>
where
    M: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    E: Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query_as::<_, M>(&sql.query);
    for param in sql.params.iter() {
        query = bind_value_as(query, param);
    }
    query.fetch_all(executor).await
}

pub async fn fetch_optional<'e, M, E>(executor: E, sql: &SqlResult) -> Result<Option<M>, sqlx::Error>
where
    M: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    E: Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query_as::<_, M>(&sql.query);
    for param in sql.params.iter() {
        query = bind_value_as(query, param);
    }
    query.fetch_optional(executor).await
}

pub async fn fetch_one<'e, M, E>(executor: E, sql: &SqlResult) -> Result<M, sqlx::Error>
where
    M: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    E: Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query_as::<_, M>(&sql.query);
    for param in sql.params.iter() {
        query = bind_value_as(query, param);
    }
    query.fetch_one(executor).await
}

pub async fn fetch_count<'e, E>(executor: E, sql: &SqlResult) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query(&sql.query);
    for param in sql.params.iter() {
        query = bind_value(query, param);
    }
    let row = query.fetch_one(executor).await?;
    row.try_get("count")
}

pub async fn execute<'e, E>(executor: E, sql: &SqlResult) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query(&sql.query);
    for param in sql.params.iter() {
        query = bind_value(query, param);
    }
    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

fn bind_value<'q>(
    q: sqlx::query::Query<'q, Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s),
        other => q.bind(other.clone()), // JSONB
    }
}

fn bind_value_as<'q, O>(
    q: sqlx::query::QueryAs<'q, Postgres, O, PgArguments>,
    v: &'q Value,
) -> sqlx::query::QueryAs<'q, Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, PgRow>,
{
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s),
        other => q.bind(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::descriptor::{FieldDef, FieldKind};
    use serde_json::json;

    fn player_descriptor() -> ResourceDescriptor {
        ResourceDescriptor::new(
            "player",
            vec![
                FieldDef::primary_key("id", FieldKind::Integer),
                FieldDef::new("username", FieldKind::Text),
            ],
        )
        .unwrap()
    }

    #[test]
    fn list_without_filter_or_sort_is_just_paginated() {
        let desc = player_descriptor();
        let sql = ResourceQuery::new(&desc)
            .list(None, None, SortDirection::Asc, 0, 100)
            .unwrap();
        assert_eq!(sql.query, "SELECT * FROM \"player\" LIMIT 100 OFFSET 0");
        assert!(sql.params.is_empty());
    }

    #[test]
    fn list_filter_ors_across_text_fields_case_insensitively() {
        let desc = ResourceDescriptor::new(
            "player",
            vec![
                FieldDef::primary_key("id", FieldKind::Integer),
                FieldDef::new("username", FieldKind::Text),
                FieldDef::new("clan", FieldKind::Text),
            ],
        )
        .unwrap();
        let sql = ResourceQuery::new(&desc)
            .list(Some("Ali"), None, SortDirection::Asc, 0, 50)
            .unwrap();
        assert_eq!(
            sql.query,
            "SELECT * FROM \"player\" WHERE (LOWER(\"username\") LIKE $1 OR LOWER(\"clan\") LIKE $1) LIMIT 50 OFFSET 0"
        );
        assert_eq!(sql.params, vec![json!("%ali%")]);
    }

    #[test]
    fn empty_filter_text_applies_no_filter() {
        let desc = player_descriptor();
        let query = ResourceQuery::new(&desc);
        let sql = query.list(Some("   "), None, SortDirection::Asc, 0, 10).unwrap();
        assert!(!sql.query.contains("WHERE"));

        let count = query.count(Some(""));
        assert_eq!(count.query, "SELECT COUNT(*) AS count FROM \"player\"");
    }

    #[test]
    fn sort_field_is_validated_against_descriptor() {
        let desc = player_descriptor();
        let query = ResourceQuery::new(&desc);

        let sql = query
            .list(None, Some("username"), SortDirection::Desc, 20, 10)
            .unwrap();
        assert_eq!(
            sql.query,
            "SELECT * FROM \"player\" ORDER BY \"username\" DESC LIMIT 10 OFFSET 20"
        );

        let err = query
            .list(None, Some("password; DROP TABLE player"), SortDirection::Asc, 0, 10)
            .unwrap_err();
        assert!(matches!(err, ResourceError::UnknownSortField(_)));
    }

    #[test]
    fn count_shares_the_filter_predicate() {
        let desc = player_descriptor();
        let sql = ResourceQuery::new(&desc).count(Some("ali"));
        assert_eq!(
            sql.query,
            "SELECT COUNT(*) AS count FROM \"player\" WHERE (LOWER(\"username\") LIKE $1)"
        );
        assert_eq!(sql.params, vec![json!("%ali%")]);
    }

    #[test]
    fn find_by_key_binds_components_in_order() {
        let desc = ResourceDescriptor::new(
            "membership",
            vec![
                FieldDef::primary_key("realm", FieldKind::Text),
                FieldDef::primary_key("player_id", FieldKind::Integer),
                FieldDef::new("role", FieldKind::Text),
            ],
        )
        .unwrap();
        let key = vec![KeyValue::Text("emerald".to_string()), KeyValue::Int(7)];
        let sql = ResourceQuery::new(&desc).find_by_key(&key);
        assert_eq!(
            sql.query,
            "SELECT * FROM \"membership\" WHERE \"realm\" = $1 AND \"player_id\" = $2"
        );
        assert_eq!(sql.params, vec![json!("emerald"), json!(7)]);
    }

    #[test]
    fn insert_skips_null_primary_keys_and_returns_row() {
        let desc = player_descriptor();
        let row = json!({ "id": null, "username": "alice" });
        let sql = ResourceQuery::new(&desc).insert(row.as_object().unwrap());
        assert_eq!(
            sql.query,
            "INSERT INTO \"player\" (\"username\") VALUES ($1) RETURNING *"
        );
        assert_eq!(sql.params, vec![json!("alice")]);
    }

    #[test]
    fn insert_keeps_client_supplied_keys() {
        let desc = player_descriptor();
        let row = json!({ "id": 3, "username": "bob" });
        let sql = ResourceQuery::new(&desc).insert(row.as_object().unwrap());
        assert_eq!(
            sql.query,
            "INSERT INTO \"player\" (\"id\", \"username\") VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(sql.params, vec![json!(3), json!("bob")]);
    }

    #[test]
    fn update_overwrites_non_key_fields_addressed_by_key() {
        let desc = player_descriptor();
        let row = json!({ "id": 3, "username": "bob" });
        let sql = ResourceQuery::new(&desc).update_by_key(row.as_object().unwrap());
        assert_eq!(
            sql.query,
            "UPDATE \"player\" SET \"username\" = $1 WHERE \"id\" = $2 RETURNING *"
        );
        assert_eq!(sql.params, vec![json!("bob"), json!(3)]);
    }

    #[test]
    fn delete_by_key() {
        let desc = player_descriptor();
        let sql = ResourceQuery::new(&desc).delete_by_key(&[KeyValue::Int(3)]);
        assert_eq!(sql.query, "DELETE FROM \"player\" WHERE \"id\" = $1");
        assert_eq!(sql.params, vec![json!(3)]);
    }

    #[test]
    fn uuid_keys_are_cast_explicitly() {
        let desc = ResourceDescriptor::new(
            "session",
            vec![
                FieldDef::primary_key("id", FieldKind::Uuid),
                FieldDef::new("label", FieldKind::Text),
            ],
        )
        .unwrap();
        let id = uuid::Uuid::nil();
        let sql = ResourceQuery::new(&desc).find_by_key(&[KeyValue::Uuid(id)]);
        assert_eq!(sql.query, "SELECT * FROM \"session\" WHERE \"id\" = $1::uuid");
    }
}
