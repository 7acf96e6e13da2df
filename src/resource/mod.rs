//! Generic resource controller: given a model type with a field-descriptor
//! table, derives filtered/sorted/paginated list queries, key lookups, and
//! the five CRUD routes with scope-gated handlers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::FromRow;

pub mod descriptor;
pub mod error;
pub mod query;
pub mod routes;

pub use descriptor::{FieldDef, FieldKind, KeyValue, ResourceDescriptor};
pub use error::ResourceError;
pub use query::{ResourceQuery, SortDirection, SqlResult};
pub use routes::{resource_routes, ListParams, Paginated};

/// A persistable model with declared fields and operation projections.
///
/// `Read` is the full projection returned by every successful operation;
/// `Create` and `Update` are input projections and never carry primary keys
/// (store-generated keys stay null until insert).
pub trait Resource:
    Sized + Send + Sync + Unpin + Serialize + for<'r> FromRow<'r, PgRow> + 'static
{
    type Read: Serialize + Send + From<Self>;
    type Create: DeserializeOwned + Send;
    type Update: DeserializeOwned + Send;

    /// The per-type field table, built once and cached in a static
    fn descriptor() -> &'static ResourceDescriptor;

    /// Build a new, unsaved instance from the create projection
    fn from_create(input: Self::Create) -> Self;

    /// Field-by-field overwrite from the update projection
    fn apply_update(&mut self, input: Self::Update);

    /// Post-construction validation hook; the message becomes a 422 detail
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
