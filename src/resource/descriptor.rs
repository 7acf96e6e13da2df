use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::ResourceError;

/// Storage kind of a declared field. Decides path-segment decoding for
/// primary keys, parameter casts, and free-text filter eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    BigInt,
    Float,
    Bool,
    Text,
    Uuid,
    Timestamp,
}

impl FieldKind {
    /// String-typed fields are the implicit free-text filter targets
    pub fn is_text(self) -> bool {
        matches!(self, FieldKind::Text)
    }

    /// Kinds that can appear as a path segment for single-object routes
    pub fn is_key_kind(self) -> bool {
        matches!(
            self,
            FieldKind::Integer | FieldKind::BigInt | FieldKind::Text | FieldKind::Uuid
        )
    }

    /// Explicit cast appended to `$n` placeholders where Postgres cannot
    /// infer the type from a text/jsonb-shaped bind value
    pub fn cast_suffix(self) -> &'static str {
        match self {
            FieldKind::Uuid => "::uuid",
            FieldKind::Timestamp => "::timestamptz",
            _ => "",
        }
    }
}

/// One entry in the per-type field-descriptor table
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub primary_key: bool,
}

impl FieldDef {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            primary_key: false,
        }
    }

    pub const fn primary_key(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            primary_key: true,
        }
    }
}

/// A decoded primary-key component
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Int(i64),
    Text(String),
    Uuid(Uuid),
}

impl KeyValue {
    pub fn to_json(&self) -> Value {
        match self {
            KeyValue::Int(i) => Value::from(*i),
            KeyValue::Text(s) => Value::from(s.clone()),
            KeyValue::Uuid(u) => Value::from(u.to_string()),
        }
    }
}

impl std::fmt::Display for KeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyValue::Int(i) => write!(f, "{}", i),
            KeyValue::Text(s) => write!(f, "{}", s),
            KeyValue::Uuid(u) => write!(f, "{}", u),
        }
    }
}

/// Joins key components for log and error messages, e.g. `(1, alice)`
pub fn format_key(key: &[KeyValue]) -> String {
    let parts: Vec<String> = key.iter().map(|k| k.to_string()).collect();
    format!("({})", parts.join(", "))
}

/// Explicit per-type field table: built once per model type, cached in a
/// static, and read concurrently afterwards. Replaces runtime reflection.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    table: &'static str,
    fields: Vec<FieldDef>,
    primary_keys: Vec<FieldDef>,
    default_filters: Vec<&'static str>,
}

impl ResourceDescriptor {
    /// Validate and precompute the derived field sets.
    ///
    /// A missing primary key, a duplicate field name, or a key field of an
    /// unroutable kind is a configuration error; callers surface it at
    /// registration time, never during a request.
    pub fn new(table: &'static str, fields: Vec<FieldDef>) -> Result<Self, ResourceError> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(ResourceError::DuplicateField(
                    table.to_string(),
                    field.name.to_string(),
                ));
            }
        }

        let primary_keys: Vec<FieldDef> = fields
            .iter()
            .filter(|f| f.primary_key)
            .cloned()
            .collect();
        if primary_keys.is_empty() {
            return Err(ResourceError::NoPrimaryKey(table.to_string()));
        }
        if let Some(bad) = primary_keys.iter().find(|f| !f.kind.is_key_kind()) {
            return Err(ResourceError::UnsupportedKeyKind(
                table.to_string(),
                bad.name.to_string(),
            ));
        }

        let default_filters = fields
            .iter()
            .filter(|f| f.kind.is_text())
            .map(|f| f.name)
            .collect();

        Ok(Self {
            table,
            fields,
            primary_keys,
            default_filters,
        })
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Primary-key fields in declaration order
    pub fn primary_keys(&self) -> &[FieldDef] {
        &self.primary_keys
    }

    /// String-typed fields eligible for free-text substring search
    pub fn default_filters(&self) -> &[&'static str] {
        &self.default_filters
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Path suffix for single-object routes: one segment per primary-key
    /// field, in declaration order, e.g. `/:realm/:id`
    pub fn id_path(&self) -> String {
        self.primary_keys
            .iter()
            .map(|f| format!("/:{}", f.name))
            .collect()
    }

    /// Decode captured path segments positionally into typed key components
    pub fn decode_key(&self, segments: &[(String, String)]) -> Result<Vec<KeyValue>, ResourceError> {
        if segments.len() != self.primary_keys.len() {
            return Err(ResourceError::KeyArityMismatch {
                expected: self.primary_keys.len(),
                got: segments.len(),
            });
        }

        self.primary_keys
            .iter()
            .zip(segments)
            .map(|(field, (_, raw))| Self::decode_segment(field, raw))
            .collect()
    }

    fn decode_segment(field: &FieldDef, raw: &str) -> Result<KeyValue, ResourceError> {
        let invalid = || ResourceError::InvalidKeySegment {
            field: field.name.to_string(),
            value: raw.to_string(),
        };

        match field.kind {
            FieldKind::Integer | FieldKind::BigInt => {
                raw.parse::<i64>().map(KeyValue::Int).map_err(|_| invalid())
            }
            FieldKind::Uuid => Uuid::parse_str(raw).map(KeyValue::Uuid).map_err(|_| invalid()),
            FieldKind::Text => Ok(KeyValue::Text(raw.to_string())),
            _ => Err(invalid()),
        }
    }

    /// Pull the primary-key tuple out of a serialized row, if every
    /// component is present and non-null (store-generated keys are null
    /// before insert).
    pub fn key_from_row(&self, row: &Map<String, Value>) -> Option<Vec<KeyValue>> {
        self.primary_keys
            .iter()
            .map(|field| {
                let value = row.get(field.name)?;
                match (field.kind, value) {
                    (FieldKind::Integer | FieldKind::BigInt, Value::Number(n)) => {
                        n.as_i64().map(KeyValue::Int)
                    }
                    (FieldKind::Text, Value::String(s)) => Some(KeyValue::Text(s.clone())),
                    (FieldKind::Uuid, Value::String(s)) => {
                        Uuid::parse_str(s).ok().map(KeyValue::Uuid)
                    }
                    _ => None,
                }
            })
            .collect()
    }
}
