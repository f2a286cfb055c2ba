//! Shallow-merge patch semantics.
//!
//! # Responsibility
//! - Merge partial JSON records into typed entities.
//! - Extract and validate the identity carried by a raw record.
//!
//! # Invariants
//! - Merge is shallow: top-level keys replace, nested values are not merged.
//! - The `id` key of a patch is never applied; identity is stable.
//! - Merging the same patch twice yields the same record as merging it once.

use crate::model::SyncEntity;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Partial or complete record as delivered by the feed or a collaborator.
pub type Patch = Map<String, Value>;

const ID_KEY: &str = "id";

/// Errors from patch decoding and merging.
#[derive(Debug)]
pub enum PatchError {
    /// Record carries no `id` key.
    MissingId,
    /// `id` is present but not a UUID string.
    InvalidId(String),
    /// Typed record did not serialize into a JSON object.
    NotAnObject,
    /// Merged or complete record does not match the entity shape.
    Shape(serde_json::Error),
}

impl Display for PatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId => write!(f, "record has no id"),
            Self::InvalidId(value) => write!(f, "record id is not a uuid: {value}"),
            Self::NotAnObject => write!(f, "record is not a json object"),
            Self::Shape(err) => write!(f, "record shape mismatch: {err}"),
        }
    }
}

impl Error for PatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Shape(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PatchError {
    fn from(value: serde_json::Error) -> Self {
        Self::Shape(value)
    }
}

/// Reads the record identity from a raw patch.
pub fn patch_id(patch: &Patch) -> Result<Uuid, PatchError> {
    match patch.get(ID_KEY) {
        None | Some(Value::Null) => Err(PatchError::MissingId),
        Some(Value::String(raw)) => {
            Uuid::parse_str(raw.trim()).map_err(|_| PatchError::InvalidId(raw.clone()))
        }
        Some(other) => Err(PatchError::InvalidId(other.to_string())),
    }
}

/// Reads an optional uuid-valued field such as `container_id`.
///
/// Returns `None` when the key is absent, null, or not a valid uuid.
pub fn patch_uuid_field(patch: &Patch, key: &str) -> Option<Uuid> {
    match patch.get(key) {
        Some(Value::String(raw)) => Uuid::parse_str(raw.trim()).ok(),
        _ => None,
    }
}

/// Decodes a complete record.
pub fn decode_record<T: SyncEntity>(patch: &Patch) -> Result<T, PatchError> {
    patch_id(patch)?;
    Ok(serde_json::from_value(Value::Object(patch.clone()))?)
}

/// Shallow-merges `patch` into `current`, keeping `current`'s id.
pub fn merge_patch<T: SyncEntity>(current: &T, patch: &Patch) -> Result<T, PatchError> {
    let mut object = match serde_json::to_value(current)? {
        Value::Object(object) => object,
        _ => return Err(PatchError::NotAnObject),
    };
    for (key, value) in patch {
        if key == ID_KEY {
            continue;
        }
        object.insert(key.clone(), value.clone());
    }
    Ok(serde_json::from_value(Value::Object(object))?)
}

/// Serializes a typed record into patch form.
pub fn to_patch<T: SyncEntity>(record: &T) -> Result<Patch, PatchError> {
    match serde_json::to_value(record)? {
        Value::Object(object) => Ok(object),
        _ => Err(PatchError::NotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_record, merge_patch, patch_id, Patch, PatchError};
    use crate::model::item::Item;
    use serde_json::json;
    use uuid::Uuid;

    fn patch(value: serde_json::Value) -> Patch {
        value.as_object().cloned().expect("test patch must be an object")
    }

    #[test]
    fn merge_replaces_top_level_fields_only() {
        let mut item = Item::new(Uuid::new_v4(), "draft");
        item.checklist = vec![json!({"text": "a", "done": false})];
        let merged = merge_patch(
            &item,
            &patch(json!({"title": "final", "checklist": [{"text": "b"}]})),
        )
        .unwrap();
        assert_eq!(merged.title, "final");
        assert_eq!(merged.checklist, vec![json!({"text": "b"})]);
        assert_eq!(merged.container_id, item.container_id);
    }

    #[test]
    fn merge_ignores_id_in_patch() {
        let item = Item::new(Uuid::new_v4(), "draft");
        let other = Uuid::new_v4().to_string();
        let merged = merge_patch(&item, &patch(json!({"id": other, "status": "done"}))).unwrap();
        assert_eq!(merged.id, item.id);
        assert_eq!(merged.status.as_deref(), Some("done"));
    }

    #[test]
    fn merge_is_idempotent() {
        let item = Item::new(Uuid::new_v4(), "draft");
        let update = patch(json!({"priority": "high"}));
        let once = merge_patch(&item, &update).unwrap();
        let twice = merge_patch(&once, &update).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_rejects_wrong_field_type() {
        let item = Item::new(Uuid::new_v4(), "draft");
        let err = merge_patch(&item, &patch(json!({"title": 42}))).unwrap_err();
        assert!(matches!(err, PatchError::Shape(_)));
    }

    #[test]
    fn patch_id_reports_missing_and_invalid() {
        assert!(matches!(
            patch_id(&patch(json!({"title": "x"}))),
            Err(PatchError::MissingId)
        ));
        assert!(matches!(
            patch_id(&patch(json!({"id": "nope"}))),
            Err(PatchError::InvalidId(_))
        ));
    }

    #[test]
    fn decode_record_requires_complete_shape() {
        let id = Uuid::new_v4();
        let err = decode_record::<Item>(&patch(json!({"id": id.to_string(), "title": "x"})))
            .unwrap_err();
        assert!(matches!(err, PatchError::Shape(_)));
    }
}
