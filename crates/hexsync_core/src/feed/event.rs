//! Change-feed message schema and typed demultiplexing.
//!
//! # Invariants
//! - `old` is best-effort; decoding never requires it for UPDATE.
//! - A message without a usable id is rejected, never half-applied.

use crate::feed::ProjectScope;
use crate::model::item::Item;
use crate::model::patch::{decode_record, patch_id, Patch, PatchError};
use crate::model::zone::{Cell, Container, Edge, Region};
use crate::model::{EntityTable, SyncEntity};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Row-level change kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Insert,
    Update,
    Delete,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Raw change notification as pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedMessage {
    pub table: String,
    pub event_type: String,
    pub scope_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Patch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Patch>,
}

impl FeedMessage {
    /// Builds a message for `table` in `scope`.
    pub fn new(
        table: EntityTable,
        event_type: EventType,
        scope: &ProjectScope,
        new: Option<Patch>,
        old: Option<Patch>,
    ) -> Self {
        Self {
            table: table.as_str().to_string(),
            event_type: event_type.as_str().to_string(),
            scope_id: scope.project_id.to_string(),
            new,
            old,
        }
    }
}

/// Typed change for one table.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    Insert(T),
    Update {
        id: Uuid,
        patch: Patch,
        old: Option<Patch>,
    },
    Delete {
        id: Uuid,
    },
}

impl<T> Change<T> {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Insert(_) => EventType::Insert,
            Self::Update { .. } => EventType::Update,
            Self::Delete { .. } => EventType::Delete,
        }
    }
}

/// Change demultiplexed by table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableChange {
    Region(Change<Region>),
    Cell(Change<Cell>),
    Container(Change<Container>),
    Item(Change<Item>),
    Edge(Change<Edge>),
}

impl TableChange {
    pub fn table(&self) -> EntityTable {
        match self {
            Self::Region(_) => EntityTable::Regions,
            Self::Cell(_) => EntityTable::Cells,
            Self::Container(_) => EntityTable::Containers,
            Self::Item(_) => EntityTable::Items,
            Self::Edge(_) => EntityTable::Edges,
        }
    }
}

/// Reasons a feed message is dropped.
#[derive(Debug)]
pub enum FeedError {
    UnknownTable(String),
    UnknownEventType(String),
    ScopeMismatch { expected: Uuid, actual: String },
    /// Required record side (`new` or `old`) is absent.
    MissingRecord(EventType),
    Record(PatchError),
}

impl Display for FeedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTable(value) => write!(f, "unknown feed table: {value}"),
            Self::UnknownEventType(value) => write!(f, "unknown feed event type: {value}"),
            Self::ScopeMismatch { expected, actual } => {
                write!(f, "feed scope mismatch: expected {expected}, got {actual}")
            }
            Self::MissingRecord(event_type) => {
                write!(f, "{} message carries no record", event_type.as_str())
            }
            Self::Record(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FeedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Record(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PatchError> for FeedError {
    fn from(value: PatchError) -> Self {
        Self::Record(value)
    }
}

/// Decodes and routes one message for `scope`.
pub fn decode_message(
    message: &FeedMessage,
    scope: &ProjectScope,
) -> Result<TableChange, FeedError> {
    let scope_matches = Uuid::parse_str(message.scope_id.trim())
        .map(|id| id == scope.project_id)
        .unwrap_or(false);
    if !scope_matches {
        return Err(FeedError::ScopeMismatch {
            expected: scope.project_id,
            actual: message.scope_id.clone(),
        });
    }

    let table = EntityTable::parse(&message.table)
        .ok_or_else(|| FeedError::UnknownTable(message.table.clone()))?;
    let event_type = EventType::parse(&message.event_type)
        .ok_or_else(|| FeedError::UnknownEventType(message.event_type.clone()))?;

    Ok(match table {
        EntityTable::Regions => TableChange::Region(decode_change(message, event_type)?),
        EntityTable::Cells => TableChange::Cell(decode_change(message, event_type)?),
        EntityTable::Containers => TableChange::Container(decode_change(message, event_type)?),
        EntityTable::Items => TableChange::Item(decode_change(message, event_type)?),
        EntityTable::Edges => TableChange::Edge(decode_change(message, event_type)?),
    })
}

fn decode_change<T: SyncEntity>(
    message: &FeedMessage,
    event_type: EventType,
) -> Result<Change<T>, FeedError> {
    match event_type {
        EventType::Insert => {
            let new = message
                .new
                .as_ref()
                .ok_or(FeedError::MissingRecord(event_type))?;
            Ok(Change::Insert(decode_record(new)?))
        }
        EventType::Update => {
            let new = message
                .new
                .as_ref()
                .ok_or(FeedError::MissingRecord(event_type))?;
            let id = match patch_id(new) {
                Ok(id) => id,
                Err(PatchError::MissingId) => match message.old.as_ref() {
                    Some(old) => patch_id(old)?,
                    None => return Err(PatchError::MissingId.into()),
                },
                Err(err) => return Err(err.into()),
            };
            Ok(Change::Update {
                id,
                patch: new.clone(),
                old: message.old.clone(),
            })
        }
        EventType::Delete => {
            let record = message
                .old
                .as_ref()
                .or(message.new.as_ref())
                .ok_or(FeedError::MissingRecord(event_type))?;
            Ok(Change::Delete {
                id: patch_id(record)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_message, Change, EventType, FeedError, FeedMessage, TableChange};
    use crate::feed::ProjectScope;
    use crate::model::item::Item;
    use crate::model::patch::to_patch;
    use crate::model::EntityTable;
    use serde_json::json;
    use uuid::Uuid;

    fn scope() -> ProjectScope {
        ProjectScope::new(Uuid::new_v4())
    }

    #[test]
    fn parses_wire_json_with_camel_case_keys() {
        let scope = scope();
        let id = Uuid::new_v4();
        let raw = json!({
            "table": "items",
            "eventType": "DELETE",
            "scopeId": scope.project_id.to_string(),
            "old": {"id": id.to_string()}
        });
        let message: FeedMessage = serde_json::from_value(raw).unwrap();
        let change = decode_message(&message, &scope).unwrap();
        assert_eq!(change, TableChange::Item(Change::Delete { id }));
    }

    #[test]
    fn insert_decodes_full_record() {
        let scope = scope();
        let item = Item::new(Uuid::new_v4(), "ticket");
        let message = FeedMessage::new(
            EntityTable::Items,
            EventType::Insert,
            &scope,
            Some(to_patch(&item).unwrap()),
            None,
        );
        let change = decode_message(&message, &scope).unwrap();
        assert_eq!(change, TableChange::Item(Change::Insert(item)));
    }

    #[test]
    fn update_without_id_in_new_falls_back_to_old() {
        let scope = scope();
        let id = Uuid::new_v4();
        let message = FeedMessage::new(
            EntityTable::Containers,
            EventType::Update,
            &scope,
            json!({"title": "renamed"}).as_object().cloned(),
            json!({"id": id.to_string()}).as_object().cloned(),
        );
        match decode_message(&message, &scope).unwrap() {
            TableChange::Container(Change::Update { id: decoded, .. }) => assert_eq!(decoded, id),
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_id_foreign_scope_and_unknown_table() {
        let scope = scope();
        let missing_id = FeedMessage::new(
            EntityTable::Items,
            EventType::Update,
            &scope,
            json!({"title": "x"}).as_object().cloned(),
            None,
        );
        assert!(matches!(
            decode_message(&missing_id, &scope),
            Err(FeedError::Record(_))
        ));

        let foreign = FeedMessage::new(EntityTable::Items, EventType::Delete, &scope, None, None);
        assert!(matches!(
            decode_message(&foreign, &ProjectScope::new(Uuid::new_v4())),
            Err(FeedError::ScopeMismatch { .. })
        ));

        let mut unknown = foreign.clone();
        unknown.table = "avatars".to_string();
        assert!(matches!(
            decode_message(&unknown, &scope),
            Err(FeedError::UnknownTable(_))
        ));
    }

    #[test]
    fn delete_without_record_is_rejected() {
        let scope = scope();
        let message = FeedMessage::new(EntityTable::Edges, EventType::Delete, &scope, None, None);
        assert!(matches!(
            decode_message(&message, &scope),
            Err(FeedError::MissingRecord(EventType::Delete))
        ));
    }
}
