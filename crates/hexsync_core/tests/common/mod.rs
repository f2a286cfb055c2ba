#![allow(dead_code)]

use hexsync_core::{
    Container, ContainerKind, EntityTable, EventType, FeedDisposition, FeedMessage,
    InMemoryRemote, Item, LoopbackTransport, ProjectScope, Region, ScopeSnapshot, SyncConfig,
    SyncEngine,
};
use serde_json::Value;
use uuid::Uuid;

pub type TestEngine = SyncEngine<InMemoryRemote, LoopbackTransport>;

pub struct Board {
    pub scope: ProjectScope,
    pub region: Region,
    pub a: Container,
    pub b: Container,
    pub c: Container,
    pub x: Item,
}

pub fn board() -> Board {
    let scope = ProjectScope::new(Uuid::new_v4());
    let region = Region::new(scope.project_id, "Delivery");
    let a = Container::new(region.id, 0, 0, ContainerKind::Backlog, "A");
    let b = Container::new(region.id, 1, 0, ContainerKind::Sprint, "B");
    let c = Container::new(region.id, 2, 0, ContainerKind::Sprint, "C");
    let x = Item::new(a.id, "x");
    Board {
        scope,
        region,
        a,
        b,
        c,
        x,
    }
}

pub fn config() -> SyncConfig {
    SyncConfig {
        reload_interval_ms: 5_000,
        failure_grace_ms: 2_000,
        ..SyncConfig::default()
    }
}

/// Engine started at t=0 against a remote seeded with `board`.
pub fn started_engine(board: &Board) -> TestEngine {
    let records = ScopeSnapshot {
        regions: vec![board.region.clone()],
        containers: vec![board.a.clone(), board.b.clone(), board.c.clone()],
        items: vec![board.x.clone()],
        ..ScopeSnapshot::default()
    };
    let remote = InMemoryRemote::with_records(board.scope, records);
    let mut engine = SyncEngine::new(board.scope, remote, LoopbackTransport::new(), config());
    engine.start(0).unwrap();
    engine
}

/// Delivers every message the remote produced since the last drain.
pub fn pump(engine: &mut TestEngine) -> Vec<FeedDisposition> {
    let handle = engine.subscription().unwrap();
    let messages = engine.remote().drain_feed();
    messages
        .iter()
        .map(|message| engine.handle_feed(&handle, message))
        .collect()
}

pub fn message(
    scope: &ProjectScope,
    table: EntityTable,
    event_type: EventType,
    new: Option<Value>,
    old: Option<Value>,
) -> FeedMessage {
    FeedMessage::new(
        table,
        event_type,
        scope,
        new.and_then(|value| value.as_object().cloned()),
        old.and_then(|value| value.as_object().cloned()),
    )
}

pub fn ids(items: &[Item]) -> Vec<Uuid> {
    items.iter().map(|item| item.id).collect()
}
