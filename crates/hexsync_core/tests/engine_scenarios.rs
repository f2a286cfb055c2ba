mod common;

use common::{board, ids, message, pump, started_engine};
use hexsync_core::{
    Cell, Container, ContainerKind, EntityTable, EventType, FeedDisposition, Item, MoveState,
    RecordingObserver, RemoteError, RemoteStore, SyncNotification,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn confirmed_move_is_visible_before_and_after_response() {
    let board = board();
    let mut engine = started_engine(&board);

    let pending = engine
        .begin_move(board.x.id, board.a.id, board.b.id)
        .unwrap()
        .unwrap();
    assert!(engine.store().items_in(board.a.id).is_empty());
    assert_eq!(ids(engine.store().items_in(board.b.id)), vec![board.x.id]);

    let response = engine.remote().move_item(board.x.id, board.b.id);
    let canonical = response.clone().unwrap().unwrap();
    let outcome = engine.complete_move(pending, response, 10);
    assert_eq!(outcome.state, MoveState::Confirmed);
    assert_eq!(engine.store().items_in(board.b.id), &[canonical]);
    assert!(engine.store().items_in(board.a.id).is_empty());

    // The server echo of our own move changes nothing.
    let before = engine.store().clone();
    assert_eq!(pump(&mut engine), vec![FeedDisposition::Unchanged]);
    assert_eq!(engine.store(), &before);
}

#[test]
fn rejected_move_restores_exact_state() {
    let board = board();
    let mut engine = started_engine(&board);
    let before = engine.store().clone();

    engine.remote().set_reject_moves(true);
    let state = engine.move_item(board.x.id, board.a.id, board.b.id, 10).unwrap();
    assert_eq!(state, MoveState::RolledBack);
    assert_eq!(engine.store(), &before);
    assert_eq!(ids(engine.store().items_in(board.a.id)), vec![board.x.id]);
    assert!(engine.store().items_in(board.b.id).is_empty());
}

#[test]
fn transport_failure_during_move_rolls_back() {
    let board = board();
    let mut engine = started_engine(&board);
    let before = engine.store().clone();
    let observer = Arc::new(RecordingObserver::new());
    engine.subscribe_notifications(observer.clone());

    engine.remote().set_available(false);
    let state = engine.move_item(board.x.id, board.a.id, board.b.id, 10).unwrap();
    assert_eq!(state, MoveState::RolledBack);
    assert_eq!(engine.store(), &before);

    let received = observer.take();
    assert!(matches!(received[0], SyncNotification::MoveStarted(_)));
    assert!(matches!(received[1], SyncNotification::Moved(notice) if notice.optimistic));
    assert!(matches!(received[2], SyncNotification::MoveReverted(_)));
}

#[test]
fn same_container_move_is_idle() {
    let board = board();
    let mut engine = started_engine(&board);
    let state = engine.move_item(board.x.id, board.a.id, board.a.id, 10).unwrap();
    assert_eq!(state, MoveState::Idle);
    assert_eq!(engine.remote().calls().move_item, 0);
}

#[test]
fn region_delete_removes_containers_and_items() {
    let board = board();
    let mut engine = started_engine(&board);
    let handle = engine.subscription().unwrap();
    let delete = message(
        &board.scope,
        EntityTable::Regions,
        EventType::Delete,
        None,
        Some(json!({"id": board.region.id.to_string()})),
    );

    assert_eq!(engine.handle_feed(&handle, &delete), FeedDisposition::Applied);
    assert!(engine.store().region(board.region.id).is_none());
    assert!(engine.store().containers().is_empty());
    assert!(engine.store().item(board.x.id).is_none());
    assert_eq!(engine.handle_feed(&handle, &delete), FeedDisposition::Unchanged);
}

#[test]
fn repeated_update_is_idempotent() {
    let board = board();
    let mut engine = started_engine(&board);
    let handle = engine.subscription().unwrap();
    let update = message(
        &board.scope,
        EntityTable::Items,
        EventType::Update,
        Some(json!({"id": board.x.id.to_string(), "priority": "high", "title": "x2"})),
        Some(json!({"id": board.x.id.to_string()})),
    );

    assert_eq!(engine.handle_feed(&handle, &update), FeedDisposition::Applied);
    let once = engine.store().clone();
    assert_eq!(engine.handle_feed(&handle, &update), FeedDisposition::Unchanged);
    assert_eq!(engine.store(), &once);
    assert_eq!(once.item(board.x.id).unwrap().title, "x2");
}

#[test]
fn update_without_old_value_moves_item_by_scan() {
    let board = board();
    let mut engine = started_engine(&board);
    let handle = engine.subscription().unwrap();
    let observer = Arc::new(RecordingObserver::new());
    engine.subscribe_notifications(observer.clone());
    let update = message(
        &board.scope,
        EntityTable::Items,
        EventType::Update,
        Some(json!({"id": board.x.id.to_string(), "container_id": board.b.id.to_string()})),
        None,
    );

    assert_eq!(engine.handle_feed(&handle, &update), FeedDisposition::Applied);
    assert_eq!(ids(engine.store().items_in(board.b.id)), vec![board.x.id]);
    assert!(engine.store().items_in(board.a.id).is_empty());
    assert!(matches!(
        observer.take().as_slice(),
        [SyncNotification::Moved(notice)] if !notice.optimistic && notice.to == board.b.id
    ));
}

#[test]
fn resolver_miss_drops_partial_update() {
    let board = board();
    let never_found = |_: &hexsync_core::CanonicalStore, _: Uuid| -> Option<Uuid> { None };
    let mut engine = started_engine(&board).with_resolver(Box::new(never_found));
    let handle = engine.subscription().unwrap();
    let update = message(
        &board.scope,
        EntityTable::Items,
        EventType::Update,
        Some(json!({"id": board.x.id.to_string(), "container_id": board.b.id.to_string()})),
        None,
    );
    assert_eq!(engine.handle_feed(&handle, &update), FeedDisposition::Unchanged);
    assert_eq!(ids(engine.store().items_in(board.a.id)), vec![board.x.id]);
}

#[test]
fn malformed_messages_are_dropped() {
    let board = board();
    let mut engine = started_engine(&board);
    let handle = engine.subscription().unwrap();
    let before = engine.store().clone();

    let missing_id = message(
        &board.scope,
        EntityTable::Items,
        EventType::Update,
        Some(json!({"title": "no id"})),
        None,
    );
    let foreign_scope = message(
        &hexsync_core::ProjectScope::new(Uuid::new_v4()),
        EntityTable::Items,
        EventType::Delete,
        None,
        Some(json!({"id": board.x.id.to_string()})),
    );
    let mut unknown_table = missing_id.clone();
    unknown_table.table = "sprints".to_string();

    for bad in [missing_id, foreign_scope, unknown_table] {
        assert_eq!(engine.handle_feed(&handle, &bad), FeedDisposition::Dropped);
    }
    assert_eq!(engine.store(), &before);
}

#[test]
fn crud_round_trips_through_reconciler() {
    let board = board();
    let mut engine = started_engine(&board);

    let region = engine
        .create_region("Platform", Some("#22aa88".to_string()), &[(4, 4), (4, 5)])
        .unwrap();
    assert_eq!(engine.store().cells_in(region.id).count(), 2);
    assert_eq!(engine.remote().calls().fetch_cells, 1);

    let container = engine
        .create_container(region.id, 4, 4, ContainerKind::Milestone, "M1")
        .unwrap();
    let fields = json!({"title": "write docs", "status": "todo"});
    let item = engine
        .create_item(container.id, fields.as_object().unwrap())
        .unwrap();
    assert_eq!(ids(engine.store().items_in(container.id)), vec![item.id]);

    let patch = json!({"status": "done"});
    engine.update_item(item.id, patch.as_object().unwrap()).unwrap();
    assert_eq!(
        engine.store().item(item.id).unwrap().status.as_deref(),
        Some("done")
    );

    let edge = engine
        .create_edge(board.a.id, container.id, hexsync_core::EdgeKind::Primary)
        .unwrap();
    assert_eq!(engine.store().edges().len(), 1);

    // Feed echoes of our own writes are no-ops.
    let unchanged = |dispositions: Vec<FeedDisposition>| {
        dispositions
            .iter()
            .all(|disposition| *disposition == FeedDisposition::Unchanged)
    };
    assert!(unchanged(pump(&mut engine)));

    assert!(engine.delete_container(container.id).unwrap());
    assert!(engine.store().item(item.id).is_none());
    assert!(engine.store().edges().iter().all(|kept| kept.id != edge.id));
    assert!(unchanged(pump(&mut engine)));
}

#[test]
fn region_insert_from_feed_hydrates_cells() {
    let board = board();
    let mut engine = started_engine(&board);
    let region = hexsync_core::Region::new(board.scope.project_id, "Remote");
    let cells = [Cell::new(region.id, 7, 7)];
    engine.remote().create_region(&region, &cells).unwrap();

    let dispositions = pump(&mut engine);
    assert_eq!(dispositions[0], FeedDisposition::Applied);
    // The cell INSERT arrives after hydration already merged it.
    assert_eq!(dispositions[1], FeedDisposition::Unchanged);
    assert_eq!(engine.store().cells_in(region.id).count(), 1);
}

#[test]
fn item_insert_for_new_container_is_not_duplicated() {
    let board = board();
    let mut engine = started_engine(&board);
    let container = Container::new(board.region.id, 9, 9, ContainerKind::Sprint, "S9");
    engine.remote().create_container(&container).unwrap();
    let fields = json!({"title": "seeded"});
    let item: Item = engine
        .remote()
        .create_item(container.id, fields.as_object().unwrap())
        .unwrap();

    pump(&mut engine);
    pump(&mut engine);
    assert_eq!(ids(engine.store().items_in(container.id)), vec![item.id]);
    assert_eq!(engine.remote().calls().fetch_items, 1);
}

#[test]
fn presence_uses_configured_threshold() {
    let board = board();
    let mut engine = started_engine(&board);
    let threshold = engine.config().presence_stale_ms;
    let participant = Uuid::new_v4();
    let now = 1_000_000;

    let live = engine.touch_presence("standup", participant, now - threshold, now);
    assert!(live.is_empty());
    let live = engine.touch_presence("standup", participant, now - threshold + 1, now);
    assert_eq!(live["standup"][0].id, participant);
}

#[test]
fn invalidate_drops_record_until_reload() {
    let board = board();
    let mut engine = started_engine(&board);
    let removal = engine.invalidate(board.a.id);
    assert_eq!(removal.items, vec![board.x.id]);
    assert!(engine.store().container(board.a.id).is_none());

    engine.full_resync(100).unwrap();
    assert!(engine.store().container(board.a.id).is_some());
    assert!(engine.store().item(board.x.id).is_some());
}

#[test]
fn remote_errors_surface_from_crud() {
    let board = board();
    let mut engine = started_engine(&board);
    engine.remote().set_available(false);
    let err = engine.delete_item(board.x.id).unwrap_err();
    assert!(matches!(
        err,
        hexsync_core::SyncError::Remote(RemoteError::Unavailable(_))
    ));
    assert!(engine.store().item(board.x.id).is_some());
}
