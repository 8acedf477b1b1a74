//! End-to-end behaviour of an open spreadsheet, driven through the in-memory
//! backend and a recording transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gridshare_core::sync::{LocalTransport, SharedLog};
use gridshare_core::{
    Backend, CellRange, CellRef, ChannelState, Config, EditSurface, GridshareError, Key,
    MemoryBackend, OpenOptions, ReloadPolicy, Session, TransportEvent,
};
use gridshare_model::model::User;

struct Harness {
    backend: Arc<MemoryBackend>,
    log: SharedLog,
    session: Session,
}

fn alice() -> User {
    User {
        id: 1,
        username: "alice".into(),
    }
}

fn open_with(config: Config, live: bool, extra_sheets: &[&str]) -> Harness {
    let backend = Arc::new(MemoryBackend::new(alice()));
    let spreadsheet = backend.create_spreadsheet("Budget").unwrap();
    for name in extra_sheets {
        backend.add_sheet(spreadsheet.id, name).unwrap();
    }
    let transport = LocalTransport::new();
    let log = transport.log();
    let mut session = Session::open(
        Box::new(Arc::clone(&backend)),
        Box::new(transport),
        spreadsheet.id,
        &config,
        &OpenOptions { sheet: None, live },
    )
    .unwrap();
    if live {
        session.handle_transport(TransportEvent::Opened, Instant::now());
    }
    Harness {
        backend,
        log,
        session,
    }
}

fn open() -> Harness {
    open_with(Config::default(), true, &[])
}

fn a1(text: &str) -> CellRef {
    CellRef::from_str(text).unwrap()
}

fn text(session: &Session, at: &str) -> String {
    session.store().display_text(&a1(at))
}

fn remote_update(sheet_id: i64, user_id: i64, at: &str, value: &str, version: u64) -> TransportEvent {
    let cell = a1(at);
    TransportEvent::Frame(
        serde_json::json!({
            "type": "cell_update",
            "user_id": user_id,
            "sheet_id": sheet_id,
            "row": cell.row,
            "column": cell.column,
            "value": value,
            "formula": "",
            "style": {},
            "version": version,
        })
        .to_string(),
    )
}

#[test]
fn test_commit_persists_and_broadcasts() {
    let mut h = open();
    let sheet_id = h.session.active_sheet().id;
    h.session.commit(a1("B2"), "42");

    assert_eq!(text(&h.session, "B2"), "42");
    let stored = h.backend.stored_cell(sheet_id, a1("B2")).unwrap();
    assert_eq!(stored.value, "42");

    let sent = h.log.lock().unwrap().sent.clone();
    assert!(sent.iter().any(|frame| frame.contains("\"cell_update\"") && frame.contains("\"42\"")));
}

#[test]
fn test_empty_and_lone_equals_clear_but_keep_style() {
    let mut h = open();
    let at = a1("C3");
    h.session.fill_background(CellRange::single(at), "#E3F2FD");

    for raw in ["", "="] {
        h.session.commit(at, "value");
        h.session.commit(at, raw);
        let cell = h.session.store().get(&at).unwrap();
        assert!(cell.value.is_empty());
        assert!(cell.formula.is_empty());
        assert_eq!(cell.style.background_color.as_deref(), Some("#E3F2FD"));
    }
}

#[test]
fn test_undo_and_redo_walk_the_whole_stack() {
    let mut h = open();
    let sheet_id = h.session.active_sheet().id;
    h.session.commit(a1("A1"), "1");
    h.session.commit(a1("A2"), "2");
    h.session.commit(a1("A1"), "3");

    for _ in 0..3 {
        h.session.undo().unwrap();
    }
    assert!(h.session.store().is_empty());
    assert!(!h.session.can_undo());
    assert!(matches!(h.session.undo(), Err(GridshareError::NothingToUndo)));
    let stored = h.backend.stored_cell(sheet_id, a1("A1"));
    assert!(stored.is_none_or(|c| c.value.is_empty()));

    for _ in 0..3 {
        h.session.redo().unwrap();
    }
    assert_eq!(text(&h.session, "A1"), "3");
    assert_eq!(text(&h.session, "A2"), "2");
    assert!(!h.session.can_redo());
    assert_eq!(h.backend.stored_cell(sheet_id, a1("A1")).unwrap().value, "3");
}

#[test]
fn test_undo_and_redo_keep_plain_values_on_the_server() {
    let mut h = open();
    let sheet_id = h.session.active_sheet().id;
    h.session.commit(a1("A1"), "42");
    h.session.commit(a1("B1"), "=A1*2");
    h.session.commit(a1("A1"), "43");

    h.session.undo().unwrap();
    assert_eq!(text(&h.session, "A1"), "42");
    assert_eq!(h.backend.stored_cell(sheet_id, a1("A1")).unwrap().value, "42");
    assert_eq!(h.backend.stored_cell(sheet_id, a1("B1")).unwrap().formula, "=A1*2");

    h.session.redo().unwrap();
    assert_eq!(text(&h.session, "A1"), "43");
    assert_eq!(h.backend.stored_cell(sheet_id, a1("A1")).unwrap().value, "43");

    h.session.undo().unwrap();
    h.session.undo().unwrap();
    assert_eq!(text(&h.session, "A1"), "42");
    assert!(h.session.store().get(&a1("B1")).is_none());
    assert!(h.backend.stored_cell(sheet_id, a1("B1")).unwrap().formula.is_empty());

    // Plain cells are restated with a value only, formulas with a formula only.
    for body in h.backend.batch_bodies() {
        for update in body["updates"].as_array().unwrap() {
            let formula = update.get("formula").and_then(|f| f.as_str());
            let value = update.get("value").and_then(|v| v.as_str());
            match (value, formula) {
                (Some(v), Some(f)) => assert!(v.is_empty() && f.is_empty()),
                (Some(_), None) | (None, Some(_)) => {}
                (None, None) => panic!("update without content: {update}"),
            }
        }
    }
    assert!(h.backend.batch_bodies().len() >= 4);
}

#[test]
fn test_undo_broadcasts_restored_cells() {
    let mut h = open();
    h.session.commit(a1("D4"), "x");
    let before = h.log.lock().unwrap().sent.len();
    h.session.undo().unwrap();

    let log = h.log.lock().unwrap();
    assert!(log.sent.len() > before);
    let last: serde_json::Value = serde_json::from_str(log.sent.last().unwrap()).unwrap();
    assert_eq!(last["type"], "cell_update");
    assert_eq!(last["row"], 4);
    assert_eq!(last["value"], "");
}

#[test]
fn test_new_commit_after_undo_drops_redo() {
    let mut h = open();
    h.session.commit(a1("A1"), "1");
    h.session.commit(a1("A1"), "2");
    h.session.undo().unwrap();
    h.session.commit(a1("B1"), "b");
    assert!(!h.session.can_redo());
    assert_eq!(text(&h.session, "A1"), "1");
}

#[test]
fn test_undo_depth_is_bounded() {
    let mut h = open();
    for i in 0..51 {
        h.session.commit(a1("A1"), &i.to_string());
    }
    let mut steps = 0;
    while h.session.can_undo() {
        h.session.undo().unwrap();
        steps += 1;
    }
    assert!(steps <= 50);
    assert_eq!(steps, 49);
    assert_eq!(text(&h.session, "A1"), "1");
}

#[test]
fn test_keyboard_edit_commits_and_moves_down() {
    let mut h = open();
    h.session.pointer_down(a1("B2"), false).unwrap();
    for c in "=A1+1".chars() {
        h.session.key(EditSurface::Grid, Key::Char(c)).unwrap();
    }
    h.session.key(EditSurface::Grid, Key::Enter).unwrap();

    assert_eq!(h.session.store().get(&a1("B2")).unwrap().formula, "=A1+1");
    assert_eq!(h.session.selection().selected(), a1("B3"));
    assert!(!h.session.selection().is_editing());
}

#[test]
fn test_remote_echo_never_touches_store() {
    let mut h = open();
    let sheet_id = h.session.active_sheet().id;
    let event = h
        .session
        .handle_transport(remote_update(sheet_id, 1, "A1", "echo", 9), Instant::now());
    assert!(event.is_none());
    assert!(h.session.store().is_empty());
}

#[test]
fn test_remote_update_applies_unless_stale_or_elsewhere() {
    let mut h = open_with(Config::default(), true, &["Other"]);
    let sheet_id = h.session.active_sheet().id;
    let other = h.session.sheets()[1].id;
    let now = Instant::now();

    h.session.handle_transport(remote_update(sheet_id, 2, "A1", "peer", 5), now);
    assert_eq!(text(&h.session, "A1"), "peer");

    h.session.handle_transport(remote_update(sheet_id, 2, "A1", "older", 4), now);
    assert_eq!(text(&h.session, "A1"), "peer");

    h.session.handle_transport(remote_update(other, 2, "A2", "other", 1), now);
    assert!(h.session.store().get(&a1("A2")).is_none());
}

#[test]
fn test_remote_edits_are_undoable_with_next_commit() {
    let mut h = open();
    let sheet_id = h.session.active_sheet().id;
    h.session
        .handle_transport(remote_update(sheet_id, 2, "A1", "peer", 3), Instant::now());
    h.session.commit(a1("B1"), "mine");
    h.session.undo().unwrap();

    assert_eq!(text(&h.session, "A1"), "peer");
    assert!(h.session.store().get(&a1("B1")).is_none());
}

#[test]
fn test_cross_sheet_reference_and_commit_to_origin() {
    let mut h = open_with(Config::default(), true, &["Data"]);
    let origin = h.session.active_sheet().clone();
    let data = h.session.sheets()[1].clone();

    h.session.pointer_down(a1("A1"), false).unwrap();
    h.session.key(EditSurface::Grid, Key::Char('=')).unwrap();
    h.session.pointer_down(a1("C2"), false).unwrap();
    assert_eq!(h.session.selection().draft(), Some("=C2"));
    h.session.key(EditSurface::Grid, Key::Char('+')).unwrap();

    h.session.switch_sheet(data.id).unwrap();
    assert!(h.session.selection().is_editing());
    h.session.pointer_down(a1("B2"), false).unwrap();
    assert_eq!(h.session.selection().draft(), Some("=C2+Data!B2"));

    h.session.key(EditSurface::Grid, Key::Enter).unwrap();
    assert_eq!(h.session.active_sheet().id, origin.id);
    assert_eq!(h.session.store().get(&a1("A1")).unwrap().formula, "=C2+Data!B2");
}

#[test]
fn test_failed_commit_still_moves_cursor_for_peers() {
    let mut h = open_with(Config::default(), true, &["Data"]);
    let origin = h.session.active_sheet().clone();
    let data = h.session.sheets()[1].clone();

    h.session.pointer_down(a1("A1"), false).unwrap();
    h.session.key(EditSurface::Grid, Key::Char('=')).unwrap();
    h.session.switch_sheet(data.id).unwrap();
    h.session.pointer_down(a1("B2"), false).unwrap();

    // Another client removes the sheet the edit started on.
    h.backend.delete_sheet(origin.id).unwrap();
    let result = h.session.key(EditSurface::Grid, Key::Enter);
    assert!(matches!(result, Err(GridshareError::NotFound(_))));
    assert_eq!(h.session.active_sheet().id, data.id);

    let log = h.log.lock().unwrap();
    let last: serde_json::Value = serde_json::from_str(log.sent.last().unwrap()).unwrap();
    assert_eq!(last["type"], "cursor_move");
    assert_eq!(last["row"], 2);
    assert_eq!(last["column"], 1);
}

#[test]
fn test_background_fill_styles_exactly_the_range() {
    let mut h = open();
    let range = CellRange::new(CellRef::new(2, 1), CellRef::new(4, 2));
    h.session.fill_background(range, "#FFF9C4");

    let styled: Vec<CellRef> = h
        .session
        .store()
        .cells()
        .into_iter()
        .filter(|c| c.style.background_color.as_deref() == Some("#FFF9C4"))
        .map(|c| c.cell_ref())
        .collect();
    assert_eq!(styled.len(), 6);
    assert!(styled.iter().all(|at| range.contains(at)));

    h.session.remove_color(range);
    assert!(
        h.session
            .store()
            .cells()
            .iter()
            .all(|c| c.style.background_color.as_deref() == Some("#FFFFFF"))
    );
}

#[test]
fn test_switching_sheets_resets_history() {
    let mut h = open_with(Config::default(), true, &["Second"]);
    h.session.commit(a1("A1"), "x");
    h.session.undo().unwrap();
    assert!(h.session.can_redo());

    let second = h.session.sheets()[1].id;
    h.session.switch_sheet(second).unwrap();
    assert!(!h.session.can_undo());
    assert!(!h.session.can_redo());
    assert!(h.session.store().is_empty());
}

#[test]
fn test_sheet_lifecycle() {
    let mut h = open();
    let first = h.session.active_sheet().clone();
    assert_eq!(first.name, "Sheet1");

    let added = h.session.add_sheet().unwrap();
    assert_eq!(added.name, "Sheet2");
    assert_eq!(h.session.active_sheet().id, added.id);

    h.session.rename_sheet(added.id, "  Totals ").unwrap();
    assert_eq!(h.session.active_sheet().name, "Totals");
    assert!(matches!(
        h.session.rename_sheet(added.id, "   "),
        Err(GridshareError::Validation(_))
    ));

    h.session.delete_sheet(added.id).unwrap();
    assert_eq!(h.session.active_sheet().id, first.id);
    assert_eq!(h.session.sheets().len(), 1);
}

#[test]
fn test_last_sheet_cannot_be_deleted() {
    let mut h = open();
    let only = h.session.active_sheet().id;
    h.session.commit(a1("A1"), "kept");

    let err = h.session.delete_sheet(only).unwrap_err();
    assert!(matches!(err, GridshareError::Validation(_)));
    assert_eq!(h.session.active_sheet().id, only);
    assert_eq!(text(&h.session, "A1"), "kept");
}

#[test]
fn test_unknown_sheet_is_not_found() {
    let mut h = open();
    assert!(matches!(
        h.session.switch_sheet(9999),
        Err(GridshareError::NotFound(_))
    ));
    assert!(matches!(
        h.session.delete_sheet(9999),
        Err(GridshareError::NotFound(_))
    ));
}

#[test]
fn test_sharing_validates_usernames() {
    let mut h = open();
    h.backend.register_user("bob");

    assert!(matches!(h.session.share("  "), Err(GridshareError::Validation(_))));
    assert!(matches!(
        h.session.share("nobody"),
        Err(GridshareError::Validation(_))
    ));

    h.session.share(" bob ").unwrap();
    assert_eq!(h.session.spreadsheet().shared_with_usernames, vec!["bob".to_string()]);
    let users = h.session.shared_users().unwrap();
    assert!(users.iter().any(|u| u.username == "bob"));

    h.session.unshare("bob").unwrap();
    assert!(h.session.spreadsheet().shared_with_usernames.is_empty());
}

#[test]
fn test_rename_spreadsheet() {
    let mut h = open();
    h.session.rename_spreadsheet("Forecast").unwrap();
    assert_eq!(h.session.spreadsheet().name, "Forecast");
    assert!(h.session.rename_spreadsheet("").is_err());
    assert_eq!(h.session.spreadsheet().name, "Forecast");
}

#[test]
fn test_reload_follows_dependents() {
    let mut h = open();
    h.session.commit(a1("A1"), "5");
    assert!(h.session.reload_due().is_none());

    h.session.commit(a1("B1"), "=A1*2");
    assert!(h.session.reload_due().is_none());

    h.session.commit(a1("A1"), "6");
    assert!(h.session.reload_due().is_some());

    let before = h.session.history().len();
    h.session.tick(Instant::now() + Duration::from_secs(1));
    assert!(h.session.reload_due().is_none());
    assert_eq!(h.session.history().len(), before);
    assert_eq!(text(&h.session, "A1"), "6");
}

#[test]
fn test_reload_always_policy() {
    let mut config = Config::default();
    config.edit.reload_policy = ReloadPolicy::Always;
    let mut h = open_with(config, true, &[]);
    h.session.commit(a1("A1"), "5");
    assert!(h.session.reload_due().is_some());
}

#[test]
fn test_reload_for_previous_sheet_is_dropped() {
    let mut config = Config::default();
    config.edit.reload_policy = ReloadPolicy::Always;
    let mut h = open_with(config, true, &["Second"]);
    h.session.commit(a1("A1"), "5");
    let second = h.session.sheets()[1].id;
    h.session.switch_sheet(second).unwrap();
    assert!(h.session.reload_due().is_none());
}

#[test]
fn test_offline_session_never_opens_channel() {
    let mut h = open_with(Config::default(), false, &[]);
    h.session.commit(a1("A1"), "1");
    assert_eq!(h.session.channel().state(), ChannelState::Closed);
    let log = h.log.lock().unwrap();
    assert!(log.opened.is_empty());
    assert!(log.sent.is_empty());
}

#[test]
fn test_live_session_joins_spreadsheet_room() {
    let mut config = Config::default();
    config.token = Some("abc".into());
    let h = open_with(config, true, &[]);
    let log = h.log.lock().unwrap();
    let url = log.opened[0].as_str();
    assert!(url.starts_with("ws://localhost:8000/ws/spreadsheet/"));
    assert!(url.ends_with("?token=abc"));
}

#[test]
fn test_presence_lives_with_the_channel() {
    let mut h = open();
    let joined = serde_json::json!({"type": "user_joined", "user_id": 2, "username": "bob"});
    h.session
        .handle_transport(TransportEvent::Frame(joined.to_string()), Instant::now());
    assert_eq!(h.session.presence().unwrap().len(), 1);

    h.session.close();
    assert!(h.session.presence().is_none());
    assert!(h.session.reload_due().is_none());
}

#[test]
fn test_failed_persistence_keeps_local_value() {
    let mut h = open();
    h.backend.set_failing(true);
    let outcome = h.session.commit(a1("A1"), "offline");
    assert_eq!(outcome.failed, 1);
    assert_eq!(text(&h.session, "A1"), "offline");
    assert_eq!(h.session.take_notices().len(), 1);
    assert!(h.session.take_notices().is_empty());
}

#[test]
fn test_template_seeds_edit_for_selection() {
    let mut h = open();
    h.session.pointer_down(a1("A1"), false).unwrap();
    h.session.pointer_down(a1("A5"), true).unwrap();
    h.session
        .apply_template(gridshare_core::FormulaTemplate::Sum)
        .unwrap();
    assert_eq!(h.session.selection().draft(), Some("=SUM(A1:A5)"));
}
