//! One open spreadsheet.
//!
//! Owns the cell store of the active sheet, its history, the selection
//! state, the live channel and the persistence backend, and routes input
//! and channel traffic between them. Everything runs on the caller's
//! thread; the host calls [`Session::tick`] regularly so debounced reloads
//! and reconnects can fire.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::backend::{Backend, CellWrite};
use crate::config::Config;
use crate::document::{
    CellStore, CommitContext, CommitOutcome, DependencyIndex, EditCommitter, EditSurface,
    FormulaTemplate, HistoryManager, Key, NO_COLOR, RangeOp, SelectionAction,
    SelectionController, SheetSnapshot,
};
use crate::error::{GridshareError, Result};
use crate::sync::{ChannelEvent, Presence, SyncChannel, Transport, TransportEvent, endpoint};
use gridshare_model::model::{
    CellPatch, CellRange, CellRef, CellStyle, Sheet, SheetId, Spreadsheet, SpreadsheetId, User,
};
use gridshare_model::protocol::{CellUpdateOut, ClientMessage, CursorMove, RemoteCellUpdate};

/// How to open a spreadsheet.
#[derive(Clone, Debug, Default)]
pub struct OpenOptions {
    /// Sheet to show first, by name or id. Defaults to the first sheet.
    pub sheet: Option<String>,
    /// Join the live channel.
    pub live: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingReload {
    sheet_id: SheetId,
    due: Instant,
}

pub struct Session {
    backend: Box<dyn Backend>,
    channel: SyncChannel,
    committer: EditCommitter,
    user: User,
    spreadsheet: Spreadsheet,
    sheets: Vec<Sheet>,
    active: Sheet,
    store: CellStore,
    history: HistoryManager,
    deps: DependencyIndex,
    selection: SelectionController,
    pending_reload: Option<PendingReload>,
    notices: Vec<String>,
}

fn require_text(text: &str, what: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GridshareError::Validation(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}

impl Session {
    /// Load the spreadsheet, show its first (or requested) sheet and, when
    /// asked, join its live channel.
    pub fn open(
        backend: Box<dyn Backend>,
        transport: Box<dyn Transport>,
        spreadsheet_id: SpreadsheetId,
        config: &Config,
        options: &OpenOptions,
    ) -> Result<Session> {
        let user = backend.current_user()?;
        let spreadsheet = backend.get_spreadsheet(spreadsheet_id)?;
        let mut sheets = backend.list_sheets(spreadsheet_id)?;
        if sheets.is_empty() {
            sheets.push(backend.add_sheet(spreadsheet_id, "Sheet1")?);
        }

        let active = match options.sheet.as_deref() {
            Some(wanted) => find_sheet(&sheets, wanted)
                .cloned()
                .ok_or_else(|| GridshareError::NotFound(format!("sheet '{wanted}'")))?,
            None => sheets[0].clone(),
        };

        let store = CellStore::from_cells(backend.list_cells(active.id)?);
        let mut history = HistoryManager::new(config.history.capacity);
        history.start(store.snapshot());
        let mut deps = DependencyIndex::new();
        deps.rebuild(&store, &active.name);

        let mut channel = SyncChannel::new(transport, config.sync.clone(), user.id);
        channel.set_active_sheet(active.id);
        if options.live {
            let url = endpoint(
                &config.effective_ws_base(),
                spreadsheet_id,
                config.token.as_deref(),
            )?;
            channel.connect(url);
        }

        info!(
            spreadsheet_id,
            sheet_id = active.id,
            cells = store.len(),
            user = %user.username,
            "opened spreadsheet"
        );

        Ok(Session {
            backend,
            channel,
            committer: EditCommitter::new(config.edit.clone()),
            user,
            spreadsheet,
            sheets,
            selection: SelectionController::new(active.clone()),
            active,
            store,
            history,
            deps,
            pending_reload: None,
            notices: Vec::new(),
        })
    }

    // Accessors

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn spreadsheet(&self) -> &Spreadsheet {
        &self.spreadsheet
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn active_sheet(&self) -> &Sheet {
        &self.active
    }

    pub fn store(&self) -> &CellStore {
        &self.store
    }

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn channel(&self) -> &SyncChannel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut SyncChannel {
        &mut self.channel
    }

    pub fn presence(&self) -> Option<&Presence> {
        self.channel.presence()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// When the pending reload of the active sheet is due, if any.
    pub fn reload_due(&self) -> Option<Instant> {
        self.pending_reload.map(|p| p.due)
    }

    /// Messages for the user collected since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    // Input

    pub fn pointer_down(&mut self, cell: CellRef, shift: bool) -> Result<()> {
        let actions = self.selection.pointer_down(cell, shift);
        self.run(actions)
    }

    pub fn pointer_enter(&mut self, cell: CellRef) -> Result<()> {
        let actions = self.selection.pointer_enter(cell);
        self.run(actions)
    }

    pub fn pointer_up(&mut self) {
        self.selection.pointer_up();
    }

    pub fn double_click(&mut self, cell: CellRef) -> Result<()> {
        let actions = self.selection.double_click(cell, &self.store);
        self.run(actions)
    }

    pub fn key(&mut self, surface: EditSurface, key: Key) -> Result<()> {
        let actions = self.selection.key(surface, key, &self.store);
        self.run(actions)
    }

    pub fn focus_formula_bar(&mut self) -> Result<()> {
        let actions = self.selection.focus_formula_bar(&self.store);
        self.run(actions)
    }

    pub fn focus_grid(&mut self) {
        self.selection.focus_grid();
    }

    pub fn set_draft(&mut self, surface: EditSurface, text: &str) -> Result<()> {
        let actions = self.selection.set_draft(surface, text);
        self.run(actions)
    }

    pub fn cancel_edit(&mut self) -> bool {
        self.selection.cancel_edit()
    }

    /// Start editing the selected cell with a template filled in for the
    /// current selection.
    pub fn apply_template(&mut self, template: FormulaTemplate) -> Result<()> {
        let text = template.apply(self.selection.selection_range());
        let actions = self.selection.begin_edit_with(text);
        self.run(actions)
    }

    /// Carry out selection actions in order. A failing action is logged and
    /// the rest still run; the first error is returned.
    fn run(&mut self, actions: Vec<SelectionAction>) -> Result<()> {
        let mut first_error = None;
        for action in actions {
            let result = match action {
                SelectionAction::CursorMoved(cell) => {
                    self.channel.send(&ClientMessage::CursorMove(CursorMove {
                        row: cell.row,
                        column: cell.column,
                    }));
                    Ok(())
                }
                SelectionAction::DraftChanged => Ok(()),
                SelectionAction::Commit {
                    cell,
                    sheet_id,
                    text,
                } => self.commit_to(sheet_id, cell, &text).map(|_| ()),
                SelectionAction::Clear(range) => {
                    self.clear_range(range);
                    Ok(())
                }
                SelectionAction::Undo => self.undo_quietly(),
                SelectionAction::Redo => self.redo_quietly(),
            };
            if let Err(err) = result {
                warn!(error = %err, "selection action failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // Editing

    fn context(&mut self) -> CommitContext<'_> {
        CommitContext {
            sheet: &self.active,
            store: &mut self.store,
            history: &mut self.history,
            deps: &self.deps,
            backend: self.backend.as_ref(),
            channel: &mut self.channel,
        }
    }

    /// Commit raw input into a cell of the active sheet.
    pub fn commit(&mut self, cell: CellRef, raw: &str) -> CommitOutcome {
        let committer = self.committer.clone();
        let outcome = committer.commit(&mut self.context(), cell, raw);
        self.after_write(&outcome);
        outcome
    }

    /// Commit into a cell of `sheet_id`, switching back to that sheet first
    /// when the user wandered off to pick cross-sheet references.
    pub fn commit_to(&mut self, sheet_id: SheetId, cell: CellRef, raw: &str) -> Result<CommitOutcome> {
        if sheet_id != self.active.id {
            self.switch_sheet(sheet_id)?;
        }
        Ok(self.commit(cell, raw))
    }

    pub fn clear_range(&mut self, range: CellRange) -> CommitOutcome {
        self.apply_range(range, RangeOp::Clear)
    }

    pub fn fill_background(&mut self, range: CellRange, color: &str) -> CommitOutcome {
        self.apply_range(range, RangeOp::Background(color.to_string()))
    }

    pub fn fill_text_color(&mut self, range: CellRange, color: &str) -> CommitOutcome {
        self.apply_range(range, RangeOp::TextColor(color.to_string()))
    }

    pub fn remove_color(&mut self, range: CellRange) -> CommitOutcome {
        self.apply_range(range, RangeOp::Background(NO_COLOR.to_string()))
    }

    fn apply_range(&mut self, range: CellRange, op: RangeOp) -> CommitOutcome {
        let committer = self.committer.clone();
        let outcome = committer.apply_range(&mut self.context(), range, &op);
        self.after_write(&outcome);
        outcome
    }

    fn after_write(&mut self, outcome: &CommitOutcome) {
        self.deps.rebuild(&self.store, &self.active.name);
        if outcome.reload {
            self.schedule_reload();
        }
        if outcome.failed > 0 {
            self.notices.push(format!(
                "{} cell(s) not saved; keeping local changes",
                outcome.failed
            ));
        }
    }

    fn schedule_reload(&mut self) {
        let due = Instant::now() + self.committer.settings().reload_delay();
        debug!(sheet_id = self.active.id, "reload scheduled");
        self.pending_reload = Some(PendingReload {
            sheet_id: self.active.id,
            due,
        });
    }

    /// Fetch the active sheet again so formula results catch up with
    /// literal edits. The reload belongs to the current history entry.
    pub fn reload_cells(&mut self) -> Result<()> {
        let cells = self.backend.list_cells(self.active.id)?;
        self.store.replace_all(cells);
        self.history.amend_current(self.store.snapshot());
        self.deps.rebuild(&self.store, &self.active.name);
        Ok(())
    }

    // History

    pub fn undo(&mut self) -> Result<()> {
        let target = self
            .history
            .undo()
            .cloned()
            .ok_or(GridshareError::NothingToUndo)?;
        self.replay(target);
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        let target = self
            .history
            .redo()
            .cloned()
            .ok_or(GridshareError::NothingToRedo)?;
        self.replay(target);
        Ok(())
    }

    fn undo_quietly(&mut self) -> Result<()> {
        match self.undo() {
            Err(GridshareError::NothingToUndo) => Ok(()),
            other => other,
        }
    }

    fn redo_quietly(&mut self) -> Result<()> {
        match self.redo() {
            Err(GridshareError::NothingToRedo) => Ok(()),
            other => other,
        }
    }

    /// Make the store, the server and the peers match `target`.
    fn replay(&mut self, target: SheetSnapshot) {
        let cleared = CellPatch {
            value: Some(String::new()),
            formula: Some(String::new()),
            style: Some(CellStyle::default()),
        };
        let mut writes: Vec<CellWrite> = self
            .store
            .refs()
            .into_iter()
            .filter(|at| !target.contains(at))
            .map(|at| CellWrite::new(at, cleared.clone()))
            .collect();
        writes.extend(
            target
                .cells()
                .map(|cell| CellWrite::new(cell.cell_ref(), CellPatch::restate(cell))),
        );

        self.store.restore(&target);

        for write in &writes {
            let cell = self.store.cell_or_empty(write.cell_ref());
            self.channel.send(&ClientMessage::CellUpdate(CellUpdateOut::from_cell(
                self.active.id,
                &cell,
            )));
        }

        match self.backend.batch_update(self.active.id, &writes) {
            Ok(stored) => {
                for cell in stored {
                    self.store.apply_remote(cell);
                }
                self.history.amend_current(self.store.snapshot());
            }
            Err(err) => {
                warn!(sheet_id = self.active.id, error = %err, "failed to persist history replay");
                self.notices
                    .push(format!("Undo/redo not saved: {err}; keeping local changes"));
            }
        }

        self.deps.rebuild(&self.store, &self.active.name);
        if writes
            .iter()
            .any(|w| self.committer.wants_reload(&self.deps, &w.cell_ref()))
        {
            self.schedule_reload();
        }
    }

    // Live channel

    /// Feed a transport event; cell updates from peers land in the store.
    pub fn handle_transport(&mut self, event: TransportEvent, now: Instant) -> Option<ChannelEvent> {
        let event = self.channel.handle_transport(event, now)?;
        if let ChannelEvent::CellUpdate(update) = &event {
            self.apply_remote(update);
        }
        Some(event)
    }

    fn apply_remote(&mut self, update: &RemoteCellUpdate) {
        let at = update.cell_ref();
        if !at.in_bounds() {
            return;
        }
        let mut cell = self.store.cell_or_empty(at);
        if let Some(value) = &update.value {
            cell.value = value.clone();
        }
        if let Some(formula) = &update.formula {
            cell.formula = formula.clone();
        }
        if let Some(style) = &update.style {
            cell.style = style.clone();
        }
        cell.version = update.version;
        let literal = !cell.is_formula();

        if !self.store.apply_remote(cell) {
            debug!(cell = %at, version = update.version, "stale remote update dropped");
            return;
        }
        self.deps.rebuild(&self.store, &self.active.name);
        if literal && self.committer.wants_reload(&self.deps, &at) {
            self.schedule_reload();
        }
    }

    /// Retry the live channel now, resetting its attempt counter.
    pub fn reconnect(&mut self) {
        self.channel.reconnect();
    }

    /// Run due work: channel reconnects and the debounced reload.
    pub fn tick(&mut self, now: Instant) {
        self.channel.tick(now);

        let Some(pending) = self.pending_reload else {
            return;
        };
        if pending.due > now {
            return;
        }
        self.pending_reload = None;
        if pending.sheet_id != self.active.id {
            return;
        }
        if let Err(err) = self.reload_cells() {
            warn!(sheet_id = pending.sheet_id, error = %err, "reload failed");
        }
    }

    /// Time until the next scheduled work, for event loop timeouts.
    pub fn next_deadline(&self, now: Instant) -> Option<Duration> {
        [self.reload_due(), self.channel.retry_at()]
            .into_iter()
            .flatten()
            .min()
            .map(|due| due.saturating_duration_since(now))
    }

    // Sheets

    /// Show another sheet. History starts over; an open edit survives so
    /// the user can pick references on the new sheet.
    pub fn switch_sheet(&mut self, sheet_id: SheetId) -> Result<()> {
        let sheet = self
            .sheets
            .iter()
            .find(|s| s.id == sheet_id)
            .cloned()
            .ok_or_else(|| GridshareError::NotFound(format!("sheet {sheet_id}")))?;
        let cells = self.backend.list_cells(sheet.id)?;

        self.store.replace_all(cells);
        self.history.start(self.store.snapshot());
        self.deps.rebuild(&self.store, &sheet.name);
        self.pending_reload = None;
        self.selection.set_active_sheet(sheet.clone());
        self.channel.set_active_sheet(sheet.id);
        info!(sheet_id = sheet.id, name = %sheet.name, "switched sheet");
        self.active = sheet;
        Ok(())
    }

    /// Resolve a sheet by name (case-insensitive) or id.
    pub fn find_sheet(&self, wanted: &str) -> Option<&Sheet> {
        find_sheet(&self.sheets, wanted)
    }

    fn next_sheet_name(&self) -> String {
        let mut n = self.sheets.len() + 1;
        loop {
            let name = format!("Sheet{n}");
            if !self.sheets.iter().any(|s| s.name.eq_ignore_ascii_case(&name)) {
                return name;
            }
            n += 1;
        }
    }

    /// Add `Sheet{n+1}` and show it.
    pub fn add_sheet(&mut self) -> Result<Sheet> {
        let name = self.next_sheet_name();
        let sheet = self.backend.add_sheet(self.spreadsheet.id, &name)?;
        self.sheets.push(sheet.clone());
        self.sheets.sort_by_key(|s| (s.order, s.id));
        self.switch_sheet(sheet.id)?;
        Ok(sheet)
    }

    pub fn rename_sheet(&mut self, sheet_id: SheetId, name: &str) -> Result<()> {
        let name = require_text(name, "Sheet name")?;
        let renamed = self.backend.rename_sheet(sheet_id, &name)?;
        if let Some(slot) = self.sheets.iter_mut().find(|s| s.id == sheet_id) {
            *slot = renamed.clone();
        }
        self.selection.sheet_renamed(&renamed);
        if self.active.id == sheet_id {
            self.active = renamed;
            self.deps.rebuild(&self.store, &self.active.name);
        }
        Ok(())
    }

    /// Delete a sheet. Showing it moves the view to the first remaining
    /// sheet; deleting the only sheet leaves a fresh `Sheet1`.
    pub fn delete_sheet(&mut self, sheet_id: SheetId) -> Result<()> {
        if !self.sheets.iter().any(|s| s.id == sheet_id) {
            return Err(GridshareError::NotFound(format!("sheet {sheet_id}")));
        }
        self.backend.delete_sheet(sheet_id)?;
        self.sheets.retain(|s| s.id != sheet_id);

        if self
            .selection
            .editing()
            .is_some_and(|e| e.origin.id == sheet_id)
        {
            self.selection.cancel_edit();
        }
        if self.sheets.is_empty() {
            let fresh = self.backend.add_sheet(self.spreadsheet.id, "Sheet1")?;
            self.sheets.push(fresh);
        }
        if self.active.id == sheet_id {
            let first = self.sheets[0].id;
            self.switch_sheet(first)?;
        }
        Ok(())
    }

    // Spreadsheet

    pub fn rename_spreadsheet(&mut self, name: &str) -> Result<()> {
        let name = require_text(name, "Spreadsheet name")?;
        let renamed = self.backend.rename_spreadsheet(self.spreadsheet.id, &name)?;
        self.spreadsheet.name = renamed.name;
        Ok(())
    }

    pub fn share(&mut self, username: &str) -> Result<()> {
        let username = require_text(username, "Username")?;
        self.backend.share(self.spreadsheet.id, &username)?;
        if !self.spreadsheet.shared_with_usernames.contains(&username) {
            self.spreadsheet.shared_with_usernames.push(username);
        }
        Ok(())
    }

    pub fn unshare(&mut self, username: &str) -> Result<()> {
        let username = require_text(username, "Username")?;
        self.backend.unshare(self.spreadsheet.id, &username)?;
        self.spreadsheet
            .shared_with_usernames
            .retain(|u| *u != username);
        Ok(())
    }

    pub fn shared_users(&self) -> Result<Vec<User>> {
        self.backend.shared_users(self.spreadsheet.id)
    }

    /// Leave the live room. Pending reloads are dropped.
    pub fn close(&mut self) {
        self.channel.close();
        self.pending_reload = None;
        self.deps.clear();
    }
}

fn find_sheet<'a>(sheets: &'a [Sheet], wanted: &str) -> Option<&'a Sheet> {
    let wanted = wanted.trim();
    sheets
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(wanted))
        .or_else(|| {
            let id: SheetId = wanted.parse().ok()?;
            sheets.iter().find(|s| s.id == id)
        })
}
