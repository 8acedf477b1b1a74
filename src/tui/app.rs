//! Application state and logic.
//!
//! [`App`] wraps the open [`Session`] with everything that only matters to
//! the terminal: the viewport, the `:` command line and the status message.
//! Editing itself (selection, drafts, commits, history) lives in the session.

use std::time::{Duration, Instant};

use gridshare_core::{EditSurface, EditingSource, GridshareError, Result, Session, TransportEvent};
use gridshare_core::sync::ChannelEvent;
use gridshare_model::model::{CellRange, CellRef, MAX_COLS, MAX_ROWS};
use tracing::info;

use super::commands::{Command, parse_command};

/// Two clicks on the same cell within this window are a double click.
pub const DOUBLE_CLICK: Duration = Duration::from_millis(400);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Grid, formula bar and pointer input go to the session.
    Normal,
    /// Typing an ex-style command after `:`.
    Command,
}

pub struct App {
    pub session: Session,
    pub mode: Mode,
    pub command_buffer: String,
    pub status_message: String,
    /// First visible row (1-based)
    pub viewport_row: usize,
    /// First visible column (1-based)
    pub viewport_col: usize,
    pub visible_rows: usize,
    pub visible_cols: usize,
    pub col_width: usize,
    pub should_quit: bool,
    last_click: Option<(CellRef, Instant)>,
}

impl App {
    pub fn new(session: Session) -> Self {
        let status_message = format!(
            "{} | {} | :q to quit",
            session.spreadsheet().name,
            session.user().username
        );
        App {
            session,
            mode: Mode::Normal,
            command_buffer: String::new(),
            status_message,
            viewport_row: 1,
            viewport_col: 1,
            visible_rows: 20,
            visible_cols: 8,
            col_width: 12,
            should_quit: false,
            last_click: None,
        }
    }

    /// The surface that owns the live edit, or the grid when idle.
    pub fn surface(&self) -> EditSurface {
        match self.session.selection().editing_source() {
            EditingSource::FormulaBar => EditSurface::FormulaBar,
            EditingSource::Grid | EditingSource::None => EditSurface::Grid,
        }
    }

    /// Show the outcome of a session call on the status line.
    pub fn report(&mut self, result: Result<()>) {
        if let Err(err) = result {
            self.status_message = format!("Error: {err}");
        }
        self.collect_notices();
    }

    fn collect_notices(&mut self) {
        if let Some(last) = self.session.take_notices().pop() {
            self.status_message = last;
        }
    }

    /// Keep the selected cell inside the viewport.
    pub fn update_viewport(&mut self) {
        let selected = self.session.selection().selected();
        let rows = self.visible_rows.max(1);
        let cols = self.visible_cols.max(1);

        if selected.row < self.viewport_row {
            self.viewport_row = selected.row;
        } else if selected.row >= self.viewport_row + rows {
            self.viewport_row = selected.row + 1 - rows;
        }
        if selected.column < self.viewport_col {
            self.viewport_col = selected.column;
        } else if selected.column >= self.viewport_col + cols {
            self.viewport_col = selected.column + 1 - cols;
        }
        self.viewport_row = self.viewport_row.clamp(1, MAX_ROWS);
        self.viewport_col = self.viewport_col.clamp(1, MAX_COLS);
    }

    pub fn scroll_rows(&mut self, delta: isize) {
        let last_top = MAX_ROWS.saturating_sub(self.visible_rows.saturating_sub(1)).max(1);
        self.viewport_row = self
            .viewport_row
            .saturating_add_signed(delta)
            .clamp(1, last_top);
    }

    // Pointer

    pub fn click_cell(&mut self, cell: CellRef, shift: bool, now: Instant) {
        let double = self
            .last_click
            .is_some_and(|(last, at)| last == cell && now.duration_since(at) <= DOUBLE_CLICK);
        let result = if double && !shift {
            self.last_click = None;
            self.session.double_click(cell)
        } else {
            self.last_click = Some((cell, now));
            self.session.pointer_down(cell, shift)
        };
        self.report(result);
    }

    pub fn drag_to(&mut self, cell: CellRef) {
        let result = self.session.pointer_enter(cell);
        self.report(result);
        self.update_viewport();
    }

    pub fn release(&mut self) {
        self.session.pointer_up();
    }

    // Sheets

    pub fn switch_sheet(&mut self, sheet_id: i64) {
        if sheet_id == self.session.active_sheet().id {
            return;
        }
        let result = self.session.switch_sheet(sheet_id);
        self.report(result);
        self.update_viewport();
    }

    /// Move to the next (`1`) or previous (`-1`) sheet tab, wrapping.
    pub fn cycle_sheet(&mut self, step: isize) {
        let sheets = self.session.sheets();
        let Some(pos) = sheets
            .iter()
            .position(|s| s.id == self.session.active_sheet().id)
        else {
            return;
        };
        let len = sheets.len() as isize;
        let next = (pos as isize + step).rem_euclid(len) as usize;
        let id = sheets[next].id;
        self.switch_sheet(id);
    }

    // Live channel

    pub fn handle_transport(&mut self, event: TransportEvent) {
        let Some(event) = self.session.handle_transport(event, Instant::now()) else {
            return;
        };
        match event {
            ChannelEvent::Connected => self.status_message = "Live: connected".to_string(),
            ChannelEvent::Disconnected => {
                self.status_message = match self.session.channel().retry_at() {
                    Some(_) => format!(
                        "Live: disconnected, retry {} of {}",
                        self.session.channel().attempts(),
                        self.session.channel().max_attempts()
                    ),
                    None => "Live: offline (:reconnect to retry)".to_string(),
                };
            }
            ChannelEvent::Error(message) => self.status_message = format!("Live: {message}"),
            ChannelEvent::UserJoined(joined) => {
                self.status_message = format!("{} joined", joined.username);
            }
            ChannelEvent::UserLeft(left) => {
                if let Some(name) = left.username {
                    self.status_message = format!("{name} left");
                }
            }
            ChannelEvent::CellUpdate(_) | ChannelEvent::CursorUpdate(_) => {}
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.session.tick(now);
        self.collect_notices();
    }

    // Commands

    pub fn start_command(&mut self) {
        self.mode = Mode::Command;
        self.command_buffer.clear();
    }

    pub fn cancel_command(&mut self) {
        self.mode = Mode::Normal;
        self.command_buffer.clear();
    }

    /// Parse and run the command line.
    pub fn execute_command(&mut self) {
        let text = std::mem::take(&mut self.command_buffer);
        self.mode = Mode::Normal;
        match parse_command(&text) {
            Ok(command) => self.execute(command),
            Err(usage) if usage.is_empty() => {}
            Err(usage) => self.status_message = usage,
        }
    }

    pub fn execute(&mut self, command: Command) {
        info!(?command, "command");
        let selection = self.session.selection().selection_range();
        match command {
            Command::Quit => self.should_quit = true,
            Command::Sheet(name) => match self.session.find_sheet(&name) {
                Some(sheet) => {
                    let id = sheet.id;
                    self.switch_sheet(id);
                }
                None => self.status_message = format!("No sheet named '{name}'"),
            },
            Command::AddSheet => match self.session.add_sheet() {
                Ok(sheet) => self.status_message = format!("Added {}", sheet.name),
                Err(err) => self.report(Err(err)),
            },
            Command::DeleteSheet(name) => {
                let target = match name {
                    Some(name) => self.session.find_sheet(&name).map(|s| (s.id, s.name.clone())),
                    None => {
                        let active = self.session.active_sheet();
                        Some((active.id, active.name.clone()))
                    }
                };
                match target {
                    Some((id, name)) => match self.session.delete_sheet(id) {
                        Ok(()) => self.status_message = format!("Deleted {name}"),
                        Err(err) => self.report(Err(err)),
                    },
                    None => self.status_message = "No such sheet".to_string(),
                }
            }
            Command::RenameSheet(name) => {
                let id = self.session.active_sheet().id;
                let result = self.session.rename_sheet(id, &name);
                self.report(result);
            }
            Command::RenameSpreadsheet(name) => {
                let result = self.session.rename_spreadsheet(&name);
                self.report(result);
            }
            Command::Share(username) => match self.session.share(&username) {
                Ok(()) => self.status_message = format!("Shared with {}", username.trim()),
                Err(err) => self.report(Err(err)),
            },
            Command::Unshare(username) => match self.session.unshare(&username) {
                Ok(()) => self.status_message = format!("Stopped sharing with {}", username.trim()),
                Err(err) => self.report(Err(err)),
            },
            Command::Users => match self.session.shared_users() {
                Ok(users) if users.is_empty() => self.status_message = "Not shared".to_string(),
                Ok(users) => {
                    let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
                    self.status_message = format!("Shared with: {}", names.join(", "));
                }
                Err(err) => self.report(Err(err)),
            },
            Command::Color { color, range } => {
                self.session.fill_background(range.unwrap_or(selection), &color);
                self.collect_notices();
            }
            Command::TextColor { color, range } => {
                self.session.fill_text_color(range.unwrap_or(selection), &color);
                self.collect_notices();
            }
            Command::NoColor(range) => {
                self.session.remove_color(range.unwrap_or(selection));
                self.collect_notices();
            }
            Command::Formula(template) => {
                let result = self.session.apply_template(template);
                self.report(result);
            }
            Command::Reconnect => {
                self.session.reconnect();
                self.status_message = "Live: reconnecting".to_string();
            }
            Command::Goto(range) => self.goto(range),
            Command::Undo => self.undo(),
            Command::Redo => self.redo(),
        }
        self.update_viewport();
    }

    fn goto(&mut self, range: CellRange) {
        let mut result = self.session.pointer_down(range.start, false);
        self.session.pointer_up();
        if result.is_ok() && !range.is_single() {
            result = self.session.pointer_down(range.end, true);
        }
        self.report(result);
    }

    pub fn undo(&mut self) {
        match self.session.undo() {
            Err(GridshareError::NothingToUndo) => {
                self.status_message = "Nothing to undo".to_string();
            }
            other => self.report(other),
        }
    }

    pub fn redo(&mut self) {
        match self.session.redo() {
            Err(GridshareError::NothingToRedo) => {
                self.status_message = "Nothing to redo".to_string();
            }
            other => self.report(other),
        }
    }
}
