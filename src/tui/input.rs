use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
    MouseEventKind,
};
use ratatui::prelude::*;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use gridshare_core::document::Direction;
use gridshare_core::{Key, TransportEvent};

use super::app::{App, Mode};
use super::ui;

/// Longest wait for terminal input before draining the socket again.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Map a terminal key press to an editing key.
pub(crate) fn translate(key: KeyEvent) -> Option<Key> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);
    match key.code {
        KeyCode::Char('Z') if ctrl => Some(Key::Redo),
        KeyCode::Char('z') if ctrl && shift => Some(Key::Redo),
        KeyCode::Char('z') if ctrl => Some(Key::Undo),
        KeyCode::Char('y') if ctrl => Some(Key::Redo),
        KeyCode::Char(c) if !ctrl && !alt => Some(Key::Char(c)),
        KeyCode::Enter => Some(Key::Enter),
        KeyCode::Tab => Some(Key::Tab),
        KeyCode::Esc => Some(Key::Escape),
        KeyCode::Backspace => Some(Key::Backspace),
        KeyCode::Delete => Some(Key::Delete),
        KeyCode::Up => Some(Key::Arrow(Direction::Up)),
        KeyCode::Down => Some(Key::Arrow(Direction::Down)),
        KeyCode::Left => Some(Key::Arrow(Direction::Left)),
        KeyCode::Right => Some(Key::Arrow(Direction::Right)),
        _ => None,
    }
}

fn handle_command_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_command(),
        KeyCode::Enter => app.execute_command(),
        KeyCode::Backspace => {
            if app.command_buffer.pop().is_none() {
                app.cancel_command();
            }
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.command_buffer.push(c);
        }
        _ => {}
    }
}

pub(crate) fn handle_key_event(app: &mut App, key: KeyEvent) {
    if app.mode == Mode::Command {
        handle_command_key(app, key);
        return;
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let editing = app.session.selection().is_editing();
    match key.code {
        KeyCode::Char('c') if ctrl => app.should_quit = true,
        KeyCode::Char(':') if !editing => app.start_command(),
        KeyCode::F(2) => {
            if app.session.selection().editing_source() == gridshare_core::EditingSource::FormulaBar
            {
                app.session.focus_grid();
            } else {
                let result = app.session.focus_formula_bar();
                app.report(result);
            }
        }
        KeyCode::PageDown if ctrl => app.cycle_sheet(1),
        KeyCode::PageUp if ctrl => app.cycle_sheet(-1),
        KeyCode::PageDown => app.scroll_rows(app.visible_rows as isize),
        KeyCode::PageUp => app.scroll_rows(-(app.visible_rows as isize)),
        _ => {
            if let Some(key) = translate(key) {
                let surface = app.surface();
                let result = app.session.key(surface, key);
                app.report(result);
                app.update_viewport();
            }
        }
    }
}

pub(crate) fn handle_mouse_event(app: &mut App, terminal_area: Rect, mouse: MouseEvent) {
    if app.mode != Mode::Normal {
        return;
    }
    let [_formula, tabs_area, grid_area, _presence, _status] = ui::split_main_chunks(terminal_area);
    let shift = mouse.modifiers.contains(KeyModifiers::SHIFT);

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if mouse.row == tabs_area.y {
                if let Some(sheet_id) = ui::tab_at(app, tabs_area, mouse.column) {
                    app.switch_sheet(sheet_id);
                }
                return;
            }
            if let Some(cell) = ui::grid_cell_at(app, grid_area, mouse.column, mouse.row) {
                app.click_cell(cell, shift, Instant::now());
            }
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            if let Some(cell) = ui::grid_cell_at(app, grid_area, mouse.column, mouse.row) {
                app.drag_to(cell);
            }
        }
        MouseEventKind::Up(MouseButton::Left) => app.release(),
        MouseEventKind::ScrollDown => app.scroll_rows(3),
        MouseEventKind::ScrollUp => app.scroll_rows(-3),
        _ => {}
    }
}

pub fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    live: &Receiver<TransportEvent>,
) -> std::io::Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        let now = Instant::now();
        let timeout = app
            .session
            .next_deadline(now)
            .map_or(IDLE_POLL, |due| due.min(IDLE_POLL));

        if event::poll(timeout)? {
            match event::read()? {
                // Only process key press events (Windows reports Press + Release)
                Event::Key(key) if key.kind == KeyEventKind::Press => handle_key_event(app, key),
                Event::Mouse(mouse) => {
                    let size = terminal.size()?;
                    handle_mouse_event(app, Rect::new(0, 0, size.width, size.height), mouse);
                }
                _ => {}
            }
        }

        while let Ok(event) = live.try_recv() {
            app.handle_transport(event);
        }
        app.tick(Instant::now());

        if app.should_quit {
            app.session.close();
            return Ok(());
        }
    }
}
