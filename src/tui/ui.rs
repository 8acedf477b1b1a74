//! UI rendering

use super::app::{App, Mode};
use gridshare_core::{ChannelState, EditingSource};
use gridshare_model::model::{CellRef, MAX_COLS, MAX_ROWS, QualifiedRef, SheetId};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
};

pub(crate) const FORMULA_BAR_HEIGHT: u16 = 3;
pub(crate) const TABS_HEIGHT: u16 = 1;
pub(crate) const GRID_MIN_HEIGHT: u16 = 6;
pub(crate) const PRESENCE_HEIGHT: u16 = 1;
pub(crate) const STATUS_BAR_HEIGHT: u16 = 1;
pub(crate) const ROW_HEADER_WIDTH: u16 = 4;
pub(crate) const GRID_COLUMN_SPACING: u16 = 1;
const TAB_SEPARATOR: &str = "|";

/// Formula bar, sheet tabs, grid, presence line, status line.
pub(crate) fn split_main_chunks(area: Rect) -> [Rect; 5] {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(FORMULA_BAR_HEIGHT),
            Constraint::Length(TABS_HEIGHT),
            Constraint::Min(GRID_MIN_HEIGHT),
            Constraint::Length(PRESENCE_HEIGHT),
            Constraint::Length(STATUS_BAR_HEIGHT),
        ])
        .split(area);
    [chunks[0], chunks[1], chunks[2], chunks[3], chunks[4]]
}

/// Parse `#RRGGBB`.
pub(crate) fn parse_hex(color: &str) -> Option<Color> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let value = u32::from_str_radix(hex, 16).ok()?;
    Some(Color::Rgb(
        ((value >> 16) & 0xFF) as u8,
        ((value >> 8) & 0xFF) as u8,
        (value & 0xFF) as u8,
    ))
}

/// The sheet whose tab covers column `x` of the tab line.
pub(crate) fn tab_at(app: &App, tabs_area: Rect, x: u16) -> Option<SheetId> {
    let mut start = tabs_area.x;
    for sheet in app.session.sheets() {
        let width = tab_label(&sheet.name).chars().count() as u16;
        if x >= start && x < start.saturating_add(width) {
            return Some(sheet.id);
        }
        start = start
            .saturating_add(width)
            .saturating_add(TAB_SEPARATOR.len() as u16);
    }
    None
}

fn tab_label(name: &str) -> String {
    format!(" {name} ")
}

pub(crate) fn grid_cell_at(
    app: &App,
    grid_area: Rect,
    mouse_col: u16,
    mouse_row: u16,
) -> Option<CellRef> {
    if grid_area.width < 3 || grid_area.height < 4 {
        return None;
    }

    let inner_x = grid_area.x.saturating_add(1);
    let inner_y = grid_area.y.saturating_add(1);
    let inner_right = inner_x.saturating_add(grid_area.width.saturating_sub(2));
    let inner_bottom = inner_y.saturating_add(grid_area.height.saturating_sub(2));

    if mouse_col < inner_x
        || mouse_col >= inner_right
        || mouse_row < inner_y
        || mouse_row >= inner_bottom
    {
        return None;
    }

    // Header row contains column letters, not data cells.
    if mouse_row == inner_y {
        return None;
    }

    let rel_row = mouse_row.saturating_sub(inner_y.saturating_add(1)) as usize;
    if rel_row >= app.visible_rows {
        return None;
    }
    let row = app.viewport_row.saturating_add(rel_row);
    if row > MAX_ROWS {
        return None;
    }

    let mut x = inner_x.saturating_add(ROW_HEADER_WIDTH);
    if mouse_col < x.saturating_add(GRID_COLUMN_SPACING) {
        return None;
    }
    x = x.saturating_add(GRID_COLUMN_SPACING);

    let width = app.col_width as u16;
    for offset in 0..app.visible_cols {
        let column = app.viewport_col + offset;
        if column > MAX_COLS || x >= inner_right {
            break;
        }
        let cell_end = x.saturating_add(width);
        if mouse_col >= x && mouse_col < cell_end {
            return Some(CellRef::new(row, column));
        }
        x = cell_end;
        if mouse_col < x.saturating_add(GRID_COLUMN_SPACING) {
            return None;
        }
        x = x.saturating_add(GRID_COLUMN_SPACING);
    }

    None
}

/// Draw the application UI
pub fn draw(f: &mut Frame, app: &mut App) {
    let [formula_area, tabs_area, grid_area, presence_area, status_area] =
        split_main_chunks(f.area());

    // Update visible dimensions based on actual size
    let available_width = grid_area.width.saturating_sub(ROW_HEADER_WIDTH + 2) as usize;
    let available_height = grid_area.height.saturating_sub(3) as usize; // header + borders
    app.visible_cols = (available_width / (app.col_width + 1)).max(1);
    app.visible_rows = available_height.max(1);
    app.update_viewport();

    draw_formula_bar(f, app, formula_area);
    draw_tabs(f, app, tabs_area);
    draw_grid(f, app, grid_area);
    draw_presence(f, app, presence_area);
    draw_status_bar(f, app, status_area);
}

fn draw_formula_bar(f: &mut Frame, app: &App, area: Rect) {
    let selection = app.session.selection();
    let active = app.session.active_sheet();

    let content = match (app.mode, selection.editing()) {
        (Mode::Command, _) => format!(":{}│", app.command_buffer),
        (Mode::Normal, Some(edit)) => {
            let target = if edit.origin.id == active.id {
                QualifiedRef::bare(edit.cell)
            } else {
                QualifiedRef::on_sheet(&edit.origin.name, edit.cell)
            };
            format!("{}: {}│", target, edit.draft)
        }
        (Mode::Normal, None) => {
            let name = match selection.range() {
                Some(range) => range.to_string(),
                None => selection.selected().to_string(),
            };
            let input = app.session.store().input_text(&selection.selected());
            if input.is_empty() {
                format!("{name}: (empty)")
            } else {
                format!("{name}: {input}")
            }
        }
    };

    let (title, color) = match (app.mode, selection.editing_source()) {
        (Mode::Command, _) => (" Command ", Color::Cyan),
        (Mode::Normal, EditingSource::Grid) => (" Edit ", Color::Yellow),
        (Mode::Normal, EditingSource::FormulaBar) => (" Formula bar ", Color::Green),
        (Mode::Normal, EditingSource::None) => (" Cell ", Color::White),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(color));
    f.render_widget(Paragraph::new(content).block(block), area);
}

fn draw_tabs(f: &mut Frame, app: &App, area: Rect) {
    let active = app.session.active_sheet().id;
    let mut spans = Vec::new();
    for sheet in app.session.sheets() {
        let style = if sheet.id == active {
            Style::default()
                .fg(Color::Black)
                .bg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(tab_label(&sheet.name), style));
        spans.push(Span::styled(TAB_SEPARATOR, Style::default().fg(Color::DarkGray)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn cell_style(app: &App, at: CellRef) -> Style {
    let selection = app.session.selection();
    if at == selection.selected() {
        return Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
    }
    if selection.range().is_some_and(|r| r.contains(&at)) {
        return Style::default().fg(Color::White).bg(Color::Blue);
    }

    let mut style = Style::default();
    if let Some(cell) = app.session.store().get(&at) {
        if let Some(bg) = cell.style.background_color.as_deref().and_then(parse_hex) {
            style = style.bg(bg);
        }
        if let Some(fg) = cell.style.color.as_deref().and_then(parse_hex) {
            style = style.fg(fg);
        }
        if cell.is_error() {
            style = style.fg(Color::Red);
        }
    }
    let remote = app
        .session
        .presence()
        .and_then(|p| p.cursor_at(&at))
        .is_some();
    if remote {
        style = style
            .fg(Color::Magenta)
            .add_modifier(Modifier::UNDERLINED | Modifier::BOLD);
    }
    style
}

fn draw_grid(f: &mut Frame, app: &App, area: Rect) {
    let selected = app.session.selection().selected();
    let last_col = (app.viewport_col + app.visible_cols - 1).min(MAX_COLS);
    let last_row = (app.viewport_row + app.visible_rows - 1).min(MAX_ROWS);

    let header_style = |active: bool| {
        if active {
            Style::default()
                .fg(Color::Black)
                .bg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        }
    };

    let mut header_cells = vec![Cell::from(" ")]; // Corner
    for column in app.viewport_col..=last_col {
        header_cells.push(
            Cell::from(CellRef::col_to_letters(column)).style(header_style(column == selected.column)),
        );
    }
    let header = Row::new(header_cells).height(1);

    let mut rows = Vec::new();
    for row in app.viewport_row..=last_row {
        let mut cells = vec![Cell::from(row.to_string()).style(header_style(row == selected.row))];
        for column in app.viewport_col..=last_col {
            let at = CellRef::new(row, column);
            let display = app.session.store().display_text(&at);
            cells.push(Cell::from(display).style(cell_style(app, at)));
        }
        rows.push(Row::new(cells));
    }

    let mut widths = vec![Constraint::Length(ROW_HEADER_WIDTH)];
    for _ in app.viewport_col..=last_col {
        widths.push(Constraint::Length(app.col_width as u16));
    }

    let title = format!(" {} ", app.session.spreadsheet().name);
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .column_spacing(GRID_COLUMN_SPACING);
    f.render_widget(table, area);
}

fn draw_presence(f: &mut Frame, app: &App, area: Rect) {
    let channel = app.session.channel();
    let mut spans = vec![match channel.state() {
        ChannelState::Open => Span::styled("● live ", Style::default().fg(Color::Green)),
        ChannelState::Connecting => Span::styled(
            format!("◌ connecting ({}/{}) ", channel.attempts(), channel.max_attempts()),
            Style::default().fg(Color::Yellow),
        ),
        ChannelState::Exhausted => {
            Span::styled("○ disconnected ", Style::default().fg(Color::Red))
        }
        ChannelState::Closed => Span::styled("○ offline ", Style::default().fg(Color::DarkGray)),
    }];

    if let Some(presence) = app.session.presence() {
        for user in presence.users() {
            let at = presence
                .cursors()
                .find(|c| c.user_id == user.id)
                .map(|c| format!("@{}", c.cell))
                .unwrap_or_default();
            spans.push(Span::styled(
                format!(" {}{} ", user.username, at),
                Style::default().fg(Color::Magenta),
            ));
        }
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let history = format!(
        "{}{}",
        if app.session.can_undo() { "undo " } else { "" },
        if app.session.can_redo() { "redo" } else { "" }
    );
    let status = format!(
        " {} | {} | {}",
        app.session.active_sheet().name,
        history.trim(),
        app.status_message
    );
    let paragraph = Paragraph::new(status).style(Style::default().fg(Color::White).bg(Color::DarkGray));
    f.render_widget(paragraph, area);
}
