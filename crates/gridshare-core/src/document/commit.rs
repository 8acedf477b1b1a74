//! Turning finished edits into local, persisted and broadcast state.
//!
//! Per cell, in order: apply optimistically, broadcast `cell_update`,
//! persist, then overwrite with the server's copy if no newer write to the
//! cell happened meanwhile. History gets a checkpoint before (when the head
//! is stale) and after, so one commit or one range operation is one undo
//! step.

use tracing::{debug, warn};

use super::dependents::DependencyIndex;
use super::history::HistoryManager;
use super::store::CellStore;
use crate::backend::Backend;
use crate::config::{EditSettings, ReloadPolicy};
use crate::sync::SyncChannel;
use gridshare_model::model::{Cell, CellContent, CellPatch, CellRange, CellRef, CellStyle, Sheet};
use gridshare_model::protocol::{CellUpdateOut, ClientMessage};

/// Plain white, what "remove color" paints.
pub const NO_COLOR: &str = "#FFFFFF";

/// Everything a commit touches, borrowed from the session.
pub struct CommitContext<'a> {
    pub sheet: &'a Sheet,
    pub store: &'a mut CellStore,
    pub history: &'a mut HistoryManager,
    pub deps: &'a DependencyIndex,
    pub backend: &'a dyn Backend,
    pub channel: &'a mut SyncChannel,
}

/// Operation applied to every cell of a selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RangeOp {
    Clear,
    Background(String),
    TextColor(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Cells written locally.
    pub written: usize,
    /// Cells the server rejected or never saw.
    pub failed: usize,
    /// A literal changed that formulas may read; reload computed values.
    pub reload: bool,
}

#[derive(Clone, Debug, Default)]
pub struct EditCommitter {
    settings: EditSettings,
}

impl EditCommitter {
    pub fn new(settings: EditSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EditSettings {
        &self.settings
    }

    /// Commit raw input typed into `at`.
    ///
    /// - Empty or a lone `=`: clear value and formula, keep style
    /// - Leading `=`: formula (value empty until the server computes it)
    /// - Anything else: literal value
    pub fn commit(&self, ctx: &mut CommitContext<'_>, at: CellRef, raw: &str) -> CommitOutcome {
        let content = CellContent::from_input(raw);
        let mut outcome = CommitOutcome::default();

        ctx.history.checkpoint(ctx.store.snapshot());
        self.write_content(ctx, at, &content, &mut outcome);
        ctx.history.checkpoint(ctx.store.snapshot());

        outcome
    }

    /// Apply `op` to every cell of `range`, as one undo step.
    pub fn apply_range(
        &self,
        ctx: &mut CommitContext<'_>,
        range: CellRange,
        op: &RangeOp,
    ) -> CommitOutcome {
        let mut outcome = CommitOutcome::default();
        ctx.history.checkpoint(ctx.store.snapshot());

        for at in range.cells() {
            match op {
                RangeOp::Clear => {
                    let has_content = ctx
                        .store
                        .get(&at)
                        .is_some_and(|c| !c.value.is_empty() || c.is_formula());
                    if has_content {
                        self.write_content(ctx, at, &CellContent::Clear, &mut outcome);
                    }
                }
                RangeOp::Background(color) => {
                    let style = ctx.store.cell_or_empty(at).style.with_background(color);
                    self.write_style(ctx, at, style, &mut outcome);
                }
                RangeOp::TextColor(color) => {
                    let style = ctx.store.cell_or_empty(at).style.with_text_color(color);
                    self.write_style(ctx, at, style, &mut outcome);
                }
            }
        }

        ctx.history.checkpoint(ctx.store.snapshot());
        outcome
    }

    fn write_content(
        &self,
        ctx: &mut CommitContext<'_>,
        at: CellRef,
        content: &CellContent,
        outcome: &mut CommitOutcome,
    ) {
        let mut cell = ctx.store.cell_or_empty(at);
        cell.apply_content(content);
        let patch = CellPatch::from_content(content, None);
        self.write(ctx, cell, &patch, outcome);

        if !matches!(content, CellContent::Formula(_)) && self.wants_reload(ctx.deps, &at) {
            outcome.reload = true;
        }
    }

    fn write_style(
        &self,
        ctx: &mut CommitContext<'_>,
        at: CellRef,
        style: CellStyle,
        outcome: &mut CommitOutcome,
    ) {
        let mut cell = ctx.store.cell_or_empty(at);
        cell.style = style.clone();
        let patch = CellPatch {
            style: Some(style),
            ..CellPatch::default()
        };
        self.write(ctx, cell, &patch, outcome);
    }

    fn write(
        &self,
        ctx: &mut CommitContext<'_>,
        cell: Cell,
        patch: &CellPatch,
        outcome: &mut CommitOutcome,
    ) {
        let at = cell.cell_ref();
        let message = ClientMessage::CellUpdate(CellUpdateOut::from_cell(ctx.sheet.id, &cell));
        let ticket = ctx.store.write_local(cell);
        outcome.written += 1;

        ctx.channel.send(&message);

        match ctx.backend.update_cell(ctx.sheet.id, at, patch) {
            Ok(stored) => {
                if !ctx.store.settle(ticket, stored) {
                    debug!(cell = %at, "server reply superseded by a newer write");
                }
            }
            Err(err) => {
                outcome.failed += 1;
                warn!(cell = %at, sheet_id = ctx.sheet.id, error = %err, "failed to persist cell");
            }
        }
    }

    pub(crate) fn wants_reload(&self, deps: &DependencyIndex, at: &CellRef) -> bool {
        match self.settings.reload_policy {
            ReloadPolicy::Always => true,
            ReloadPolicy::Dependents => deps.has_dependents(at),
        }
    }
}
