//! Editing state for the active sheet (UI-agnostic).
//!
//! - [`CellStore`] - optimistic cell cache with write tickets
//! - [`SelectionController`] - selection, range drag and edit ownership
//! - [`composer`] - formula references from clicks, formula templates
//! - [`EditCommitter`] - commit normalization, persistence, broadcast
//! - [`HistoryManager`] - bounded snapshot undo/redo
//! - [`DependencyIndex`] - which cells formulas read

pub mod composer;

mod commit;
mod dependents;
mod history;
mod selection;
mod store;

pub use commit::{CommitContext, CommitOutcome, EditCommitter, NO_COLOR, RangeOp};
pub use composer::FormulaTemplate;
pub use dependents::DependencyIndex;
pub use history::{DEFAULT_CAPACITY, HistoryManager};
pub use selection::{
    Direction, EditState, EditSurface, EditingSource, Key, SelectionAction, SelectionController,
};
pub use store::{CellStore, SheetSnapshot, WriteTicket};
