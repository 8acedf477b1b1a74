//! gridshare-core - UI-agnostic collaborative editing core.
//!
//! The core is synchronous and free of I/O policy: persistence goes through
//! the [`Backend`] trait and the live channel through the
//! [`sync::Transport`] trait, so the same [`Session`] drives the terminal
//! client, the offline mode and the tests.

pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod session;
pub mod sync;

pub use backend::{Backend, CellWrite, HttpBackend, MemoryBackend};
pub use config::{Config, EditSettings, HistorySettings, ReloadPolicy, SyncSettings};
pub use document::{
    CellStore, DependencyIndex, EditCommitter, EditSurface, EditingSource, FormulaTemplate,
    HistoryManager, Key, SelectionAction, SelectionController, SheetSnapshot,
};
pub use error::{GridshareError, Result};
pub use session::{OpenOptions, Session};
pub use sync::{ChannelEvent, ChannelState, EventKind, SyncChannel, Transport, TransportEvent};

pub use gridshare_model::model::{Cell, CellRange, CellRef};
