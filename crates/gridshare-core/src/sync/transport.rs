//! Socket abstraction.
//!
//! The channel only asks a transport to open, send and close. Whatever the
//! socket does afterwards comes back through [`TransportEvent`]s that the
//! host feeds into [`super::SyncChannel::handle_transport`] from its event
//! loop.

use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Closed,
    Error(String),
}

pub trait Transport {
    /// Start connecting. Completion is reported with [`TransportEvent::Opened`].
    fn open(&mut self, url: &Url) -> Result<()>;
    fn send(&mut self, text: &str) -> Result<()>;
    fn close(&mut self);
}

/// What a [`LocalTransport`] was asked to do.
#[derive(Debug, Default)]
pub struct TransportLog {
    pub opened: Vec<Url>,
    pub sent: Vec<String>,
    pub closed: usize,
}

pub type SharedLog = Arc<Mutex<TransportLog>>;

/// In-process transport that records every call and never talks to a
/// network. Used offline, and by tests that play the server's part.
#[derive(Default)]
pub struct LocalTransport {
    log: SharedLog,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle on the log, usable after the transport is boxed away.
    pub fn log(&self) -> SharedLog {
        Arc::clone(&self.log)
    }

    fn record(&self, f: impl FnOnce(&mut TransportLog)) {
        f(&mut self.log.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl Transport for LocalTransport {
    fn open(&mut self, url: &Url) -> Result<()> {
        self.record(|log| log.opened.push(url.clone()));
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<()> {
        self.record(|log| log.sent.push(text.to_string()));
        Ok(())
    }

    fn close(&mut self) {
        self.record(|log| log.closed += 1);
    }
}
