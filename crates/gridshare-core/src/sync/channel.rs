//! Connection state for one spreadsheet's live room.
//!
//! The channel is driven entirely from outside: the host feeds it transport
//! events and calls [`SyncChannel::tick`] with the current time, which is
//! when due reconnects happen. Backoff is linear (attempt × step) and gives
//! up after the configured number of attempts until [`SyncChannel::reconnect`]
//! is called.

use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use super::events::{ChannelEvent, EventBus, EventKind, SubscriptionId};
use super::presence::{Presence, RemoteCursor};
use super::transport::{Transport, TransportEvent};
use crate::config::SyncSettings;
use crate::error::Result;
use gridshare_model::model::{CellRef, SheetId, SpreadsheetId, UserId};
use gridshare_model::protocol::{ClientMessage, ServerMessage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Never opened, or closed on purpose.
    Closed,
    /// Waiting for the transport to open, or for a scheduled retry.
    Connecting,
    Open,
    /// Gave up after the last reconnect attempt.
    Exhausted,
}

pub struct SyncChannel {
    transport: Box<dyn Transport>,
    settings: SyncSettings,
    local_user: UserId,
    url: Option<Url>,
    state: ChannelState,
    attempts: u32,
    retry_at: Option<Instant>,
    active_sheet: Option<SheetId>,
    bus: EventBus,
    presence: Option<Presence>,
}

/// `{ws_base}/ws/spreadsheet/{id}/?token=...`
pub fn endpoint(ws_base: &str, spreadsheet_id: SpreadsheetId, token: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(&format!(
        "{}/ws/spreadsheet/{}/",
        ws_base.trim_end_matches('/'),
        spreadsheet_id
    ))?;
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

impl SyncChannel {
    pub fn new(transport: Box<dyn Transport>, settings: SyncSettings, local_user: UserId) -> Self {
        Self {
            transport,
            settings,
            local_user,
            url: None,
            state: ChannelState::Closed,
            attempts: 0,
            retry_at: None,
            active_sheet: None,
            bus: EventBus::new(),
            presence: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// Reconnect attempts made since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.settings.max_reconnect_attempts
    }

    /// When the next reconnect attempt is due, if one is scheduled.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Present only between [`connect`](Self::connect) and [`close`](Self::close).
    pub fn presence(&self) -> Option<&Presence> {
        self.presence.as_ref()
    }

    /// Cell updates for other sheets are dropped.
    pub fn set_active_sheet(&mut self, sheet_id: SheetId) {
        self.active_sheet = Some(sheet_id);
    }

    pub fn subscribe(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&ChannelEvent) + 'static,
    ) -> SubscriptionId {
        self.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Join the room at `url`.
    pub fn connect(&mut self, url: Url) {
        info!(%url, "connecting live channel");
        self.url = Some(url);
        self.attempts = 0;
        self.retry_at = None;
        self.presence = Some(Presence::new());
        self.open_transport(Instant::now());
    }

    /// Start over after the channel gave up (or at any time).
    pub fn reconnect(&mut self) {
        if self.url.is_none() {
            return;
        }
        self.transport.close();
        self.attempts = 0;
        self.retry_at = None;
        if self.presence.is_none() {
            self.presence = Some(Presence::new());
        }
        self.open_transport(Instant::now());
    }

    fn open_transport(&mut self, now: Instant) {
        let Some(url) = self.url.clone() else {
            return;
        };
        self.state = ChannelState::Connecting;
        if let Err(err) = self.transport.open(&url) {
            warn!(error = %err, "live channel failed to open");
            self.handle_closed(now);
        }
    }

    /// Leave the room: no reconnects, no subscribers, no presence.
    pub fn close(&mut self) {
        if self.state != ChannelState::Closed {
            info!("closing live channel");
        }
        self.state = ChannelState::Closed;
        self.retry_at = None;
        self.transport.close();
        self.bus.clear();
        self.presence = None;
    }

    /// Fire a due reconnect.
    pub fn tick(&mut self, now: Instant) {
        match self.retry_at {
            Some(due) if due <= now => {
                self.retry_at = None;
                debug!(attempt = self.attempts, "reconnecting live channel");
                self.open_transport(now);
            }
            _ => {}
        }
    }

    /// Serialize and send. Dropped silently unless the channel is open.
    pub fn send(&mut self, message: &ClientMessage) -> bool {
        if self.state != ChannelState::Open {
            debug!(state = ?self.state, "dropping outgoing message");
            return false;
        }
        let text = match message.to_json() {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "failed to encode outgoing message");
                return false;
            }
        };
        if let Err(err) = self.transport.send(&text) {
            warn!(error = %err, "failed to send on live channel");
            return false;
        }
        true
    }

    /// Feed one transport event. Returns the channel event it produced, after
    /// subscribers have seen it.
    pub fn handle_transport(&mut self, event: TransportEvent, now: Instant) -> Option<ChannelEvent> {
        let produced = match event {
            TransportEvent::Opened => {
                if self.state == ChannelState::Closed {
                    return None;
                }
                info!("live channel open");
                self.state = ChannelState::Open;
                self.attempts = 0;
                self.retry_at = None;
                Some(ChannelEvent::Connected)
            }
            TransportEvent::Closed => {
                if self.state == ChannelState::Closed {
                    return None;
                }
                self.handle_closed(now);
                Some(ChannelEvent::Disconnected)
            }
            TransportEvent::Error(message) => {
                warn!(%message, "live channel error");
                Some(ChannelEvent::Error(message))
            }
            TransportEvent::Frame(text) => self.handle_frame(&text),
        }?;
        self.bus.dispatch(&produced);
        Some(produced)
    }

    fn handle_closed(&mut self, now: Instant) {
        if self.attempts >= self.settings.max_reconnect_attempts {
            warn!(attempts = self.attempts, "live channel gave up reconnecting");
            self.state = ChannelState::Exhausted;
            self.retry_at = None;
            return;
        }
        self.attempts += 1;
        let delay = self.settings.backoff_step() * self.attempts;
        info!(attempt = self.attempts, delay_ms = delay.as_millis() as u64, "live channel closed, retrying");
        self.state = ChannelState::Connecting;
        self.retry_at = Some(now + delay);
    }

    fn handle_frame(&mut self, text: &str) -> Option<ChannelEvent> {
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "ignoring malformed frame");
                return None;
            }
        };

        match message {
            ServerMessage::CellUpdate(update) => {
                if update.user_id == Some(self.local_user) {
                    return None;
                }
                if self.active_sheet.is_some_and(|s| s != update.sheet_id) {
                    debug!(sheet_id = update.sheet_id, "cell update for inactive sheet");
                    return None;
                }
                Some(ChannelEvent::CellUpdate(update))
            }
            ServerMessage::CursorUpdate(cursor) => {
                if cursor.user_id == self.local_user {
                    return None;
                }
                let presence = self.presence.as_mut()?;
                presence.upsert_cursor(RemoteCursor {
                    user_id: cursor.user_id,
                    username: cursor.username.clone(),
                    cell: CellRef::new(cursor.row, cursor.column),
                });
                Some(ChannelEvent::CursorUpdate(cursor))
            }
            ServerMessage::UserJoined(joined) => {
                if joined.user_id == self.local_user {
                    return None;
                }
                let presence = self.presence.as_mut()?;
                presence
                    .join(joined.user())
                    .then_some(ChannelEvent::UserJoined(joined))
            }
            ServerMessage::UserLeft(left) => {
                let presence = self.presence.as_mut()?;
                presence.leave(left.user_id);
                Some(ChannelEvent::UserLeft(left))
            }
            ServerMessage::Unknown => {
                warn!("ignoring frame of unknown type");
                None
            }
        }
    }
}
