//! Typed publish/subscribe for channel events.

use gridshare_model::protocol::{CursorUpdate, RemoteCellUpdate, UserJoined, UserLeft};

#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Error(String),
    CellUpdate(RemoteCellUpdate),
    CursorUpdate(CursorUpdate),
    UserJoined(UserJoined),
    UserLeft(UserLeft),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Error,
    CellUpdate,
    CursorUpdate,
    UserJoined,
    UserLeft,
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::Connected => EventKind::Connected,
            ChannelEvent::Disconnected => EventKind::Disconnected,
            ChannelEvent::Error(_) => EventKind::Error,
            ChannelEvent::CellUpdate(_) => EventKind::CellUpdate,
            ChannelEvent::CursorUpdate(_) => EventKind::CursorUpdate,
            ChannelEvent::UserJoined(_) => EventKind::UserJoined,
            ChannelEvent::UserLeft(_) => EventKind::UserLeft,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&ChannelEvent)>;

#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, EventKind, Handler)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&ChannelEvent) + 'static,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push((id, kind, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Call every handler registered for the event's kind, oldest first.
    pub fn dispatch(&mut self, event: &ChannelEvent) {
        let kind = event.kind();
        for (_, _, handler) in self.subscribers.iter_mut().filter(|(_, k, _)| *k == kind) {
            handler(event);
        }
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
