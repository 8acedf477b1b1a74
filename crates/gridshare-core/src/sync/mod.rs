//! Real-time channel.
//!
//! - [`Transport`] - the socket, provided by the host application
//! - [`SyncChannel`] - connection state, reconnect backoff, echo filtering
//! - [`EventBus`] - typed subscriptions, called synchronously in
//!   registration order
//! - [`Presence`] - who is in the room and where their cursors are; lives
//!   only while the channel is open

mod channel;
mod events;
mod presence;
mod transport;

pub use channel::{ChannelState, SyncChannel, endpoint};
pub use events::{ChannelEvent, EventBus, EventKind, SubscriptionId};
pub use presence::{Presence, RemoteCursor};
pub use transport::{LocalTransport, SharedLog, Transport, TransportEvent, TransportLog};
