//! WebSocket transport for the live channel.
//!
//! The socket lives on a worker thread. Outbound frames reach it through a
//! command queue; everything it hears comes back as [`TransportEvent`]s on a
//! channel the event loop drains between frames. Every `open` starts a new
//! worker generation; events from older workers are dropped.

use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use gridshare_core::{GridshareError, Result, Transport, TransportEvent};
use tracing::{debug, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

/// How long a blocking read waits before the worker checks its queue.
const READ_POLL: Duration = Duration::from_millis(50);

enum Command {
    Send(String),
    Close,
}

/// Event sender of one worker. Goes quiet once a newer worker started.
struct Outbox {
    events: Sender<TransportEvent>,
    current: Arc<AtomicU64>,
    generation: u64,
}

impl Outbox {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// False once nobody should hear from this worker any more.
    fn emit(&self, event: TransportEvent) -> bool {
        if !self.is_current() {
            debug!(generation = self.generation, "dropping event from replaced worker");
            return false;
        }
        self.events.send(event).is_ok()
    }
}

pub struct SocketTransport {
    events: Sender<TransportEvent>,
    outbound: Option<Sender<Command>>,
    generation: Arc<AtomicU64>,
}

impl SocketTransport {
    /// A transport and the receiving end of its event stream.
    pub fn new() -> (Self, Receiver<TransportEvent>) {
        let (events, rx) = mpsc::channel();
        (
            Self {
                events,
                outbound: None,
                generation: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }
}

impl Transport for SocketTransport {
    fn open(&mut self, url: &Url) -> Result<()> {
        self.close();
        let (tx, rx) = mpsc::channel();
        let outbox = self.next_outbox();
        let url = url.clone();
        thread::Builder::new()
            .name("gridshare-socket".into())
            .spawn(move || run_socket(&url, &rx, &outbox))?;
        self.outbound = Some(tx);
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<()> {
        let outbound = self.outbound.as_ref().ok_or(GridshareError::NotConnected)?;
        outbound
            .send(Command::Send(text.to_string()))
            .map_err(|_| GridshareError::NotConnected)
    }

    fn close(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            let _ = outbound.send(Command::Close);
        }
    }
}

impl SocketTransport {
    fn next_outbox(&self) -> Outbox {
        Outbox {
            events: self.events.clone(),
            current: Arc::clone(&self.generation),
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

fn set_read_timeout(socket: &mut Socket) -> io::Result<()> {
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(READ_POLL)),
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(Some(READ_POLL)),
        _ => Ok(()),
    }
}

fn run_socket(url: &Url, commands: &Receiver<Command>, outbox: &Outbox) {
    let mut socket = match tungstenite::connect(url.as_str()) {
        Ok((socket, _response)) => socket,
        Err(err) => {
            warn!(error = %err, "live channel connect failed");
            outbox.emit(TransportEvent::Error(err.to_string()));
            outbox.emit(TransportEvent::Closed);
            return;
        }
    };
    if let Err(err) = set_read_timeout(&mut socket) {
        warn!(error = %err, "could not set socket read timeout");
    }
    if !outbox.emit(TransportEvent::Opened) {
        let _ = socket.close(None);
        return;
    }

    loop {
        if !drain_commands(&mut socket, commands, outbox) {
            debug!("live channel worker stopping");
            return;
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                if !outbox.emit(TransportEvent::Frame(text)) {
                    return;
                }
            }
            Ok(Message::Close(_)) => {
                outbox.emit(TransportEvent::Closed);
                return;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                outbox.emit(TransportEvent::Closed);
                return;
            }
            Err(err) => {
                outbox.emit(TransportEvent::Error(err.to_string()));
                outbox.emit(TransportEvent::Closed);
                return;
            }
        }
    }
}

/// Forward queued frames. Returns false once the worker should stop.
fn drain_commands(socket: &mut Socket, commands: &Receiver<Command>, outbox: &Outbox) -> bool {
    loop {
        match commands.try_recv() {
            Ok(Command::Send(text)) => {
                if let Err(err) = socket.send(Message::Text(text)) {
                    warn!(error = %err, "live channel send failed");
                    outbox.emit(TransportEvent::Error(err.to_string()));
                }
            }
            Ok(Command::Close) | Err(TryRecvError::Disconnected) => {
                let _ = socket.close(None);
                let _ = socket.flush();
                return false;
            }
            Err(TryRecvError::Empty) => return true,
        }
    }
}
