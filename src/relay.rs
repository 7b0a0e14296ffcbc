//! Relay hub: forwards frames between the frontend and local print agents.
//!
//! One hub task owns the channel set. Each WebSocket connection runs its own
//! task and talks to the hub through [`HubHandle`], so joins, frames and
//! leaves are applied in the order they were queued and the set is never
//! touched from two places at once.

use axum::extract::ws::{Message, WebSocket};
use axum::http::{header, HeaderMap};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub type ChannelId = u64;

/// Which side of the relay a channel belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginClass {
    /// The browser frontend
    Remote,
    /// Anything else, normally a print agent
    Local,
}

/// Decides a connection's class when it is accepted
pub trait OriginClassifier: Send + Sync {
    fn classify(&self, headers: &HeaderMap) -> OriginClass;
}

/// `Remote` when the `Origin` header equals the frontend origin exactly
#[derive(Debug, Clone)]
pub struct FrontendOrigin {
    origin: String,
}

impl FrontendOrigin {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }
}

impl OriginClassifier for FrontendOrigin {
    fn classify(&self, headers: &HeaderMap) -> OriginClass {
        match headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
            Some(origin) if origin == self.origin => OriginClass::Remote,
            _ => OriginClass::Local,
        }
    }
}

/// Opaque frame body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }
}

/// Channels currently open, by class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub remote: usize,
    pub local: usize,
}

enum HubEvent {
    Join {
        id: ChannelId,
        class: OriginClass,
        outbound: mpsc::UnboundedSender<Payload>,
    },
    Frame {
        from: ChannelId,
        payload: Payload,
    },
    Leave {
        id: ChannelId,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

struct Peer {
    class: OriginClass,
    outbound: mpsc::UnboundedSender<Payload>,
}

/// Forwarding rule: every open channel of the other class, never the sender's class
pub fn recipients(
    sender: OriginClass,
    channels: impl IntoIterator<Item = (ChannelId, OriginClass)>,
) -> Vec<ChannelId> {
    channels
        .into_iter()
        .filter(|(_, class)| *class != sender)
        .map(|(id, _)| id)
        .collect()
}

/// Cloneable handle to the hub task
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::UnboundedSender<HubEvent>,
    next_id: Arc<AtomicU64>,
}

impl HubHandle {
    /// Spawn the hub task on the current runtime
    pub fn spawn() -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_hub(rx));
        Self {
            events,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a channel; frames for it arrive on the returned receiver
    pub fn join(&self, class: OriginClass) -> (ChannelId, mpsc::UnboundedReceiver<Payload>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outbound, rx) = mpsc::unbounded_channel();
        self.send(HubEvent::Join { id, class, outbound });
        (id, rx)
    }

    pub fn forward(&self, from: ChannelId, payload: Payload) {
        self.send(HubEvent::Frame { from, payload });
    }

    pub fn leave(&self, id: ChannelId) {
        self.send(HubEvent::Leave { id });
    }

    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::Stats { reply });
        rx.await.unwrap_or_default()
    }

    fn send(&self, event: HubEvent) {
        if self.events.send(event).is_err() {
            warn!("Relay hub is not running");
        }
    }
}

async fn run_hub(mut events: mpsc::UnboundedReceiver<HubEvent>) {
    let mut peers: BTreeMap<ChannelId, Peer> = BTreeMap::new();

    while let Some(event) = events.recv().await {
        match event {
            HubEvent::Join { id, class, outbound } => {
                info!("Client connected to relay: #{} ({:?})", id, class);
                peers.insert(id, Peer { class, outbound });
            }
            HubEvent::Frame { from, payload } => {
                let Some(sender) = peers.get(&from) else {
                    debug!("Dropping frame from closed channel #{}", from);
                    continue;
                };
                let targets = recipients(sender.class, peers.iter().map(|(id, p)| (*id, p.class)));
                debug!(
                    "Forwarding {} bytes from #{} ({:?}) to {} channel(s)",
                    payload.len(),
                    from,
                    sender.class,
                    targets.len()
                );
                for id in targets {
                    if let Some(peer) = peers.get(&id) {
                        // A closed receiver means that channel is already leaving
                        let _ = peer.outbound.send(payload.clone());
                    }
                }
            }
            HubEvent::Leave { id } => {
                if peers.remove(&id).is_some() {
                    info!("Client disconnected: #{}", id);
                }
            }
            HubEvent::Stats { reply } => {
                let stats = peers.values().fold(HubStats::default(), |mut stats, peer| {
                    match peer.class {
                        OriginClass::Remote => stats.remote += 1,
                        OriginClass::Local => stats.local += 1,
                    }
                    stats
                });
                let _ = reply.send(stats);
            }
        }
    }
}

/// Drive one accepted WebSocket until either side closes it
pub async fn handle_socket(socket: WebSocket, class: OriginClass, hub: HubHandle) {
    let (mut sink, mut stream) = socket.split();
    let (id, mut outbound) = hub.join(class);

    let writer = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            let message = match payload {
                Payload::Text(text) => Message::Text(text),
                Payload::Binary(bytes) => Message::Binary(bytes),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                info!("Received from #{}: {}", id, text);
                hub.forward(id, Payload::Text(text));
            }
            Ok(Message::Binary(bytes)) => hub.forward(id, Payload::Binary(bytes)),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Channel #{} error: {}", id, e);
                break;
            }
        }
    }

    hub.leave(id);
    writer.abort();
}
