//! Event broker: single-task pub/sub fanning index mutations out to SSE
//! subscribers.
//!
//! All mutable state (the subscriber set, the graph-throttle timestamp) is
//! owned by one loop task; the public handle only sends command messages.
//! Events are encoded to the SSE wire format once, before fan-out, so every
//! subscriber receives the same pre-serialized bytes.

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Default minimum interval between `graph.updated` events.
pub const DEFAULT_GRAPH_THROTTLE: Duration = Duration::from_secs(2);

/// Per-subscriber buffer capacity. A subscriber that falls further behind
/// than this loses messages (for itself only).
const SUBSCRIBER_BUFFER: usize = 64;

/// Kind of note mutation observed by the watcher or the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEventKind {
    Created,
    Updated,
    Deleted,
}

impl NoteEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NoteEventKind::Created => "note.created",
            NoteEventKind::Updated => "note.updated",
            NoteEventKind::Deleted => "note.deleted",
        }
    }
}

/// Encode one event into an SSE frame.
fn encode_frame(kind: &str, data: &serde_json::Value) -> Bytes {
    Bytes::from(format!("event: {kind}\ndata: {data}\n\n"))
}

enum Command {
    Subscribe {
        reply: oneshot::Sender<(u64, mpsc::Receiver<Bytes>)>,
    },
    Unsubscribe {
        id: u64,
    },
    Publish {
        frame: Bytes,
    },
    NoteEvent {
        kind: NoteEventKind,
        path: String,
    },
    Close,
}

/// Cloneable handle to the broker loop.
#[derive(Clone)]
pub struct Broker {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Broker {
    /// Spawn the broker loop. `graph_throttle` is the minimum spacing of
    /// `graph.updated` events; zero falls back to the default.
    pub fn new(graph_throttle: Duration) -> Self {
        let throttle = if graph_throttle.is_zero() {
            DEFAULT_GRAPH_THROTTLE
        } else {
            graph_throttle
        };
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(broker_loop(cmd_rx, throttle));
        Self { cmd_tx }
    }

    /// Register a new subscriber. After `close()` the returned subscription
    /// yields no events.
    pub async fn subscribe(&self) -> Subscription {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Subscribe { reply }).is_ok() {
            if let Ok((id, events)) = rx.await {
                return Subscription {
                    id,
                    events,
                    cmd_tx: self.cmd_tx.clone(),
                };
            }
        }
        // Broker closed: hand back an already-terminated subscription.
        let (_tx, events) = mpsc::channel(1);
        Subscription {
            id: 0,
            events,
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    /// Broadcast an arbitrary event to all subscribers.
    pub fn publish(&self, kind: &str, data: serde_json::Value) {
        let _ = self.cmd_tx.send(Command::Publish {
            frame: encode_frame(kind, &data),
        });
    }

    /// Broadcast a note mutation, plus a throttled `graph.updated`.
    pub fn publish_note_event(&self, kind: NoteEventKind, path: &str) {
        let _ = self.cmd_tx.send(Command::NoteEvent {
            kind,
            path: path.to_string(),
        });
    }

    /// Shut the loop down and terminate all subscriptions. Later publishes
    /// and subscribes are no-ops.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }
}

/// A registered subscriber's receiving end. Dropping it unregisters from
/// the loop, so an SSE client disconnect cleans itself up.
pub struct Subscription {
    id: u64,
    events: mpsc::Receiver<Bytes>,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    /// Receive the next pre-encoded SSE frame. `None` when the broker has
    /// shut down.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.events.recv().await
    }
}

impl Stream for Subscription {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Unsubscribe { id: self.id });
    }
}

struct SubscriberSlot {
    tx: mpsc::Sender<Bytes>,
    dropped: u64,
}

async fn broker_loop(mut cmd_rx: mpsc::UnboundedReceiver<Command>, throttle: Duration) {
    let mut subscribers: HashMap<u64, SubscriberSlot> = HashMap::new();
    let mut next_id: u64 = 1;
    let mut last_graph: Option<Instant> = None;

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            Command::Subscribe { reply } => {
                let id = next_id;
                next_id += 1;
                let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
                if reply.send((id, rx)).is_ok() {
                    subscribers.insert(id, SubscriberSlot { tx, dropped: 0 });
                    tracing::debug!(id, total = subscribers.len(), "broker: subscribed");
                }
            }
            Command::Unsubscribe { id } => {
                if let Some(slot) = subscribers.remove(&id) {
                    if slot.dropped > 0 {
                        tracing::debug!(id, dropped = slot.dropped, "broker: unsubscribed");
                    }
                }
            }
            Command::Publish { frame } => {
                fan_out(&mut subscribers, &frame);
            }
            Command::NoteEvent { kind, path } => {
                let frame = encode_frame(kind.as_str(), &serde_json::json!({ "path": path }));
                fan_out(&mut subscribers, &frame);

                let due = last_graph.map_or(true, |t| t.elapsed() >= throttle);
                if due {
                    last_graph = Some(Instant::now());
                    let graph = encode_frame("graph.updated", &serde_json::json!({}));
                    fan_out(&mut subscribers, &graph);
                }
            }
            Command::Close => break,
        }
    }

    // Dropping the senders terminates every subscription stream.
    subscribers.clear();
    tracing::debug!("broker: stopped");
}

/// Send a frame to every subscriber without ever blocking the loop. A full
/// buffer drops the frame for that subscriber only; a closed receiver is
/// removed.
fn fan_out(subscribers: &mut HashMap<u64, SubscriberSlot>, frame: &Bytes) {
    let mut gone = Vec::new();
    for (id, slot) in subscribers.iter_mut() {
        match slot.tx.try_send(frame.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                slot.dropped += 1;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                gone.push(*id);
            }
        }
    }
    for id in gone {
        subscribers.remove(&id);
    }
}
