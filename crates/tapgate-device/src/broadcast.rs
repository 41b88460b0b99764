//! Live state broadcast to a single subscriber.
//!
//! The device supports exactly one live subscriber (one browser tab on
//! the status page, in practice). A new subscription forcibly replaces
//! the old one, and a failed send drops the subscriber so the
//! controller never keeps writing into a dead connection. Snapshots
//! are self-contained: a late joiner needs nothing but the latest one.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tapgate_core::{Card, EventSource};
use tracing::{debug, info, warn};

/// Complete device state at one sequence point.
///
/// Field names follow the wire payload consumed by the status page:
/// `id` is the monotonic sequence number, `fw` the firmware string,
/// `uid`/`access`/`name` describe the last tap (empty before the first
/// one), `cards` is the full allow list, and `ok`/`msg` carry the
/// outcome of the admin command that produced a `cmd` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: u64,
    pub fw: String,
    pub uid: String,
    pub access: String,
    #[serde(default)]
    pub name: String,
    pub cards: Vec<Card>,
    pub src: EventSource,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub msg: Option<String>,
    pub at: DateTime<Utc>,
}

/// Receiving end of the broadcast.
///
/// Implementations wrap whatever carries events to the subscriber —
/// an SSE socket on the real device. Send failures are terminal: the
/// broadcaster drops the sink after the first one, matching how a
/// half-closed TCP connection behaves.
pub trait SnapshotSink {
    /// Deliver one snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscriber is gone; the sink will be
    /// dropped and closed.
    fn send(&mut self, snapshot: &Snapshot) -> std::io::Result<()>;

    /// Release the underlying connection.
    fn close(&mut self);
}

/// Holds at most one live subscriber and pushes snapshots to it.
#[derive(Default)]
pub struct EventBroadcaster {
    subscriber: Option<Box<dyn SnapshotSink + Send>>,
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscribed", &self.subscriber.is_some())
            .finish()
    }
}

impl EventBroadcaster {
    /// Create a broadcaster with no subscriber.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `sink` as the live subscriber, closing any previous one.
    pub fn replace(&mut self, sink: Box<dyn SnapshotSink + Send>) {
        if let Some(mut old) = self.subscriber.take() {
            info!("live subscriber replaced");
            old.close();
        }
        self.subscriber = Some(sink);
    }

    /// Push `snapshot` to the subscriber, if any.
    ///
    /// A send failure drops the subscriber; the next tick simply has
    /// nobody to notify. Returns whether the snapshot was delivered.
    pub fn publish(&mut self, snapshot: &Snapshot) -> bool {
        let Some(sink) = self.subscriber.as_mut() else {
            return false;
        };
        match sink.send(snapshot) {
            Ok(()) => {
                debug!(id = snapshot.id, src = %snapshot.src, "snapshot delivered");
                true
            }
            Err(error) => {
                warn!(%error, "subscriber gone, dropping it");
                if let Some(mut dead) = self.subscriber.take() {
                    dead.close();
                }
                false
            }
        }
    }

    /// Close and drop the subscriber, if any.
    pub fn close(&mut self) {
        if let Some(mut sink) = self.subscriber.take() {
            sink.close();
        }
    }

    /// Whether a live subscriber is attached.
    pub fn has_subscriber(&self) -> bool {
        self.subscriber.is_some()
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    snapshots: Vec<Snapshot>,
    closed: bool,
    fail_next: bool,
}

fn lock(state: &Mutex<RecordingState>) -> MutexGuard<'_, RecordingState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory sink recording everything it receives.
///
/// Clones share state, so tests keep one clone and hand the other to
/// [`EventBroadcaster::replace`].
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots received so far, oldest first.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        lock(&self.state).snapshots.clone()
    }

    /// Whether the broadcaster has closed this sink.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Make the next send fail, simulating a dropped subscriber.
    pub fn fail_next_send(&self) {
        lock(&self.state).fail_next = true;
    }
}

impl SnapshotSink for RecordingSink {
    fn send(&mut self, snapshot: &Snapshot) -> std::io::Result<()> {
        let mut state = lock(&self.state);
        if state.fail_next {
            state.fail_next = false;
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "subscriber hung up",
            ));
        }
        state.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn close(&mut self) {
        lock(&self.state).closed = true;
    }
}
