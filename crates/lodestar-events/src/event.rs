use std::cell::Cell;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::keyboard_events::{KeyboardEvent, MouseEvent};
use crate::module_id::ModuleId;

/// Discriminant of an [`EventPayload`], used for subscription filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum EventKind {
    TickPre,
    TickPost,
    RenderPre,
    RenderPost,
    PacketReceive,
    PacketSend,
    ChatReceive,
    ChatSend,
    KeyInput,
    MouseInput,
    ModuleStateChanged,
}

impl EventKind {
    /// Whether cancelling an event of this kind suppresses a host-side action
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            EventKind::PacketReceive
                | EventKind::PacketSend
                | EventKind::ChatReceive
                | EventKind::ChatSend
                | EventKind::KeyInput
                | EventKind::MouseInput
        )
    }
}

/// Filter for subscribing to specific events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Subscribe to all events
    All,
    /// Subscribe to a single kind
    Only(EventKind),
}

impl EventFilter {
    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(only) => *only == kind,
        }
    }
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        EventFilter::Only(kind)
    }
}

/// An opaque network packet as seen by the host adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub id: u32,
    /// Human-readable packet name (e.g. "move", "chat")
    pub name: String,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(id: u32, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Payload of a host lifecycle event
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    TickPre,
    TickPost,
    RenderPre { frame: u64, partial_ticks: f32 },
    RenderPost { frame: u64 },
    PacketReceive(Packet),
    PacketSend(Packet),
    ChatReceive { message: String },
    ChatSend { message: String },
    KeyInput(KeyboardEvent),
    MouseInput(MouseEvent),
    ModuleStateChanged { module: ModuleId, active: bool },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::TickPre => EventKind::TickPre,
            EventPayload::TickPost => EventKind::TickPost,
            EventPayload::RenderPre { .. } => EventKind::RenderPre,
            EventPayload::RenderPost { .. } => EventKind::RenderPost,
            EventPayload::PacketReceive(_) => EventKind::PacketReceive,
            EventPayload::PacketSend(_) => EventKind::PacketSend,
            EventPayload::ChatReceive { .. } => EventKind::ChatReceive,
            EventPayload::ChatSend { .. } => EventKind::ChatSend,
            EventPayload::KeyInput(_) => EventKind::KeyInput,
            EventPayload::MouseInput(_) => EventKind::MouseInput,
            EventPayload::ModuleStateChanged { .. } => EventKind::ModuleStateChanged,
        }
    }
}

/// Snapshot of the local player at the time of an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub name: String,
    pub position: [f64; 3],
    pub dimension: String,
}

/// Snapshot of host state at the time of an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    /// Host tick counter
    pub tick: u64,
    /// Whether a world is loaded
    pub in_world: bool,
    /// Whether a host screen (menu, inventory, chat box) has focus
    pub screen_open: bool,
    /// Local player, if one exists
    pub player: Option<PlayerSnapshot>,
}

/// A host lifecycle event in flight
///
/// Handlers only ever see `&Event`: the payload and snapshot cannot be
/// changed, and the cancellation flag can be set but never cleared.
#[derive(Debug, Clone)]
pub struct Event {
    payload: EventPayload,
    snapshot: Arc<HostSnapshot>,
    sequence: u64,
    timestamp: Instant,
    cancelled: Cell<bool>,
}

impl Event {
    /// Create a free-standing event with an empty snapshot
    pub fn new(payload: EventPayload) -> Self {
        Self::with_snapshot(payload, Arc::new(HostSnapshot::default()), 0)
    }

    pub fn with_snapshot(payload: EventPayload, snapshot: Arc<HostSnapshot>, sequence: u64) -> Self {
        Self {
            payload,
            snapshot,
            sequence,
            timestamp: Instant::now(),
            cancelled: Cell::new(false),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn snapshot(&self) -> &HostSnapshot {
        &self.snapshot
    }

    pub fn shared_snapshot(&self) -> Arc<HostSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Sequence number assigned by the bus that built this event
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Cancel the event. Returns whether the event is now cancelled; events
    /// whose kind has no cancellable host action are left untouched.
    pub fn cancel(&self) -> bool {
        if !self.kind().is_cancellable() {
            tracing::debug!(target: "events", "Ignoring cancel of non-cancellable {} event", self.kind());
            return false;
        }
        self.cancelled.set(true);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Chat text carried by chat events
    pub fn chat_message(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::ChatReceive { message } | EventPayload::ChatSend { message } => {
                Some(message)
            }
            _ => None,
        }
    }

    /// Packet carried by packet events
    pub fn packet(&self) -> Option<&Packet> {
        match &self.payload {
            EventPayload::PacketReceive(packet) | EventPayload::PacketSend(packet) => Some(packet),
            _ => None,
        }
    }
}
