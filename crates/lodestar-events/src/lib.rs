/// Core event types and the event bus for lodestar
///
/// This crate is the integration seam between the host application and every
/// feature: host lifecycle moments become [`Event`]s, and everything that wants
/// to react to them subscribes to the [`EventBus`].
pub mod bus;
pub mod event;
pub mod host_action;
pub mod keyboard_events;
pub mod module_id;

pub use bus::{
    DEFAULT_FAULT_THRESHOLD, EventBus, EventHandler, HandlerFault, MAX_DISPATCH_DEPTH,
    SubscriptionId, panic_message, priority,
};
pub use event::{
    Event, EventFilter, EventKind, EventPayload, HostSnapshot, Packet, PlayerSnapshot,
};
pub use host_action::{ActionReceiver, ActionSender, HostAction, action_channel};
pub use keyboard_events::{
    KeyCode, KeyEventKind, KeyModifiers, KeyboardEvent, MouseButton, MouseEvent,
};
pub use module_id::{Category, ModuleId};
