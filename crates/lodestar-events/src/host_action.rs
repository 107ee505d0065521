use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::event::Packet;

/// Requests flowing from modules and commands back to the host
///
/// The core never touches host internals directly; the host adapter drains
/// these and performs them at a point of its choosing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    /// Send a chat message to the server as the player
    SendChat { message: String },
    /// Show a client-side message to the user (never sent to the server)
    ShowMessage { message: String },
    /// Send a raw packet to the server
    SendPacket(Packet),
}

pub type ActionSender = UnboundedSender<HostAction>;
pub type ActionReceiver = UnboundedReceiver<HostAction>;

/// Create the channel the host drains for [`HostAction`]s
pub fn action_channel() -> (ActionSender, ActionReceiver) {
    mpsc::unbounded_channel()
}
