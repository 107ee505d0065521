//! Cross-thread access to the platform
//!
//! The platform lives on the host's main thread. Anything running elsewhere
//! (network tasks, a console, a remote UI) holds a [`RemoteHandle`] and posts
//! [`ControlMessage`]s, which are applied at the start of the next tick.

use lodestar_events::EventPayload;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Activate a module by id or unambiguous name
    Activate(String),
    Deactivate(String),
    Toggle(String),
    SetSetting {
        module: String,
        setting: String,
        value: String,
    },
    /// Run a command line (without the chat prefix)
    RunCommand(String),
    /// Publish an event on the control thread
    QueueEvent(EventPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("platform is no longer running")]
pub struct PlatformClosed;

pub(crate) type ControlReceiver = UnboundedReceiver<ControlMessage>;

pub(crate) fn control_channel() -> (RemoteHandle, ControlReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RemoteHandle { tx }, rx)
}

/// Thread-safe handle for posting work to the platform
#[derive(Debug, Clone)]
pub struct RemoteHandle {
    tx: UnboundedSender<ControlMessage>,
}

impl RemoteHandle {
    pub fn send(&self, message: ControlMessage) -> Result<(), PlatformClosed> {
        self.tx.send(message).map_err(|_| PlatformClosed)
    }

    pub fn activate(&self, module: impl Into<String>) -> Result<(), PlatformClosed> {
        self.send(ControlMessage::Activate(module.into()))
    }

    pub fn deactivate(&self, module: impl Into<String>) -> Result<(), PlatformClosed> {
        self.send(ControlMessage::Deactivate(module.into()))
    }

    pub fn toggle(&self, module: impl Into<String>) -> Result<(), PlatformClosed> {
        self.send(ControlMessage::Toggle(module.into()))
    }

    pub fn set_setting(
        &self,
        module: impl Into<String>,
        setting: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), PlatformClosed> {
        self.send(ControlMessage::SetSetting {
            module: module.into(),
            setting: setting.into(),
            value: value.into(),
        })
    }

    pub fn run_command(&self, line: impl Into<String>) -> Result<(), PlatformClosed> {
        self.send(ControlMessage::RunCommand(line.into()))
    }

    pub fn queue_event(&self, payload: EventPayload) -> Result<(), PlatformClosed> {
        self.send(ControlMessage::QueueEvent(payload))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send + Sync + Clone>() {}

    #[test]
    fn test_handle_is_thread_safe() {
        assert_send::<RemoteHandle>();
    }

    #[test]
    fn test_messages_arrive_in_order() {
        let (handle, mut rx) = control_channel();
        let worker = {
            let handle = handle.clone();
            std::thread::spawn(move || {
                handle.toggle("freecam").unwrap();
                handle.set_setting("anti-spam", "mode", "both").unwrap();
            })
        };
        worker.join().unwrap();

        assert_eq!(rx.try_recv().unwrap(), ControlMessage::Toggle("freecam".to_string()));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ControlMessage::SetSetting { ref value, .. } if value == "both"
        ));

        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(handle.run_command("help"), Err(PlatformClosed));
    }
}
