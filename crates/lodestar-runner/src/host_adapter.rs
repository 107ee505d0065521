//! The boundary a host application drives
//!
//! A host calls one method per lifecycle moment. Calls carrying input or
//! network traffic return whether the host should go ahead with it.

use lodestar_events::{EventPayload, HostSnapshot, KeyboardEvent, MouseEvent, Packet};
use tracing::{debug, trace, warn};

use crate::platform::Platform;

/// Description of an outbound connection the host is about to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    /// `host:port` of the server
    pub remote: String,
    /// `host:port` of a proxy to connect through
    pub proxy: Option<String>,
    /// Names of the pipeline layers, outermost first
    pub pipeline: Vec<String>,
}

impl ChannelSpec {
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            proxy: None,
            pipeline: Vec::new(),
        }
    }

    pub fn with_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipeline.extend(layers.into_iter().map(Into::into));
        self
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.pipeline.iter().any(|layer| layer == name)
    }

    /// Insert `layer` in front of `anchor`. Returns false if `anchor` is missing.
    pub fn insert_before(&mut self, anchor: &str, layer: impl Into<String>) -> bool {
        match self.pipeline.iter().position(|existing| existing == anchor) {
            Some(index) => {
                self.pipeline.insert(index, layer.into());
                true
            }
            None => false,
        }
    }

    /// Insert `layer` behind `anchor`. Returns false if `anchor` is missing.
    pub fn insert_after(&mut self, anchor: &str, layer: impl Into<String>) -> bool {
        match self.pipeline.iter().position(|existing| existing == anchor) {
            Some(index) => {
                self.pipeline.insert(index + 1, layer.into());
                true
            }
            None => false,
        }
    }
}

/// Hook into outbound connection setup, e.g. for a proxy or protocol shim
pub trait ChannelInterceptor: 'static {
    fn name(&self) -> &str;

    /// Adjust the channel before it is opened. An error leaves the changes
    /// made so far in place and moves on to the next interceptor.
    fn intercept(&mut self, channel: &mut ChannelSpec) -> anyhow::Result<()>;
}

/// Translates host lifecycle moments into events on the platform's bus
pub struct HostAdapter {
    platform: Platform,
    interceptors: Vec<Box<dyn ChannelInterceptor>>,
    tick: u64,
    frame: u64,
}

impl HostAdapter {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            interceptors: Vec::new(),
            tick: 0,
            frame: 0,
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Ticks started so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Replace the host state handed to handlers with every event.
    /// The tick counter is kept by the adapter.
    pub fn update_snapshot(&self, snapshot: HostSnapshot) {
        self.platform.bus().set_snapshot(HostSnapshot {
            tick: self.tick,
            ..snapshot
        });
    }

    /// Start of a host tick
    ///
    /// Applies queued control messages and delivers deferred events before
    /// publishing `TickPre`.
    pub fn tick_start(&mut self) {
        self.tick += 1;
        let current = self.platform.bus().snapshot();
        self.update_snapshot(HostSnapshot::clone(&current));

        let handled = self.platform.drain_control();
        let delivered = self.platform.bus().flush();
        if handled > 0 || delivered > 0 {
            debug!(
                target: "host",
                "Tick {}: {} control message(s), {} deferred event(s)",
                self.tick,
                handled,
                delivered
            );
        }

        self.publish(EventPayload::TickPre);
    }

    pub fn tick_end(&mut self) {
        self.publish(EventPayload::TickPost);
    }

    pub fn pre_render(&mut self, partial_ticks: f32) {
        self.publish(EventPayload::RenderPre {
            frame: self.frame,
            partial_ticks,
        });
    }

    pub fn post_render(&mut self) {
        self.publish(EventPayload::RenderPost { frame: self.frame });
        self.frame += 1;
    }

    /// A packet arrived from the server. Returns false if it should be dropped.
    pub fn packet_in(&mut self, packet: Packet) -> bool {
        self.publish(EventPayload::PacketReceive(packet))
    }

    /// The host is about to send a packet. Returns false if it should not be sent.
    pub fn packet_out(&mut self, packet: Packet) -> bool {
        self.publish(EventPayload::PacketSend(packet))
    }

    /// A chat line arrived. Returns false if it should not be shown.
    pub fn chat_in(&mut self, message: impl Into<String>) -> bool {
        self.publish(EventPayload::ChatReceive {
            message: message.into(),
        })
    }

    /// The user sent a chat line. Returns false if it should not reach the
    /// server, e.g. because it was a command.
    pub fn chat_out(&mut self, message: impl Into<String>) -> bool {
        self.publish(EventPayload::ChatSend {
            message: message.into(),
        })
    }

    pub fn key_input(&mut self, key: KeyboardEvent) -> bool {
        self.publish(EventPayload::KeyInput(key))
    }

    pub fn mouse_input(&mut self, mouse: MouseEvent) -> bool {
        self.publish(EventPayload::MouseInput(mouse))
    }

    pub fn add_interceptor(&mut self, interceptor: impl ChannelInterceptor) {
        debug!(target: "host", "Added channel interceptor '{}'", interceptor.name());
        self.interceptors.push(Box::new(interceptor));
    }

    /// Run every interceptor, in the order they were added, over a channel
    /// the host is about to open
    pub fn open_channel(&mut self, mut channel: ChannelSpec) -> ChannelSpec {
        for interceptor in &mut self.interceptors {
            if let Err(e) = interceptor.intercept(&mut channel) {
                warn!(
                    target: "host",
                    "Channel interceptor '{}' failed for {}: {:#}",
                    interceptor.name(),
                    channel.remote,
                    e
                );
            }
        }
        debug!(target: "host", "Opening channel {:?}", channel);
        channel
    }

    /// Publish an event and report whether it went through uncancelled
    fn publish(&self, payload: EventPayload) -> bool {
        let bus = self.platform.bus();
        let event = bus.emit(payload);
        if event.is_cancelled() {
            trace!(target: "host", "{} event cancelled", event.kind());
            return false;
        }
        true
    }

    /// Shut the platform down and hand it back
    pub fn shutdown(self) -> Platform {
        self.platform.shutdown();
        self.platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Socks {
        address: &'static str,
    }

    impl ChannelInterceptor for Socks {
        fn name(&self) -> &str {
            "socks"
        }

        fn intercept(&mut self, channel: &mut ChannelSpec) -> anyhow::Result<()> {
            channel.proxy = Some(self.address.to_string());
            channel.pipeline.insert(0, "socks5".to_string());
            Ok(())
        }
    }

    struct Translator;

    impl ChannelInterceptor for Translator {
        fn name(&self) -> &str {
            "protocol-translation"
        }

        fn intercept(&mut self, channel: &mut ChannelSpec) -> anyhow::Result<()> {
            if !channel.insert_after("decoder", "translator") {
                anyhow::bail!("no decoder layer");
            }
            Ok(())
        }
    }

    fn adapter() -> HostAdapter {
        HostAdapter::new(Platform::builder().build().unwrap())
    }

    #[test]
    fn test_interceptors_run_in_order() {
        let mut host = adapter();
        host.add_interceptor(Socks {
            address: "127.0.0.1:1080",
        });
        host.add_interceptor(Translator);

        let channel = host.open_channel(
            ChannelSpec::new("play.example.net:25565").with_layers(["decoder", "handler"]),
        );
        assert_eq!(channel.proxy.as_deref(), Some("127.0.0.1:1080"));
        assert_eq!(channel.pipeline, vec!["socks5", "decoder", "translator", "handler"]);

        // a failing interceptor does not stop the channel
        let channel = host.open_channel(ChannelSpec::new("localhost:25565"));
        assert!(channel.has_layer("socks5"));
        assert!(!channel.has_layer("translator"));
    }

    #[test]
    fn test_tick_counter_survives_snapshot_updates() {
        let mut host = adapter();
        host.tick_start();
        host.tick_start();
        host.update_snapshot(HostSnapshot {
            tick: 99,
            in_world: true,
            ..HostSnapshot::default()
        });

        let snapshot = host.platform().bus().snapshot();
        assert_eq!(snapshot.tick, 2);
        assert!(snapshot.in_world);

        host.tick_start();
        assert_eq!(host.platform().bus().snapshot().tick, 3);
        assert!(host.platform().bus().snapshot().in_world);
    }

    #[test]
    fn test_chat_commands_are_not_sent() {
        let mut host = adapter();
        let mut actions = host.platform().take_action_receiver().unwrap();

        assert!(host.chat_out("hello everyone"));
        assert!(!host.chat_out(".help toggle"));
        assert_eq!(
            actions.try_recv().unwrap(),
            lodestar_events::HostAction::ShowMessage {
                message: "toggle <module>".to_string()
            }
        );
    }
}
