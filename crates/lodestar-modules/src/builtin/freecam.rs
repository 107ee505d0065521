use std::any::Any;

use lodestar_events::{Category, Event, EventFilter, EventKind, KeyCode, ModuleId, priority};
use tracing::trace;

use crate::context::ModuleContext;
use crate::module::Module;
use crate::settings::{BoolSetting, DoubleSetting, Setting, Settings};

static CONFLICTS: [ModuleId; 1] = [ModuleId::from_static(Category::World, "path-recorder")];

/// Packet name of player movement updates
const MOVE_PACKET: &str = "move";

/// Detaches the camera by holding back movement packets
pub struct Freecam {
    settings: Settings,
    speed: Setting<DoubleSetting>,
    block_movement: Setting<BoolSetting>,
    suppressed: usize,
}

impl Freecam {
    pub fn new() -> Self {
        let settings = Settings::new();
        let general = settings.group("General");
        let speed = general.add(
            DoubleSetting::builder("speed", 1.0)
                .description("Camera speed multiplier")
                .range(0.1, 10.0)
                .slider(0.1, 4.0)
                .decimals(1),
        );
        let block_movement = general.add(
            BoolSetting::builder("block-movement-packets", true)
                .description("Keep the server from seeing the player move"),
        );

        Self {
            settings,
            speed,
            block_movement,
            suppressed: 0,
        }
    }

    /// Movement packets held back since activation
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }
}

impl Default for Freecam {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Freecam {
    fn category(&self) -> Category {
        Category::Render
    }

    fn name(&self) -> &'static str {
        "freecam"
    }

    fn description(&self) -> &'static str {
        "Moves the camera independently of the player"
    }

    fn conflicts(&self) -> &[ModuleId] {
        &CONFLICTS
    }

    fn priority(&self) -> i32 {
        priority::HIGH
    }

    fn settings(&self) -> Settings {
        self.settings.clone()
    }

    fn default_keybind(&self) -> Option<KeyCode> {
        Some(KeyCode::F(6))
    }

    fn subscribed_events(&self) -> &[EventFilter] {
        &[EventFilter::Only(EventKind::PacketSend)]
    }

    fn on_activate(&mut self, ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
        if !ctx.snapshot().in_world {
            anyhow::bail!("not in a world");
        }
        self.suppressed = 0;
        ctx.show_message(format!("Freecam on (speed {:.1})", self.speed.get()));
        Ok(())
    }

    fn on_deactivate(&mut self, ctx: &mut ModuleContext<'_>) {
        ctx.show_message("Freecam off");
    }

    fn on_event(&mut self, event: &Event, _ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
        let Some(packet) = event.packet() else {
            return Ok(());
        };
        if packet.name == MOVE_PACKET && self.block_movement.get() {
            event.cancel();
            self.suppressed += 1;
            trace!(target: "modules", "freecam held back packet {}", packet.id);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
