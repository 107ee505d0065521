use std::any::Any;

use lodestar_events::{Category, Event, EventFilter, EventKind, ModuleId};

use super::PathRecorder;
use crate::context::ModuleContext;
use crate::module::Module;
use crate::settings::{BoolSetting, Color, ColorSetting, Setting, Settings};

const PATH_RECORDER: ModuleId = ModuleId::from_static(Category::World, "path-recorder");
static DEPENDENCIES: [ModuleId; 1] = [PATH_RECORDER];

/// Overlay summarising the recorded path
///
/// Rendering itself belongs to the host; this module prepares the text the
/// overlay shows each frame.
pub struct RouteHud {
    settings: Settings,
    color: Setting<ColorSetting>,
    show_distance: Setting<BoolSetting>,
    line: Option<String>,
}

impl RouteHud {
    pub fn new() -> Self {
        let settings = Settings::new();
        let render = settings.group("Render");
        let color = render.add(
            ColorSetting::builder("color", Color::rgba(0, 255, 204, 200))
                .description("Overlay text color"),
        );
        let show_distance = render.add(BoolSetting::builder("show-distance", true));

        Self {
            settings,
            color,
            show_distance,
            line: None,
        }
    }

    /// Overlay text of the last rendered frame
    pub fn line(&self) -> Option<&str> {
        self.line.as_deref()
    }
}

impl Default for RouteHud {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for RouteHud {
    fn category(&self) -> Category {
        Category::Render
    }

    fn name(&self) -> &'static str {
        "route-hud"
    }

    fn description(&self) -> &'static str {
        "Shows the recorded path on screen"
    }

    fn dependencies(&self) -> &[ModuleId] {
        &DEPENDENCIES
    }

    fn settings(&self) -> Settings {
        self.settings.clone()
    }

    fn subscribed_events(&self) -> &[EventFilter] {
        &[EventFilter::Only(EventKind::RenderPost)]
    }

    fn on_deactivate(&mut self, _ctx: &mut ModuleContext<'_>) {
        self.line = None;
    }

    fn on_event(&mut self, event: &Event, ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
        if event.snapshot().screen_open {
            return Ok(());
        }

        let (points, distance) = ctx
            .registry()
            .with_module(&PATH_RECORDER, |recorder: &PathRecorder| {
                (recorder.points().len(), recorder.distance())
            })
            .ok_or_else(|| anyhow::anyhow!("{} is not available", PATH_RECORDER))?;

        let mut line = format!("{} {} points", self.color.get(), points);
        if self.show_distance.get() {
            line.push_str(&format!(", {:.1} blocks", distance));
        }
        self.line = Some(line);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
