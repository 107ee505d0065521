use std::any::Any;

use lodestar_events::{Category, Event, EventFilter, EventKind};

use crate::context::ModuleContext;
use crate::module::Module;
use crate::settings::{IntSetting, Setting, Settings};

/// Samples the player's position every few ticks
pub struct PathRecorder {
    settings: Settings,
    interval: Setting<IntSetting>,
    max_points: Setting<IntSetting>,
    points: Vec<[f64; 3]>,
}

impl PathRecorder {
    pub fn new() -> Self {
        let settings = Settings::new();
        let general = settings.group("General");
        let interval = general.add(
            IntSetting::builder("interval-ticks", 10)
                .description("Ticks between samples")
                .range(1, 200),
        );
        let max_points = general.add(
            IntSetting::builder("max-points", 500)
                .description("Oldest samples are dropped beyond this")
                .range(10, 10_000),
        );

        Self {
            settings,
            interval,
            max_points,
            points: Vec::new(),
        }
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Length of the recorded path in blocks
    pub fn distance(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| {
                let [a, b] = [pair[0], pair[1]];
                ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2) + (b[2] - a[2]).powi(2)).sqrt()
            })
            .sum()
    }
}

impl Default for PathRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for PathRecorder {
    fn category(&self) -> Category {
        Category::World
    }

    fn name(&self) -> &'static str {
        "path-recorder"
    }

    fn description(&self) -> &'static str {
        "Records where the player has been"
    }

    fn settings(&self) -> Settings {
        self.settings.clone()
    }

    fn subscribed_events(&self) -> &[EventFilter] {
        &[EventFilter::Only(EventKind::TickPost)]
    }

    fn on_activate(&mut self, _ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
        self.points.clear();
        Ok(())
    }

    fn on_event(&mut self, event: &Event, _ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
        let snapshot = event.snapshot();
        let Some(player) = snapshot.player.as_ref() else {
            return Ok(());
        };

        let interval = u64::try_from(self.interval.get()).unwrap_or(1).max(1);
        if snapshot.tick % interval != 0 || self.points.last() == Some(&player.position) {
            return Ok(());
        }

        self.points.push(player.position);
        let max = usize::try_from(self.max_points.get()).unwrap_or(usize::MAX);
        if self.points.len() > max {
            let excess = self.points.len() - max;
            self.points.drain(..excess);
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

#[cfg(test)]
mod tests {
    use lodestar_events::{EventBus, EventPayload, HostSnapshot, PlayerSnapshot, action_channel};

    use super::*;
    use crate::registry::ModuleRegistry;

    fn at(bus: &EventBus, tick: u64, x: f64) {
        bus.set_snapshot(HostSnapshot {
            tick,
            in_world: true,
            player: Some(PlayerSnapshot {
                position: [x, 64.0, 0.0],
                ..PlayerSnapshot::default()
            }),
            ..HostSnapshot::default()
        });
        bus.emit(EventPayload::TickPost);
    }

    #[test]
    fn test_samples_on_interval() {
        let (tx, _rx) = action_channel();
        let bus = EventBus::new();
        let registry = ModuleRegistry::new(bus.clone(), tx);
        let id = registry.register(Box::new(PathRecorder::new())).unwrap();
        registry
            .settings(&id)
            .unwrap()
            .set_from_str("interval-ticks", "2")
            .unwrap();
        registry.activate(&id).unwrap();

        at(&bus, 1, 0.0);
        at(&bus, 2, 3.0);
        at(&bus, 3, 5.0);
        at(&bus, 4, 7.0);
        // standing still adds nothing
        at(&bus, 6, 7.0);

        assert_eq!(
            registry.with_module(&id, |r: &PathRecorder| r.points().len()),
            Some(2)
        );
        assert_eq!(registry.with_module(&id, PathRecorder::distance), Some(4.0));
    }
}
