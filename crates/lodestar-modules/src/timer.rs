use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a timer, unique within one module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

#[derive(Debug, Clone)]
enum Schedule {
    Once { fire_at: u64 },
    Every { interval: u64, next_fire: u64 },
}

#[derive(Debug, Clone)]
struct Timer {
    name: String,
    schedule: Schedule,
}

/// Tick-driven timers of one module
///
/// Time only advances through [`TimerManager::tick`], which the registry calls
/// once per host tick while the module is active.
#[derive(Debug, Default)]
pub struct TimerManager {
    timers: BTreeMap<TimerId, Timer>,
    next_id: u64,
    now: u64,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks counted so far
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Fire once after `delay` ticks (at least one)
    pub fn schedule_timer(&mut self, delay: u64, name: impl Into<String>) -> TimerId {
        let fire_at = self.now + delay.max(1);
        self.insert(name.into(), Schedule::Once { fire_at })
    }

    /// Fire every `interval` ticks (at least one) until cancelled
    pub fn schedule_recurring(&mut self, interval: u64, name: impl Into<String>) -> TimerId {
        let interval = interval.max(1);
        self.insert(
            name.into(),
            Schedule::Every {
                interval,
                next_fire: self.now + interval,
            },
        )
    }

    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    /// Advance one tick and return the timers that fired, oldest first
    pub fn tick(&mut self) -> Vec<(TimerId, String)> {
        self.now += 1;
        let now = self.now;

        let mut fired = Vec::new();
        self.timers.retain(|id, timer| match &mut timer.schedule {
            Schedule::Once { fire_at } => {
                if now >= *fire_at {
                    fired.push((*id, timer.name.clone()));
                    false
                } else {
                    true
                }
            }
            Schedule::Every {
                interval,
                next_fire,
            } => {
                if now >= *next_fire {
                    fired.push((*id, timer.name.clone()));
                    *next_fire = now + *interval;
                }
                true
            }
        });
        fired
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    fn insert(&mut self, name: String, schedule: Schedule) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.insert(id, Timer { name, schedule });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_shot_timer() {
        let mut manager = TimerManager::new();
        let id = manager.schedule_timer(3, "greet");

        assert!(manager.tick().is_empty());
        assert!(manager.tick().is_empty());

        let fired = manager.tick();
        assert_eq!(fired, vec![(id, "greet".to_string())]);

        // removed after firing
        assert_eq!(manager.active_count(), 0);
        assert!(manager.tick().is_empty());
    }

    #[test]
    fn test_zero_delay_fires_next_tick() {
        let mut manager = TimerManager::new();
        manager.schedule_timer(0, "now");
        assert_eq!(manager.tick().len(), 1);
    }

    #[test]
    fn test_recurring_timer() {
        let mut manager = TimerManager::new();
        let id = manager.schedule_recurring(2, "sample");

        let fired: Vec<usize> = (0..6).map(|_| manager.tick().len()).collect();
        assert_eq!(fired, vec![0, 1, 0, 1, 0, 1]);
        assert_eq!(manager.active_count(), 1);

        assert!(manager.cancel_timer(id));
        assert!(!manager.cancel_timer(id));
        assert!(manager.tick().is_empty());
    }

    #[test]
    fn test_fired_in_schedule_order() {
        let mut manager = TimerManager::new();
        let first = manager.schedule_timer(1, "a");
        let second = manager.schedule_timer(1, "b");

        let fired = manager.tick();
        assert_eq!(fired[0].0, first);
        assert_eq!(fired[1].0, second);
    }

    #[test]
    fn test_clear() {
        let mut manager = TimerManager::new();
        manager.schedule_timer(5, "a");
        manager.schedule_recurring(5, "b");
        manager.clear();
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.now(), 0);
    }
}
