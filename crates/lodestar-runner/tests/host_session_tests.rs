use lodestar_events::{
    HostAction, HostSnapshot, KeyCode, KeyboardEvent, Packet, PlayerSnapshot,
};
use lodestar_modules::builtin::{AntiSpam, PathRecorder};
use lodestar_modules::{ModuleRegistry, builtin};
use lodestar_runner::{HostAdapter, Platform};

fn host() -> HostAdapter {
    let platform = Platform::builder()
        .with_modules(builtin::all())
        .build()
        .expect("platform builds");
    HostAdapter::new(platform)
}

fn in_world(x: f64) -> HostSnapshot {
    HostSnapshot {
        in_world: true,
        player: Some(PlayerSnapshot {
            name: "Steve".to_string(),
            position: [x, 64.0, 0.0],
            dimension: "overworld".to_string(),
        }),
        ..HostSnapshot::default()
    }
}

fn run(host: &mut HostAdapter, line: &str) {
    assert!(!host.chat_out(format!(".{line}")), "{line} should be consumed");
}

fn id(registry: &ModuleRegistry, name: &str) -> lodestar_events::ModuleId {
    registry.resolve(name).unwrap()
}

#[test]
fn test_anti_spam_hides_incoming_chat() {
    let mut host = host();
    run(&mut host, "toggle anti-spam");

    assert!(host.chat_in("Alex: anyone up for a build?"));
    assert!(!host.chat_in("Spammer: FREE COINS at example.org"));

    let registry = host.platform().registry();
    let blocked = registry.with_module(&id(registry, "anti-spam"), |m: &AntiSpam| m.blocked());
    assert_eq!(blocked, Some(1));
}

#[test]
fn test_keybind_toggles_freecam_and_blocks_movement() {
    let mut host = host();
    let mut actions = host.platform().take_action_receiver().unwrap();
    host.update_snapshot(in_world(0.0));

    assert!(host.packet_out(Packet::new(0x11, "move", vec![0; 8])));
    host.key_input(KeyboardEvent::key_press(KeyCode::F(6)));
    assert!(!host.packet_out(Packet::new(0x11, "move", vec![0; 8])));
    assert!(host.packet_out(Packet::new(0x03, "chat", b"hi".to_vec())));

    host.key_input(KeyboardEvent::key_press(KeyCode::F(6)));
    assert!(host.packet_out(Packet::new(0x11, "move", vec![0; 8])));

    let shown: Vec<HostAction> = std::iter::from_fn(|| actions.try_recv().ok()).collect();
    assert_eq!(
        shown,
        vec![
            HostAction::ShowMessage {
                message: "Freecam on (speed 1.0)".to_string()
            },
            HostAction::ShowMessage {
                message: "Freecam off".to_string()
            },
        ]
    );
}

#[test]
fn test_auto_greet_replies_after_delay() {
    let mut host = host();
    let mut actions = host.platform().take_action_receiver().unwrap();
    host.update_snapshot(in_world(0.0));
    run(&mut host, "toggle auto-greet");
    run(&mut host, "settings auto-greet delay-ticks 2");
    while actions.try_recv().is_ok() {}

    assert!(host.chat_in("Alex joined the game"));
    host.tick_start();
    host.tick_end();
    assert!(actions.try_recv().is_err());

    host.tick_start();
    assert_eq!(
        actions.try_recv().unwrap(),
        HostAction::SendChat {
            message: "Welcome, Alex!".to_string()
        }
    );
}

#[test]
fn test_hidden_chat_does_not_trigger_greeting() {
    let mut host = host();
    let mut actions = host.platform().take_action_receiver().unwrap();
    host.update_snapshot(in_world(0.0));
    run(&mut host, "toggle anti-spam");
    run(&mut host, "toggle auto-greet");
    run(&mut host, "settings auto-greet delay-ticks 1");
    while actions.try_recv().is_ok() {}

    assert!(!host.chat_in("Bob joined the game, free coins at discord.gg"));
    for _ in 0..3 {
        host.tick_start();
        host.tick_end();
    }
    assert!(actions.try_recv().is_err());

    assert!(host.chat_in("Alex joined the game"));
    host.tick_start();
    host.tick_start();
    assert_eq!(
        actions.try_recv().unwrap(),
        HostAction::SendChat {
            message: "Welcome, Alex!".to_string()
        }
    );
}

#[test]
fn test_remote_handle_applies_on_next_tick() {
    let mut host = host();
    let remote = host.platform().remote();

    let worker = std::thread::spawn(move || {
        remote.activate("path-recorder").unwrap();
        remote.set_setting("path-recorder", "interval-ticks", "1").unwrap();
    });
    worker.join().unwrap();

    let registry = host.platform().registry().clone();
    let recorder = id(&registry, "path-recorder");
    assert!(!registry.is_active(&recorder));

    for x in [1.0, 2.0, 3.0] {
        host.update_snapshot(in_world(x));
        host.tick_start();
        host.tick_end();
    }

    assert!(registry.is_active(&recorder));
    let points = registry.with_module(&recorder, |m: &PathRecorder| m.points().len());
    assert_eq!(points, Some(3));
}

#[test]
fn test_route_hud_needs_recorder() {
    let mut host = host();
    let mut actions = host.platform().take_action_receiver().unwrap();

    run(&mut host, "toggle route-hud");
    let HostAction::ShowMessage { message } = actions.try_recv().unwrap() else {
        panic!("expected an error message");
    };
    assert!(message.contains("requires world/path-recorder"), "{message}");

    run(&mut host, "toggle path-recorder");
    run(&mut host, "toggle route-hud");
    run(&mut host, "toggle path-recorder");

    let registry = host.platform().registry();
    assert!(registry.active_modules().is_empty());
}

#[test]
fn test_session_round_trip_through_profile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.toml");

    let platform = Platform::builder()
        .with_modules(builtin::all())
        .with_profile_path(&path)
        .build()
        .unwrap();
    let mut host = HostAdapter::new(platform);
    run(&mut host, "toggle chat-logger");
    run(&mut host, "bind chat-logger L");
    run(&mut host, "settings anti-spam blocked-words casino, giveaway");
    host.shutdown();

    let platform = Platform::builder()
        .with_modules(builtin::all())
        .with_profile_path(&path)
        .build()
        .unwrap();
    let registry = platform.registry();
    let logger = id(registry, "chat-logger");
    assert_eq!(registry.active_modules(), vec![logger.clone()]);
    assert_eq!(registry.keybind(&logger), Some(KeyCode::Char('l')));

    let words = registry
        .settings(&id(registry, "anti-spam"))
        .unwrap()
        .get("blocked-words")
        .unwrap()
        .value_string();
    assert_eq!(words, "casino, giveaway");
}
