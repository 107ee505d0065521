//! A console stand-in for a game client
//!
//! Each line typed on stdin becomes host input: plain lines are outgoing
//! chat, lines starting with `!` simulate the rest of the host.

use chrono::{DateTime, TimeZone};
use lodestar_events::{
    HostAction, HostSnapshot, KeyCode, KeyboardEvent, Packet, PlayerSnapshot,
};
use lodestar_runner::HostAdapter;

/// Packet id the console uses for simulated movement
const MOVE_PACKET_ID: u32 = 0x11;

pub const CONSOLE_HELP: &str = "\
!recv <text>    receive a chat line from the server
!key <key>      press a key (e.g. F6, r)
!world on|off   enter or leave the world
!move <x> <y> <z>  move the player
!quit           save and exit
anything else is sent as chat";

/// What the console should do after a line
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Print this line
    Print(String),
    Nothing,
    Quit,
}

/// The state a freshly started console host reports
pub fn initial_snapshot() -> HostSnapshot {
    HostSnapshot {
        in_world: true,
        player: Some(PlayerSnapshot {
            name: "Player".to_string(),
            position: [0.0, 64.0, 0.0],
            dimension: "overworld".to_string(),
        }),
        ..HostSnapshot::default()
    }
}

/// Feed one console line to the host
pub fn handle_line(host: &mut HostAdapter, line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Nothing;
    }

    let Some(rest) = line.strip_prefix('!') else {
        return if host.chat_out(line) {
            LineOutcome::Print(format!("<you> {}", line))
        } else {
            LineOutcome::Nothing
        };
    };

    let (verb, argument) = rest.split_once(' ').unwrap_or((rest, ""));
    let argument = argument.trim();
    match verb {
        "quit" | "exit" => LineOutcome::Quit,
        "help" => LineOutcome::Print(CONSOLE_HELP.to_string()),
        "recv" => {
            if host.chat_in(argument) {
                LineOutcome::Print(format!("<server> {}", argument))
            } else {
                LineOutcome::Print("(hidden)".to_string())
            }
        }
        "key" => match KeyCode::parse(argument) {
            Some(key) => {
                host.key_input(KeyboardEvent::key_press(key));
                LineOutcome::Nothing
            }
            None => LineOutcome::Print(format!("'{}' is not a key", argument)),
        },
        "world" => {
            let in_world = match argument {
                "on" => true,
                "off" => false,
                _ => return LineOutcome::Print("usage: !world on|off".to_string()),
            };
            let mut snapshot = current_snapshot(host);
            snapshot.in_world = in_world;
            host.update_snapshot(snapshot);
            LineOutcome::Nothing
        }
        "move" => match parse_position(argument) {
            Some(position) => {
                let mut snapshot = current_snapshot(host);
                if let Some(player) = snapshot.player.as_mut() {
                    player.position = position;
                }
                host.update_snapshot(snapshot);

                let data: Vec<u8> = position.iter().flat_map(|v| v.to_le_bytes()).collect();
                if host.packet_out(Packet::new(MOVE_PACKET_ID, "move", data)) {
                    LineOutcome::Nothing
                } else {
                    LineOutcome::Print("(movement held back)".to_string())
                }
            }
            None => LineOutcome::Print("usage: !move <x> <y> <z>".to_string()),
        },
        other => LineOutcome::Print(format!("unknown console command '!{}', try !help", other)),
    }
}

fn current_snapshot(host: &HostAdapter) -> HostSnapshot {
    HostSnapshot::clone(&host.platform().bus().snapshot())
}

fn parse_position(text: &str) -> Option<[f64; 3]> {
    let mut parts = text.split_whitespace().map(|part| part.parse::<f64>().ok());
    let position = [parts.next()??, parts.next()??, parts.next()??];
    parts.next().is_none().then_some(position)
}

/// One line of console output for a host action
pub fn describe_action<Tz>(action: &HostAction, at: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let time = at.format("%H:%M:%S");
    match action {
        HostAction::SendChat { message } => format!("[{}] <you> {}", time, message),
        HostAction::ShowMessage { message } => format!("[{}] [lodestar] {}", time, message),
        HostAction::SendPacket(packet) => format!(
            "[{}] -> packet {:#04x} '{}' ({} bytes)",
            time,
            packet.id,
            packet.name,
            packet.data.len()
        ),
    }
}
