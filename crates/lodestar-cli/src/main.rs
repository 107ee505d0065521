use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use lodestar_cli::{LineOutcome, describe_action, handle_line, initial_snapshot};
use lodestar_config::LodestarConfig;
use lodestar_modules::builtin;
use lodestar_runner::logging::init_logging;
use lodestar_runner::{HostAdapter, Platform};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::info;

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enables debug mode
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Config file to use (default: ~/.config/lodestar/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Profile holding active modules, keybinds and settings
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Host ticks per second (overrides config file)
    #[arg(long)]
    tick_rate: Option<u32>,

    /// Also write logs to the data directory
    #[arg(long)]
    log_file: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(LodestarConfig::config_path);
    let mut config = LodestarConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    if cli.log_file {
        config.logging.file = true;
    }
    if let Some(tick_rate) = cli.tick_rate {
        config.host.tick_rate = tick_rate;
    }

    let _guard = init_logging("cli", &config.logging, cli.debug)?;

    let profile = cli
        .profile
        .clone()
        .unwrap_or_else(|| config.modules.profile_path());

    // The platform is !Send, so everything runs on this thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config, profile))
}

async fn run(config: LodestarConfig, profile: PathBuf) -> anyhow::Result<()> {
    let tick_rate = config.host.tick_rate.clamp(1, 1000);
    let prefix = config.commands.prefix.clone();

    let platform = Platform::builder()
        .with_modules(builtin::all())
        .with_config(config)
        .with_profile_path(&profile)
        .build()?;
    let mut actions = platform
        .take_action_receiver()
        .context("host action receiver already taken")?;

    let mut host = HostAdapter::new(platform);
    host.update_snapshot(initial_snapshot());

    info!(target: "host", "Running at {} ticks per second, profile {}", tick_rate, profile.display());
    println!("lodestar ready. Type {}help for commands, !help for console input.", prefix);

    let mut interval = tokio::time::interval(Duration::from_secs(1) / tick_rate);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                host.tick_start();
                host.tick_end();
                host.pre_render(0.0);
                host.post_render();
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match handle_line(&mut host, &line) {
                    LineOutcome::Print(text) => println!("{}", text),
                    LineOutcome::Nothing => {}
                    LineOutcome::Quit => break,
                }
            }
            Some(action) = actions.recv() => {
                println!("{}", describe_action(&action, Local::now()));
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    let ticks = host.tick();
    host.shutdown();
    while let Ok(action) = actions.try_recv() {
        println!("{}", describe_action(&action, Local::now()));
    }
    info!(target: "host", "Stopped after {} tick(s)", ticks);
    Ok(())
}
