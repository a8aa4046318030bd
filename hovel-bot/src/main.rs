//! `hovel` runs the simulation and answers commands read from stdin.
//!
//! Each input line is `<user-id> <command...>`, e.g. `alice /house status`.
//! Reading stops at EOF or `/quit`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hovel_core::{GameContext, HovelConfig, OwnerId};

const DEFAULT_CONFIG_PATH: &str = "hovel.toml";

fn load_config(path: &Path) -> anyhow::Result<HovelConfig> {
    if path.exists() {
        HovelConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(HovelConfig::default())
    }
}

fn init_tracing(config: &HovelConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = load_config(&path)?;
    init_tracing(&config);
    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
    }

    let ctx = GameContext::open(config).context("opening the store")?;
    ctx.start();
    info!(db = %ctx.config().store.path, "hovel is up");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((user, command)) = line.split_once(char::is_whitespace) else {
            if line == "/quit" {
                break;
            }
            println!("expected `<user-id> <command>`");
            continue;
        };
        let command = command.trim();
        if command == "/quit" {
            break;
        }
        let reply = hovel_bot::handle_line(&ctx, &OwnerId::new(user), command).await;
        println!("{reply}");
    }

    ctx.shutdown();
    Ok(())
}
