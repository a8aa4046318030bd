//! # hovel-bot: Command Surface for Hovel
//!
//! Text stand-in for the chat platform's slash commands. A line such as
//! `/house repair 15` is parsed into a [`Command`], run against a
//! [`GameContext`] on behalf of one user, and answered with a short
//! human-readable reply.
//!
//! User-facing failures (unknown house, cooldowns, short on parts) are
//! rendered as replies. Store and configuration failures are logged and
//! answered with a generic line.

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]

use std::fmt::Write as _;

use chrono::Utc;
use tracing::{debug, error};

use hovel_core::faction::{Faction, ResourceDelta};
use hovel_core::myth::{Myth, MythStatus};
use hovel_core::radio::Station;
use hovel_core::{GameContext, House, HovelError, MythId, Npc, OwnerId, Result};

/// Shown for internal failures.
pub const GENERIC_FAILURE: &str = "Something went wrong on our end. Try again in a bit.";

const HELP: &str = "\
/house init [name] | status | repair [amount]
/npc spawn [settled] | list
/faction create <name> | join <name> | leave | info [name] | list | give <resource> <amount>
/radio create <name> | info | broadcast <message> | upgrade | signal | list
/myth discover <location> | <phenomenon> [| <report>] | investigate [id] | progress <id> | solve <id>
/tick";

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List the commands.
    Help,
    /// Create (or fetch) the caller's house.
    HouseInit {
        /// Display name; defaults to the user id.
        name: Option<String>,
    },
    /// Show the caller's house.
    HouseStatus,
    /// Patch up the caller's house.
    HouseRepair {
        /// Integrity to add; defaults to `house.default_repair_amount`.
        amount: Option<i64>,
    },
    /// Let a squatter into the caller's house.
    NpcSpawn {
        /// Start from the configured default stats instead of rolled ones.
        settled: bool,
    },
    /// List squatters in the caller's house.
    NpcList,
    /// Found a faction.
    FactionCreate(String),
    /// Join a faction by name.
    FactionJoin(String),
    /// Leave the caller's faction.
    FactionLeave,
    /// Show a faction (the caller's own without a name).
    FactionInfo(Option<String>),
    /// List factions.
    FactionList,
    /// Contribute to the caller's faction.
    FactionGive {
        /// `food`, `materials`, `currency` or `energy`.
        resource: String,
        /// Amount to add.
        amount: i64,
    },
    /// Set up a radio station.
    RadioCreate(String),
    /// Show the caller's station.
    RadioInfo,
    /// Broadcast on the caller's station.
    RadioBroadcast(String),
    /// Upgrade the caller's equipment.
    RadioUpgrade,
    /// Improve the caller's signal.
    RadioSignal,
    /// List stations.
    RadioList,
    /// Report a new myth.
    MythDiscover {
        /// Where it was seen.
        location: String,
        /// What was seen.
        phenomenon: String,
        /// Witness account.
        report: String,
    },
    /// Investigate a myth (a random open one without an id).
    MythInvestigate(Option<MythId>),
    /// Show a myth's progress.
    MythProgress(MythId),
    /// Close a myth.
    MythSolve(MythId),
    /// Run one tick now.
    Tick,
}

fn invalid(message: impl Into<String>) -> HovelError {
    HovelError::InvalidInput(message.into())
}

fn parse_int(raw: &str, what: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| invalid(format!("{what} must be a whole number, got `{raw}`")))
}

fn parse_myth_id(raw: Option<&str>) -> Result<MythId> {
    let raw = raw.ok_or_else(|| invalid("which myth? give its id"))?;
    parse_int(raw.trim_start_matches('#'), "myth id").map(MythId)
}

fn required(rest: &str, what: &str) -> Result<String> {
    let rest = rest.trim();
    if rest.is_empty() {
        Err(invalid(format!("missing {what}")))
    } else {
        Ok(rest.to_string())
    }
}

impl Command {
    /// Parse one command line.
    ///
    /// # Errors
    /// `InvalidInput` describing what is wrong with the line.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let body = line
            .strip_prefix('/')
            .ok_or_else(|| invalid("commands start with `/`, try /help"))?;
        let (group, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
        let rest = rest.trim();
        let (action, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let args = args.trim();

        let command = match (group, action) {
            ("help", _) => Self::Help,
            ("tick", _) => Self::Tick,

            ("house", "init") => Self::HouseInit {
                name: (!args.is_empty()).then(|| args.to_string()),
            },
            ("house", "status" | "") => Self::HouseStatus,
            ("house", "repair") => Self::HouseRepair {
                amount: match args {
                    "" => None,
                    raw => Some(parse_int(raw, "repair amount")?),
                },
            },

            ("npc", "spawn") => Self::NpcSpawn {
                settled: match args {
                    "" => false,
                    "settled" => true,
                    _ => return Err(invalid("usage: /npc spawn [settled]")),
                },
            },
            ("npc", "list" | "") => Self::NpcList,

            ("faction", "create") => Self::FactionCreate(required(args, "faction name")?),
            ("faction", "join") => Self::FactionJoin(required(args, "faction name")?),
            ("faction", "leave") => Self::FactionLeave,
            ("faction", "info") => Self::FactionInfo((!args.is_empty()).then(|| args.to_string())),
            ("faction", "list" | "") => Self::FactionList,
            ("faction", "give") => {
                let mut parts = args.split_whitespace();
                let (Some(resource), Some(amount), None) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(invalid("usage: /faction give <resource> <amount>"));
                };
                Self::FactionGive {
                    resource: resource.to_lowercase(),
                    amount: parse_int(amount, "amount")?,
                }
            }

            ("radio", "create") => Self::RadioCreate(required(args, "station name")?),
            ("radio", "info") => Self::RadioInfo,
            ("radio", "broadcast") => Self::RadioBroadcast(required(args, "message")?),
            ("radio", "upgrade") => Self::RadioUpgrade,
            ("radio", "signal") => Self::RadioSignal,
            ("radio", "list" | "") => Self::RadioList,

            ("myth", "discover") => {
                let mut fields = args.split('|').map(str::trim);
                let location = fields.next().unwrap_or_default().to_string();
                let phenomenon = fields.next().unwrap_or_default().to_string();
                if location.is_empty() || phenomenon.is_empty() {
                    return Err(invalid(
                        "usage: /myth discover <location> | <phenomenon> [| <report>]",
                    ));
                }
                let report = fields.next().unwrap_or_default().to_string();
                Self::MythDiscover {
                    location,
                    phenomenon,
                    report,
                }
            }
            ("myth", "investigate") => Self::MythInvestigate(match args {
                "" => None,
                raw => Some(parse_myth_id(Some(raw))?),
            }),
            ("myth", "progress") => Self::MythProgress(parse_myth_id(args.split_whitespace().next())?),
            ("myth", "solve") => Self::MythSolve(parse_myth_id(args.split_whitespace().next())?),

            _ => return Err(invalid(format!("unknown command `{line}`, try /help"))),
        };
        Ok(command)
    }
}

/// Parse and run `line` for `user`, returning the reply text.
pub async fn handle_line(ctx: &GameContext, user: &OwnerId, line: &str) -> String {
    let outcome = match Command::parse(line) {
        Ok(command) => {
            debug!(user = %user, ?command, "command");
            execute(ctx, user, command).await
        }
        Err(e) => Err(e),
    };
    outcome.unwrap_or_else(|e| render_error(user, &e))
}

/// Reply text for a failed command.
#[must_use]
pub fn render_error(user: &OwnerId, err: &HovelError) -> String {
    if err.is_user_facing() {
        err.to_string()
    } else {
        error!(user = %user, error = %err, "command failed");
        GENERIC_FAILURE.to_string()
    }
}

/// Run a parsed command.
///
/// # Errors
/// Whatever the subsystem returns; callers render it with [`render_error`].
pub async fn execute(ctx: &GameContext, user: &OwnerId, command: Command) -> Result<String> {
    match command {
        Command::Help => Ok(HELP.to_string()),
        Command::Tick => {
            let outcomes = ctx.tick().await;
            let mut reply = String::from("Tick!");
            for outcome in outcomes {
                match outcome.result {
                    Ok(report) => {
                        let _ = write!(
                            reply,
                            "\n{}: {} processed, {} failed",
                            outcome.name, report.processed, report.failed
                        );
                    }
                    Err(reason) => {
                        error!(handler = %outcome.name, reason = %reason, "tick handler failed");
                        let _ = write!(reply, "\n{}: failed", outcome.name);
                    }
                }
            }
            Ok(reply)
        }

        Command::HouseInit { name } => {
            let display = name.unwrap_or_else(|| user.to_string());
            let house = ctx.houses().initialize_house(user, &display).await?;
            Ok(format!("Welcome home.\n{}", render_house(&house)))
        }
        Command::HouseStatus => {
            let house = require_house(ctx, user).await?;
            Ok(render_house(&house))
        }
        Command::HouseRepair { amount } => {
            let amount = amount.unwrap_or(i64::from(ctx.config().house.default_repair_amount));
            let outcome = ctx.houses().repair(user, amount).await?;
            Ok(outcome.message)
        }

        Command::NpcSpawn { settled } => {
            let house = require_house(ctx, user).await?;
            let npc = if settled {
                ctx.npcs().spawn_settled(house.id).await?
            } else {
                ctx.npcs().spawn(house.id).await?
            };
            Ok(format!(
                "{} ({}) moved into {}.\n\"{}\"",
                npc.name, npc.personality, house.name, npc.dialogue
            ))
        }
        Command::NpcList => {
            let house = require_house(ctx, user).await?;
            let npcs = ctx.npcs().list_by_house(house.id).await?;
            if npcs.is_empty() {
                return Ok(format!("Nobody is squatting in {}. Yet.", house.name));
            }
            let lines: Vec<String> = npcs.iter().map(render_npc).collect();
            Ok(format!("Squatters in {}:\n{}", house.name, lines.join("\n")))
        }

        Command::FactionCreate(name) => {
            let faction = ctx.factions().create(&name, user).await?;
            Ok(format!("Founded {}.\n{}", faction.name, render_faction(&faction)))
        }
        Command::FactionJoin(name) => {
            let target = ctx
                .factions()
                .get_by_name(&name)
                .await?
                .ok_or_else(|| HovelError::not_found("faction", &name))?;
            let faction = ctx.factions().join(user, target.id).await?;
            Ok(format!("You joined {} ({} members).", faction.name, faction.member_count()))
        }
        Command::FactionLeave => {
            let faction = ctx.factions().leave(user).await?;
            Ok(format!("You left {}.", faction.name))
        }
        Command::FactionInfo(name) => {
            let faction = match name {
                Some(name) => ctx
                    .factions()
                    .get_by_name(&name)
                    .await?
                    .ok_or_else(|| HovelError::not_found("faction", &name))?,
                None => ctx
                    .factions()
                    .faction_of(user)
                    .await?
                    .ok_or_else(|| HovelError::not_found("faction membership", user))?,
            };
            Ok(render_faction(&faction))
        }
        Command::FactionList => {
            let factions = ctx.factions().list().await?;
            if factions.is_empty() {
                return Ok("No factions yet. Start one with /faction create <name>.".into());
            }
            let lines: Vec<String> = factions
                .iter()
                .map(|f| format!("{} - {} members, power {}", f.name, f.member_count(), f.power_level))
                .collect();
            Ok(lines.join("\n"))
        }
        Command::FactionGive { resource, amount } => {
            let delta = resource_delta(&resource, amount)?;
            let own = ctx
                .factions()
                .faction_of(user)
                .await?
                .ok_or_else(|| HovelError::not_found("faction membership", user))?;
            let faction = ctx.factions().add_resources(own.id, delta).await?;
            Ok(format!("Gave {amount} {resource} to {}.\n{}", faction.name, render_faction(&faction)))
        }

        Command::RadioCreate(name) => {
            let station = ctx.radio().create(user, user.as_str(), &name).await?;
            Ok(format!("{} is on the air.\n{}", station.name, render_station(&station)))
        }
        Command::RadioInfo => {
            let station = ctx
                .radio()
                .get_by_owner(user)
                .await?
                .ok_or_else(|| invalid("you don't have a station yet, try /radio create <name>"))?;
            let state = if station.is_active { "on the air" } else { "off the air" };
            Ok(format!(
                "{} ({state}, run by {})
{}",
                station.name,
                station.owner_name,
                render_station(&station)
            ))
        }
        Command::RadioBroadcast(message) => {
            let outcome = ctx.radio().broadcast(user, &message, Utc::now()).await?;
            let mut reply = format!(
                "{} broadcast: \"{message}\"\n+{} listeners ({} total)",
                outcome.station.name, outcome.listener_gain, outcome.station.listeners
            );
            if outcome.signal_gain > 0 {
                let _ = write!(reply, "\nSignal improved by {}!", outcome.signal_gain);
            }
            Ok(reply)
        }
        Command::RadioUpgrade => {
            let station = ctx.radio().upgrade_equipment(user).await?;
            Ok(format!("Equipment upgraded.\n{}", render_station(&station)))
        }
        Command::RadioSignal => {
            let station = ctx.radio().improve_signal(user).await?;
            Ok(format!("Signal boosted.\n{}", render_station(&station)))
        }
        Command::RadioList => {
            let stations = ctx.radio().list().await?;
            if stations.is_empty() {
                return Ok("Dead air. Nobody is broadcasting.".into());
            }
            let lines: Vec<String> = stations
                .iter()
                .map(|s| format!("{} ({}) - {} listeners", s.name, s.owner_name, s.listeners))
                .collect();
            Ok(lines.join("\n"))
        }

        Command::MythDiscover {
            location,
            phenomenon,
            report,
        } => {
            let myth = ctx.myths().report(&location, &phenomenon, &report).await?;
            Ok(format!("New myth logged.\n{}", render_myth(&myth)))
        }
        Command::MythInvestigate(id) => {
            let id = match id {
                Some(id) => id,
                None => {
                    ctx.myths()
                        .random_active()
                        .await?
                        .ok_or_else(|| invalid("no open myths to investigate"))?
                        .id
                }
            };
            let found = ctx.myths().investigate_rolled(id).await?;
            let mut reply = format!(
                "You poke around {}. +{}% progress, +{} clues.\n{}",
                found.myth.location,
                found.progress_gain,
                found.clue_gain,
                render_myth(&found.myth)
            );
            if found.solved_now {
                reply.push_str("\nCase closed!");
            }
            Ok(reply)
        }
        Command::MythProgress(id) => {
            let myth = ctx
                .myths()
                .get(id)
                .await?
                .ok_or_else(|| HovelError::not_found("myth", id))?;
            Ok(render_myth(&myth))
        }
        Command::MythSolve(id) => {
            let myth = ctx.myths().mark_solved(id).await?;
            Ok(format!("Myth #{} closed.\n{}", myth.id, render_myth(&myth)))
        }
    }
}

async fn require_house(ctx: &GameContext, user: &OwnerId) -> Result<House> {
    ctx.houses()
        .get_snapshot(user)
        .await?
        .ok_or_else(|| invalid("you don't have a house yet, try /house init"))
}

fn resource_delta(resource: &str, amount: i64) -> Result<ResourceDelta> {
    let mut delta = ResourceDelta::default();
    match resource {
        "food" => delta.food = amount,
        "materials" => delta.materials = amount,
        "currency" => delta.currency = amount,
        "energy" => delta.energy = amount,
        other => {
            return Err(invalid(format!(
                "unknown resource `{other}`, pick food, materials, currency or energy"
            )));
        }
    }
    Ok(delta)
}

fn render_house(house: &House) -> String {
    let s = &house.stats;
    format!(
        "{}\nintegrity {} | heat {} | food {} | water {} | noise {} | power {}",
        house.name, s.integrity, s.heat, s.food, s.water, s.noise, s.power
    )
}

fn render_npc(npc: &Npc) -> String {
    let s = &npc.stats;
    format!(
        "#{} {} ({}) hunger {} energy {} paranoia {} trust {} aggression {}",
        npc.id, npc.name, npc.personality, s.hunger, s.energy, s.paranoia, s.trust, s.aggression
    )
}

fn render_faction(faction: &Faction) -> String {
    let r = &faction.resources;
    let territory = if faction.territory.is_empty() {
        "none"
    } else {
        faction.territory.as_str()
    };
    format!(
        "{} led by {}\nmembers {} | power {} | territory {}\nfood {} | materials {} | currency {} | energy {}",
        faction.name,
        faction.leader,
        faction.member_count(),
        faction.power_level,
        territory,
        r.food,
        r.materials,
        r.currency,
        r.energy
    )
}

fn render_station(station: &Station) -> String {
    format!(
        "signal {} | equipment lvl {} | listeners {} | power {} | parts {}",
        station.signal_strength, station.equipment_level, station.listeners, station.power, station.parts
    )
}

fn render_myth(myth: &Myth) -> String {
    let status = match myth.status {
        MythStatus::Active => "open",
        MythStatus::Solved => "solved",
    };
    format!(
        "#{} {} at {} [{status}] progress {}% | clues {}",
        myth.id, myth.phenomenon, myth.location, myth.progress, myth.clues_found
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hovel_core::store::MythStore;
    use hovel_core::{HovelConfig, NpcStats, SqliteStore};

    use super::*;

    fn context() -> GameContext {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        GameContext::new(HovelConfig::default(), store)
    }

    fn alice() -> OwnerId {
        OwnerId::new("alice")
    }

    #[test]
    fn parses_house_commands() {
        assert_eq!(
            Command::parse("/house init The Shack").expect("parse"),
            Command::HouseInit {
                name: Some("The Shack".into())
            }
        );
        assert_eq!(Command::parse("/house").expect("parse"), Command::HouseStatus);
        assert_eq!(
            Command::parse("  /house repair 15 ").expect("parse"),
            Command::HouseRepair { amount: Some(15) }
        );
        assert_eq!(
            Command::parse("/house repair").expect("parse"),
            Command::HouseRepair { amount: None }
        );
    }

    #[test]
    fn parses_myth_discovery_fields() {
        let command = Command::parse("/myth discover the depot | humming lights | saw it twice").expect("parse");
        assert_eq!(
            command,
            Command::MythDiscover {
                location: "the depot".into(),
                phenomenon: "humming lights".into(),
                report: "saw it twice".into(),
            }
        );
        assert_eq!(
            Command::parse("/myth progress #4").expect("parse"),
            Command::MythProgress(MythId(4))
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(Command::parse("house status").is_err());
        assert!(Command::parse("/house repair lots").is_err());
        assert!(Command::parse("/faction give food").is_err());
        assert!(Command::parse("/myth discover nowhere").is_err());
        assert!(Command::parse("/dance").is_err());
    }

    #[tokio::test]
    async fn house_flow() {
        let ctx = context();
        let reply = handle_line(&ctx, &alice(), "/house status").await;
        assert!(reply.contains("/house init"), "{reply}");

        let reply = handle_line(&ctx, &alice(), "/house init Alice").await;
        assert!(reply.contains("House of Alice"), "{reply}");
        assert!(reply.contains("integrity 100"), "{reply}");

        ctx.tick().await;
        let reply = handle_line(&ctx, &alice(), "/house repair").await;
        assert!(reply.contains("100"), "{reply}");
        let reply = handle_line(&ctx, &alice(), "/house repair 0").await;
        assert!(reply.contains("must be positive"), "{reply}");
    }

    #[tokio::test]
    async fn tick_reports_each_handler() {
        let ctx = context();
        ctx.start();
        handle_line(&ctx, &alice(), "/house init").await;
        let reply = handle_line(&ctx, &alice(), "/tick").await;
        assert!(reply.contains("house-decay: 1 processed, 0 failed"), "{reply}");
        assert!(reply.contains("npc-behaviour"), "{reply}");
        ctx.shutdown();
    }

    #[tokio::test]
    async fn squatters_need_a_house() {
        let ctx = context();
        let reply = handle_line(&ctx, &alice(), "/npc spawn").await;
        assert!(reply.contains("/house init"), "{reply}");

        handle_line(&ctx, &alice(), "/house init").await;
        let reply = handle_line(&ctx, &alice(), "/npc spawn").await;
        assert!(reply.contains("moved into"), "{reply}");
        let reply = handle_line(&ctx, &alice(), "/npc list").await;
        assert!(reply.starts_with("Squatters in"), "{reply}");
    }

    #[tokio::test]
    async fn settled_squatter_starts_from_default_stats() {
        assert!(Command::parse("/npc spawn loudly").is_err());
        let mut config = HovelConfig::default();
        config.npc.default_stats = NpcStats::clamped(12, 34, 56, 78, 9);
        let ctx = GameContext::new(config, Arc::new(SqliteStore::open_in_memory().expect("open")));
        handle_line(&ctx, &alice(), "/house init").await;

        let reply = handle_line(&ctx, &alice(), "/npc spawn settled").await;
        assert!(reply.contains("moved into"), "{reply}");
        let house = ctx.houses().get_snapshot(&alice()).await.expect("get").expect("Some");
        let npcs = ctx.npcs().list_by_house(house.id).await.expect("list");
        assert_eq!(npcs.len(), 1);
        assert_eq!(npcs[0].stats, NpcStats::clamped(12, 34, 56, 78, 9));
    }

    #[tokio::test]
    async fn faction_flow() {
        let ctx = context();
        let bob = OwnerId::new("bob");
        let reply = handle_line(&ctx, &alice(), "/faction create Rust Rats").await;
        assert!(reply.starts_with("Founded Rust Rats"), "{reply}");

        let reply = handle_line(&ctx, &bob, "/faction join Rust Rats").await;
        assert!(reply.contains("2 members"), "{reply}");
        let reply = handle_line(&ctx, &bob, "/faction give food 25").await;
        assert!(reply.contains("food 125"), "{reply}");
        let reply = handle_line(&ctx, &bob, "/faction give food -5").await;
        assert!(reply.contains("must not be negative"), "{reply}");
        let reply = handle_line(&ctx, &bob, "/faction give gold 5").await;
        assert!(reply.contains("unknown resource"), "{reply}");

        let reply = handle_line(&ctx, &bob, "/faction leave").await;
        assert_eq!(reply, "You left Rust Rats.");
        let reply = handle_line(&ctx, &bob, "/faction info").await;
        assert!(reply.contains("not found"), "{reply}");
    }

    #[tokio::test]
    async fn radio_cooldown_is_reported() {
        let ctx = context();
        handle_line(&ctx, &alice(), "/radio create Static FM").await;
        let first = handle_line(&ctx, &alice(), "/radio broadcast hello wasteland").await;
        assert!(first.contains("listeners"), "{first}");
        let second = handle_line(&ctx, &alice(), "/radio broadcast again").await;
        assert!(second.starts_with("On cooldown"), "{second}");
    }

    #[tokio::test]
    async fn myth_flow() {
        let ctx = context();
        let reply = handle_line(&ctx, &alice(), "/myth investigate").await;
        assert!(reply.contains("no open myths"), "{reply}");

        let reply = handle_line(&ctx, &alice(), "/myth discover the depot | humming lights").await;
        assert!(reply.contains("#1 humming lights"), "{reply}");
        let reply = handle_line(&ctx, &alice(), "/myth investigate 1").await;
        assert!(reply.contains("progress"), "{reply}");
        let reply = handle_line(&ctx, &alice(), "/myth solve 1").await;
        assert!(reply.contains("more needed"), "{reply}");
        let reply = handle_line(&ctx, &alice(), "/myth progress 1").await;
        assert!(reply.contains("[open]"), "{reply}");

        // Rolled gains are at least 10%, so ten rounds always close it.
        let mut closed = false;
        for _ in 0..10 {
            let reply = handle_line(&ctx, &alice(), "/myth investigate 1").await;
            if reply.contains("Case closed!") {
                closed = true;
                break;
            }
        }
        assert!(closed);
        let reply = handle_line(&ctx, &alice(), "/myth solve 1").await;
        assert!(reply.contains("already been solved"), "{reply}");
        let reply = handle_line(&ctx, &alice(), "/myth investigate 1").await;
        assert!(reply.contains("already solved"), "{reply}");
    }

    #[tokio::test]
    async fn myth_solve_closes_a_fully_investigated_myth() {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let ctx = GameContext::new(HovelConfig::default(), store.clone());
        handle_line(&ctx, &alice(), "/myth discover the depot | humming lights").await;
        // Full progress recorded under a stricter threshold, still open.
        assert!(store.advance_myth(MythId(1), 100, 3, 150).await.expect("advance"));

        let reply = handle_line(&ctx, &alice(), "/myth solve 1").await;
        assert!(reply.starts_with("Myth #1 closed."), "{reply}");
        assert!(reply.contains("[solved] progress 100%"), "{reply}");
    }

    #[tokio::test]
    async fn radio_info_shows_own_station() {
        let ctx = context();
        let reply = handle_line(&ctx, &alice(), "/radio info").await;
        assert!(reply.contains("/radio create"), "{reply}");

        handle_line(&ctx, &alice(), "/radio create Static FM").await;
        handle_line(&ctx, &OwnerId::new("bob"), "/radio create Night Owl").await;
        let reply = handle_line(&ctx, &alice(), "/radio info").await;
        assert!(reply.starts_with("Static FM (on the air, run by alice)"), "{reply}");
        assert!(reply.contains("equipment lvl 1"), "{reply}");
        assert!(!reply.contains("Night Owl"), "{reply}");
    }

    #[test]
    fn internal_errors_stay_generic() {
        let reply = render_error(&alice(), &HovelError::Store("disk full".into()));
        assert_eq!(reply, GENERIC_FAILURE);
        let reply = render_error(&alice(), &HovelError::not_found("house", "alice"));
        assert_eq!(reply, "house not found: alice");
    }
}
