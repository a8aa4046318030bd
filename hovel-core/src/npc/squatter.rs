//! Random squatter generation.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::{HouseId, NpcDraft, NpcStats};

/// Kind tag for spawned squatters.
pub const SQUATTER_KIND: &str = "squatter";

const FIRST_NAMES: &[&str] = &[
    "Alex", "Jamie", "Taylor", "Morgan", "Casey", "Riley", "Avery", "Quinn", "Jordan", "Dakota",
    "Cameron", "Peyton", "Skyler", "Hayden", "Reese", "Logan", "Remy", "Emerson", "Finley", "Rowan",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas", "Taylor", "Moore",
    "Jackson", "Martin",
];

/// Personality archetypes with their greeting lines.
pub const PERSONALITIES: &[(&str, [&str; 3])] = &[
    (
        "cautious",
        [
            "I don't trust anyone these days...",
            "Keep your distance!",
            "Something doesn't feel right here.",
        ],
    ),
    (
        "aggressive",
        ["Get out of my space!", "I'll fight for what's mine!", "Don't mess with me!"],
    ),
    (
        "friendly",
        ["Hey there, friend!", "How are you doing today?", "Nice to meet you!"],
    ),
    (
        "paranoid",
        ["They're watching us...", "Can't trust anyone anymore.", "Are you one of them?"],
    ),
    (
        "curious",
        [
            "What brings you here?",
            "Have you seen anything interesting?",
            "Tell me about yourself.",
        ],
    ),
    (
        "hostile",
        [
            "This is my territory now!",
            "Leave or face the consequences!",
            "I don't welcome strangers.",
        ],
    ),
    (
        "cooperative",
        [
            "Maybe we can help each other.",
            "Working together is better for everyone.",
            "What can I do to help?",
        ],
    ),
    (
        "shy",
        ["Um... hi...", "I usually keep to myself.", "Not much of a talker..."],
    ),
    (
        "bold",
        [
            "I call this place home now!",
            "Nothing scares me!",
            "I can handle whatever comes.",
        ],
    ),
    (
        "nervous",
        [
            "Are we safe here?",
            "I keep hearing strange sounds...",
            "Something bad is going to happen.",
        ],
    ),
];

/// Where a fresh squatter is found.
#[must_use]
pub fn living_room(house: HouseId) -> String {
    format!("House {house} - living room")
}

/// A greeting line for `personality`, falling back to the cautious lines
/// for unknown archetypes.
pub fn dialogue_for<R: Rng + ?Sized>(personality: &str, rng: &mut R) -> &'static str {
    let lines = PERSONALITIES
        .iter()
        .find(|(name, _)| *name == personality)
        .map_or(&PERSONALITIES[0].1, |(_, lines)| lines);
    lines.choose(rng).copied().unwrap_or(lines[0])
}

/// Roll a random squatter for `house`: random name, archetype, greeting and
/// stats in [0,100].
pub fn random_squatter<R: Rng + ?Sized>(house: HouseId, rng: &mut R) -> NpcDraft {
    let stats = NpcStats::clamped(
        rng.gen_range(0..=100),
        rng.gen_range(0..=100),
        rng.gen_range(0..=100),
        rng.gen_range(0..=100),
        rng.gen_range(0..=100),
    );
    squatter_with_stats(house, stats, rng)
}

/// A squatter with a random name, archetype and greeting but fixed `stats`.
pub fn squatter_with_stats<R: Rng + ?Sized>(house: HouseId, stats: NpcStats, rng: &mut R) -> NpcDraft {
    let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Alex");
    let last = LAST_NAMES.choose(rng).copied().unwrap_or("Smith");
    let personality = PERSONALITIES
        .choose(rng)
        .map_or("cautious", |(name, _)| *name);
    let dialogue = dialogue_for(personality, rng);
    NpcDraft {
        name: format!("{first} {last}"),
        kind: SQUATTER_KIND.to_string(),
        personality: personality.to_string(),
        house: Some(house),
        location: living_room(house),
        dialogue: dialogue.to_string(),
        stats,
    }
}
