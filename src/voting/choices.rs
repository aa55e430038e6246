use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::snapshot::GameState;
use crate::voting::VoteType;
use crate::voting::render::ScreenContext;

/// Relic that shatters potions on pickup; while held, potion rewards are
/// never takeable.
const POTION_DESTROYER_RELIC: &str = "sozu";
/// Relic whose remaining charges let the crowd route past the forced
/// pre-boss rest floors.
const REST_BYPASS_RELIC: &str = "wing boots";
const EMPTY_POTION_SLOT: &str = "potion slot";

/// First floor of each act; map votes there get the long window.
const FIRST_FLOOR_NUMS: [i32; 3] = [0, 17, 34];
/// Pre-boss floors where the rest site is the only sensible move.
const NO_OPT_REST_FLOORS: [i32; 3] = [14, 31, 48];

/// Potion display names that don't contain the word "potion".
const POTION_NAMES: [&str; 14] = [
    "distilled chaos",
    "entropic brew",
    "smoke bomb",
    "snecko oil",
    "liquid memories",
    "essence of steel",
    "liquid bronze",
    "ambrosia",
    "bottled miracle",
    "ghost in a jar",
    "heart of iron",
    "essence of darkness",
    "blessing of the forge",
    "fruit juice",
];

/// One thing the crowd can vote for. `commands` is what the winning choice
/// sends to the game, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub label: String,
    pub vote_key: String,
    pub commands: Vec<String>,
}

impl Choice {
    pub fn new(label: impl Into<String>, vote_key: impl Into<String>, commands: &[&str]) -> Self {
        Self {
            label: label.into(),
            vote_key: vote_key.into(),
            commands: commands.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// The candidates of one round, with a case-folded key index for cast-time
/// validation. Built fresh every round.
#[derive(Debug, Clone, Default)]
pub struct ChoiceSet {
    choices: Vec<Choice>,
    key_index: HashMap<String, usize>,
}

impl ChoiceSet {
    pub fn new(choices: Vec<Choice>) -> Self {
        let key_index = choices
            .iter()
            .enumerate()
            .map(|(index, choice)| (choice.vote_key.to_lowercase(), index))
            .collect();
        Self { choices, key_index }
    }

    /// The fallback set substituted whenever a round would otherwise open
    /// with nothing to vote on.
    pub fn proceed_only() -> Self {
        Self::new(vec![Choice::new("proceed", "proceed", &["proceed"])])
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    pub fn get(&self, vote_key: &str) -> Option<&Choice> {
        self.key_index
            .get(&vote_key.to_lowercase())
            .map(|&index| &self.choices[index])
    }

    pub fn contains_key(&self, vote_key: &str) -> bool {
        self.key_index.contains_key(&vote_key.to_lowercase())
    }
}

/// Builder output: the viable candidates plus how long and where to show
/// them.
#[derive(Debug, Clone)]
pub struct BuiltVote {
    pub choices: ChoiceSet,
    pub vote_type: VoteType,
    pub screen: ScreenContext,
}

/// Derive the round's candidates from a `choose` game state. Pure; the raw
/// pre-filter list never leaves this function.
pub fn build_choose_vote(state: &GameState) -> BuiltVote {
    let raw: Vec<Choice> = state
        .choice_list
        .iter()
        .enumerate()
        .map(|(index, label)| Choice {
            label: label.clone(),
            // Commands are 0-based, the keys voters type start at 1.
            vote_key: (index + 1).to_string(),
            commands: vec![format!("choose {index}")],
        })
        .collect();

    let can_take_potion = state.has_potion_named(EMPTY_POTION_SLOT)
        && !state.has_relic(POTION_DESTROYER_RELIC);
    let mut viable: Vec<Choice> = raw
        .into_iter()
        .filter(|choice| can_take_potion || !is_potion_choice(&choice.label))
        .collect();

    let mut vote_type = VoteType::Other;
    let screen = match state.screen_type.to_ascii_uppercase().as_str() {
        "EVENT" => ScreenContext::Event,
        "MAP" => {
            vote_type = map_vote_type(state);
            ScreenContext::Map { floor: state.floor }
        }
        "SHOP" | "SHOP_SCREEN" => {
            viable.push(Choice::new("leave", "0", &["leave", "proceed"]));
            ScreenContext::Shop
        }
        "CARD_REWARD" => {
            vote_type = if state.floor == 1 {
                VoteType::CardSelectLong
            } else {
                VoteType::CardSelectShort
            };
            viable.push(Choice::new("Skip", "0", &["skip", "proceed"]));
            ScreenContext::CardReward
        }
        "COMBAT_REWARD" => {
            viable = collapse_combat_reward(viable);
            ScreenContext::CombatReward
        }
        "REST" => ScreenContext::Rest,
        "BOSS_REWARD" => ScreenContext::BossReward,
        "GRID" => {
            let selectable_cards = grid_selectable_cards(state);
            if should_dedupe_grid(state) {
                viable = dedupe_by_label(viable);
            }
            ScreenContext::Grid { selectable_cards }
        }
        other => {
            tracing::warn!(screen_type = %other, "Starting generic vote for unknown screen");
            ScreenContext::Generic
        }
    };

    BuiltVote {
        choices: ChoiceSet::new(viable),
        vote_type,
        screen,
    }
}

fn map_vote_type(state: &GameState) -> VoteType {
    if FIRST_FLOOR_NUMS.contains(&state.floor) {
        VoteType::MapLong
    } else if NO_OPT_REST_FLOORS.contains(&state.floor)
        && !state.has_active_relic(REST_BYPASS_RELIC)
    {
        VoteType::Skip
    } else {
        VoteType::MapShort
    }
}

/// Combat rewards are taken in a fixed priority order rather than voted on
/// piecemeal: gold, then potion, then relic (unless a sapphire key shares the
/// screen), then stolen gold, then emerald key. No match leaves the full set.
fn collapse_combat_reward(choices: Vec<Choice>) -> Vec<Choice> {
    let find = |label: &str| choices.iter().find(|c| c.label == label).cloned();

    if let Some(gold) = find("gold") {
        return vec![gold];
    }
    if let Some(potion) = find("potion") {
        return vec![potion];
    }
    if let Some(relic) = find("relic")
        && find("sapphire_key").is_none()
    {
        return vec![relic];
    }
    if let Some(stolen_gold) = find("stolen_gold") {
        return vec![stolen_gold];
    }
    if let Some(emerald_key) = find("emerald_key") {
        return vec![emerald_key];
    }
    choices
}

fn grid_selectable_cards(state: &GameState) -> usize {
    state
        .screen_state
        .as_ref()
        .map(|s| s.num_cards.max(0) as usize)
        .unwrap_or(0)
}

/// Grid purge/upgrade/transform picks with a single selectable card offer
/// identical copies as separate rows; voting over duplicates is noise.
fn should_dedupe_grid(state: &GameState) -> bool {
    let Some(screen) = state.screen_state.as_ref() else {
        return false;
    };
    screen.num_cards == 1 && (screen.for_purge || screen.for_upgrade || screen.for_transform)
}

fn dedupe_by_label(choices: Vec<Choice>) -> Vec<Choice> {
    let mut seen = HashSet::new();
    let mut deduped: Vec<Choice> = choices
        .into_iter()
        .filter(|choice| seen.insert(choice.label.clone()))
        .collect();
    for (index, choice) in deduped.iter_mut().enumerate() {
        choice.vote_key = (index + 1).to_string();
    }
    deduped
}

fn is_potion_choice(label: &str) -> bool {
    let lowered = label.to_lowercase();
    POTION_NAMES.contains(&lowered.as_str()) || lowered.contains("potion")
}
