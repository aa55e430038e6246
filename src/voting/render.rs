use serde::Serialize;

use crate::voting::choices::ChoiceSet;
use crate::voting::tally::VoteTally;

/// Which decision screen the active vote belongs to. Carries only what an
/// external renderer needs to place the overlay; the engine itself never
/// draws.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ScreenContext {
    Event,
    Map { floor: i32 },
    Shop,
    CardReward,
    CombatReward,
    Rest,
    BossReward,
    Grid { selectable_cards: usize },
    Character,
    Generic,
}

/// One drawable row: a choice, the key to type for it, and its live count.
/// `slot` is the row's position in the choice ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderEntry {
    pub label: String,
    pub vote_key: String,
    pub votes: u32,
    pub slot: usize,
}

/// Everything drawable about the open round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderView {
    pub entries: Vec<RenderEntry>,
    pub seconds_remaining: u64,
    pub screen: ScreenContext,
}

/// Read-only export handed to the renderer: the open round, if any, plus the
/// fast-mode banner flag which shows regardless of session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderSnapshot {
    pub vote: Option<RenderView>,
    pub fast_mode: bool,
}

pub fn build_entries(choices: &ChoiceSet, tally: &VoteTally) -> Vec<RenderEntry> {
    choices
        .choices()
        .iter()
        .enumerate()
        .map(|(slot, choice)| RenderEntry {
            label: choice.label.clone(),
            vote_key: choice.vote_key.clone(),
            votes: tally.count_for(&choice.vote_key),
            slot,
        })
        .collect()
}
