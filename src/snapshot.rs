use serde::Deserialize;

use crate::error::SnapshotError;

/// One state message from the game-state provider: the legal top-level
/// commands right now, plus the current screen when the game is mid-run.
#[derive(Debug, Clone, Deserialize)]
pub struct StateMessage {
    #[serde(default)]
    pub available_commands: Vec<String>,
    #[serde(default)]
    pub game_state: Option<GameState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameState {
    #[serde(default)]
    pub screen_type: String,
    #[serde(default)]
    pub choice_list: Vec<String>,
    #[serde(default)]
    pub floor: i32,
    #[serde(default)]
    pub relics: Vec<Relic>,
    #[serde(default)]
    pub potions: Vec<Potion>,
    #[serde(default)]
    pub screen_state: Option<ScreenState>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Relic {
    pub name: String,
    #[serde(default)]
    pub counter: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Potion {
    pub name: String,
}

/// Extra per-screen fields. Only the grid card-select screen carries any
/// today.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScreenState {
    #[serde(default)]
    pub num_cards: i32,
    #[serde(default)]
    pub for_purge: bool,
    #[serde(default)]
    pub for_upgrade: bool,
    #[serde(default)]
    pub for_transform: bool,
}

impl StateMessage {
    pub fn parse(raw: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn has_command(&self, command: &str) -> bool {
        self.available_commands.iter().any(|c| c == command)
    }

    /// The `choose` path requires a game state; missing it is the caller's
    /// MalformedSnapshot case.
    pub fn require_game_state(&self) -> Result<&GameState, SnapshotError> {
        self.game_state.as_ref().ok_or(SnapshotError::MissingGameState)
    }
}

impl GameState {
    pub fn has_relic(&self, name: &str) -> bool {
        self.relics.iter().any(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// A relic counts as active while it still has charges left.
    pub fn has_active_relic(&self, name: &str) -> bool {
        self.relics
            .iter()
            .any(|r| r.name.eq_ignore_ascii_case(name) && r.counter > 0)
    }

    pub fn has_potion_named(&self, name: &str) -> bool {
        self.potions.iter().any(|p| p.name.eq_ignore_ascii_case(name))
    }
}
