use std::collections::HashMap;

pub mod choices;
pub mod render;
pub mod resolve;
pub mod session;
pub mod tally;

/// Window for rounds with nothing to decide (single choice, not forced).
pub const NO_VOTE_TIME_MILLIS: u64 = 1_000;
/// Window used for every round while fast (demo) mode is on.
pub const FAST_VOTE_TIME_MILLIS: u64 = 3_000;
/// Silent rounds in a row before fast mode re-engages on its own.
pub const NO_VOTE_FAST_MODE_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteType {
    /// The first vote of each run.
    Character,
    MapLong,
    MapShort,
    CardSelectLong,
    CardSelectShort,
    GameOver,
    Other,
    Rest,
    Skip,
}

impl VoteType {
    pub fn all() -> [VoteType; 9] {
        [
            VoteType::Character,
            VoteType::MapLong,
            VoteType::MapShort,
            VoteType::CardSelectLong,
            VoteType::CardSelectShort,
            VoteType::GameOver,
            VoteType::Other,
            VoteType::Rest,
            VoteType::Skip,
        ]
    }

    /// Name this vote type goes by in the admin-tunable options table.
    pub fn option_name(&self) -> &'static str {
        match self {
            VoteType::Character => "character",
            VoteType::MapLong => "map_long",
            VoteType::MapShort => "map_short",
            VoteType::CardSelectLong => "card_select_long",
            VoteType::CardSelectShort => "card_select_short",
            VoteType::GameOver => "game_over",
            VoteType::Other => "other",
            VoteType::Rest => "rest",
            VoteType::Skip => "skip",
        }
    }

    pub fn default_time_millis(&self) -> u64 {
        match self {
            VoteType::Character => 25_000,
            VoteType::MapLong => 30_000,
            VoteType::MapShort => 15_000,
            VoteType::CardSelectLong => 30_000,
            VoteType::CardSelectShort => 20_000,
            VoteType::GameOver => 15_000,
            VoteType::Other => 25_000,
            VoteType::Rest => 1_000,
            VoteType::Skip => 1_000,
        }
    }
}

/// Admin-tunable integers: one voting window per vote type, plus the
/// ascension level appended to character starts. Only known names can be
/// overwritten.
#[derive(Debug, Clone)]
pub struct VoteOptions {
    values: HashMap<String, i64>,
}

impl Default for VoteOptions {
    fn default() -> Self {
        let mut values = HashMap::new();
        values.insert("asc".to_string(), 0);
        for vote_type in VoteType::all() {
            values.insert(
                vote_type.option_name().to_string(),
                vote_type.default_time_millis() as i64,
            );
        }
        Self { values }
    }
}

impl VoteOptions {
    pub fn set(&mut self, name: &str, value: i64) -> bool {
        if self.values.contains_key(name) {
            self.values.insert(name.to_string(), value);
            true
        } else {
            false
        }
    }

    pub fn vote_time_millis(&self, vote_type: VoteType) -> u64 {
        self.values
            .get(vote_type.option_name())
            .map(|&v| v.max(0) as u64)
            .unwrap_or_else(|| vote_type.default_time_millis())
    }

    pub fn ascension(&self) -> i64 {
        self.values.get("asc").copied().unwrap_or(0)
    }
}

/// Adaptive pacing state that survives across rounds. Fast mode starts on so
/// an idle channel keeps the game moving from the first round.
#[derive(Debug, Clone)]
pub struct AdaptiveTiming {
    pub fast_mode: bool,
    pub consecutive_no_votes: u32,
}

impl Default for AdaptiveTiming {
    fn default() -> Self {
        Self {
            fast_mode: true,
            consecutive_no_votes: 0,
        }
    }
}

impl AdaptiveTiming {
    /// A viewer asked for real voting windows.
    pub fn disable_fast_mode(&mut self) {
        self.fast_mode = false;
        self.consecutive_no_votes = 0;
    }
}
