use std::collections::HashMap;

/// One round's ballot box: voter name to current vote key. A voter's newest
/// vote replaces their old one; nobody counts twice.
#[derive(Debug, Clone, Default)]
pub struct VoteTally {
    votes_by_user: HashMap<String, String>,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cast(&mut self, voter: &str, vote_key: &str) {
        self.votes_by_user
            .insert(voter.to_string(), vote_key.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.votes_by_user.is_empty()
    }

    pub fn voter_count(&self) -> usize {
        self.votes_by_user.len()
    }

    pub fn count_for(&self, vote_key: &str) -> u32 {
        self.votes_by_user
            .values()
            .filter(|v| v.as_str() == vote_key)
            .count() as u32
    }

    pub fn frequencies(&self) -> HashMap<String, u32> {
        self.votes_by_user
            .values()
            .fold(HashMap::new(), |mut acc, vote_key| {
                *acc.entry(vote_key.clone()).or_insert(0) += 1;
                acc
            })
    }
}
