use rand::Rng;
use rand::seq::SliceRandom;

use crate::voting::choices::{Choice, ChoiceSet};
use crate::voting::tally::VoteTally;
use crate::voting::{AdaptiveTiming, NO_VOTE_FAST_MODE_THRESHOLD};

/// Close a round: plurality winner, uniform random among the full tie set,
/// uniform random over everything when nobody voted. Also advances the
/// adaptive pacing state. Returns a clone of the winning choice, which is
/// always a member of `choices`.
pub fn resolve_vote<R: Rng + ?Sized>(
    tally: &VoteTally,
    choices: &ChoiceSet,
    timing: &mut AdaptiveTiming,
    rng: &mut R,
) -> Choice {
    if tally.is_empty() {
        // Silent rounds only count against the crowd when there was a real
        // decision to make; forced single-choice rounds always time out.
        if choices.len() > 1 {
            timing.consecutive_no_votes += 1;
            if timing.consecutive_no_votes >= NO_VOTE_FAST_MODE_THRESHOLD {
                timing.fast_mode = true;
            }
            tracing::debug!(
                consecutive = timing.consecutive_no_votes,
                "No votes cast; picking at random"
            );
        }
        return choices
            .choices()
            .choose(rng)
            .expect("a session never opens with an empty choice set")
            .clone();
    }
    timing.consecutive_no_votes = 0;

    let frequencies = tally.frequencies();
    let best_count = frequencies.values().copied().max().unwrap_or(0);
    let mut tied: Vec<&str> = frequencies
        .iter()
        .filter(|&(_, &count)| count == best_count)
        .map(|(key, _)| key.as_str())
        .collect();
    // HashMap iteration order is arbitrary; fix it so the draw below is the
    // only source of randomness.
    tied.sort_unstable();
    let winning_key = *tied
        .choose(rng)
        .expect("non-empty tally always has a maximum");

    match choices.get(winning_key) {
        Some(choice) => choice.clone(),
        None => {
            tracing::warn!(key = %winning_key, "Winning key not in choice set; falling back to random");
            choices
                .choices()
                .choose(rng)
                .expect("a session never opens with an empty choice set")
                .clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voting::choices::Choice;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    fn three_choices() -> ChoiceSet {
        ChoiceSet::new(vec![
            Choice::new("rest", "1", &["choose 0"]),
            Choice::new("smith", "2", &["choose 1"]),
            Choice::new("lift", "3", &["choose 2"]),
        ])
    }

    #[test]
    fn unique_maximum_wins_deterministically() {
        let choices = three_choices();
        let mut tally = VoteTally::new();
        tally.cast("alice", "2");
        tally.cast("bob", "2");
        tally.cast("carol", "1");

        for seed in 0..20 {
            let mut timing = AdaptiveTiming::default();
            let mut rng = StdRng::seed_from_u64(seed);
            let winner = resolve_vote(&tally, &choices, &mut timing, &mut rng);
            assert_eq!(winner.vote_key, "2");
            assert_eq!(timing.consecutive_no_votes, 0);
        }
    }

    #[test]
    fn winner_is_always_a_member_of_the_choice_set() {
        let choices = three_choices();
        let mut rng = StdRng::seed_from_u64(3);
        for round in 0..100 {
            let mut tally = VoteTally::new();
            for voter in 0..(round % 5) {
                tally.cast(&format!("voter{voter}"), &((round % 4) + 1).to_string());
            }
            let mut timing = AdaptiveTiming::default();
            let winner = resolve_vote(&tally, &choices, &mut timing, &mut rng);
            assert!(choices.contains_key(&winner.vote_key));
        }
    }

    #[test]
    fn tie_break_is_roughly_uniform_over_exactly_the_tied_keys() {
        let choices = three_choices();
        let mut tally = VoteTally::new();
        tally.cast("alice", "1");
        tally.cast("bob", "3");

        let mut rng = StdRng::seed_from_u64(42);
        let mut picks: HashMap<String, u32> = HashMap::new();
        for _ in 0..600 {
            let mut timing = AdaptiveTiming::default();
            let winner = resolve_vote(&tally, &choices, &mut timing, &mut rng);
            *picks.entry(winner.vote_key).or_insert(0) += 1;
        }

        // Only the tied keys ever win, each a fair share of the trials.
        assert_eq!(picks.get("2"), None);
        assert!(*picks.get("1").unwrap() > 200);
        assert!(*picks.get("3").unwrap() > 200);
    }

    #[test]
    fn empty_tally_picks_randomly_and_counts_the_silence() {
        let choices = three_choices();
        let tally = VoteTally::new();
        let mut timing = AdaptiveTiming {
            fast_mode: false,
            consecutive_no_votes: 0,
        };

        let mut rng = StdRng::seed_from_u64(9);
        let winner = resolve_vote(&tally, &choices, &mut timing, &mut rng);
        assert!(choices.contains_key(&winner.vote_key));
        assert_eq!(timing.consecutive_no_votes, 1);
        assert!(!timing.fast_mode);
    }

    #[test]
    fn fifth_silent_round_reengages_fast_mode() {
        let choices = three_choices();
        let tally = VoteTally::new();
        let mut timing = AdaptiveTiming {
            fast_mode: false,
            consecutive_no_votes: 0,
        };

        let mut rng = StdRng::seed_from_u64(11);
        for round in 1..=5u32 {
            resolve_vote(&tally, &choices, &mut timing, &mut rng);
            assert_eq!(timing.consecutive_no_votes, round);
            assert_eq!(timing.fast_mode, round >= 5);
        }
    }

    #[test]
    fn forced_single_choice_rounds_do_not_count_as_silence() {
        let choices = ChoiceSet::proceed_only();
        let tally = VoteTally::new();
        let mut timing = AdaptiveTiming {
            fast_mode: false,
            consecutive_no_votes: 4,
        };

        let mut rng = StdRng::seed_from_u64(13);
        let winner = resolve_vote(&tally, &choices, &mut timing, &mut rng);
        assert_eq!(winner.vote_key, "proceed");
        assert_eq!(timing.consecutive_no_votes, 4);
        assert!(!timing.fast_mode);
    }

    #[test]
    fn votes_reset_the_silence_counter() {
        let choices = three_choices();
        let mut tally = VoteTally::new();
        tally.cast("alice", "1");
        let mut timing = AdaptiveTiming {
            fast_mode: false,
            consecutive_no_votes: 4,
        };

        let mut rng = StdRng::seed_from_u64(17);
        resolve_vote(&tally, &choices, &mut timing, &mut rng);
        assert_eq!(timing.consecutive_no_votes, 0);
    }

    #[test]
    fn stale_winning_key_falls_back_to_a_valid_choice() {
        let choices = three_choices();
        // Cast directly into the tally, bypassing the session's cast-time
        // validation, to model a key that went stale.
        let mut tally = VoteTally::new();
        tally.cast("alice", "9");

        let mut timing = AdaptiveTiming::default();
        let mut rng = StdRng::seed_from_u64(23);
        let winner = resolve_vote(&tally, &choices, &mut timing, &mut rng);
        assert!(choices.contains_key(&winner.vote_key));
    }
}
