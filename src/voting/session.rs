use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::chat::ChatMessage;
use crate::error::SessionError;
use crate::snapshot::StateMessage;
use crate::solver::SolverHandle;
use crate::voting::choices::{BuiltVote, Choice, ChoiceSet, build_choose_vote};
use crate::voting::render::{RenderSnapshot, RenderView, ScreenContext, build_entries};
use crate::voting::resolve::resolve_vote;
use crate::voting::tally::VoteTally;
use crate::voting::{
    AdaptiveTiming, FAST_VOTE_TIME_MILLIS, NO_VOTE_TIME_MILLIS, VoteOptions, VoteType,
};

const VOTE_PREFIXES: [&str; 2] = ["vote", "!vote"];

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub admin_user: String,
    pub takeover_token: String,
    pub battle_settle_delay: Duration,
}

/// An open voting round. Exists only between open and resolve; resolution
/// tears the whole thing down in one move so no field outlives the round.
#[derive(Debug)]
struct VoteSession {
    vote_type: VoteType,
    deadline: Instant,
    choices: ChoiceSet,
    tally: VoteTally,
    screen: ScreenContext,
}

#[derive(Debug)]
enum SessionMessage {
    GameState { raw: String },
    Chat(ChatMessage),
    Tick,
    BattleComplete,
    RenderQuery { respond_to: oneshot::Sender<RenderSnapshot> },
}

/// Cloneable handle to the session driver actor. All three timelines (chat
/// ingestion, snapshot/tick driving, render reads) go through the actor's
/// mailbox, which is the engine's single mutual-exclusion domain.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
}

impl SessionHandle {
    pub fn spawn(
        config: SessionConfig,
        options: VoteOptions,
        timing: AdaptiveTiming,
        solver: SolverHandle,
        command_tx: mpsc::UnboundedSender<String>,
        mailbox_size: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(mailbox_size);
        let actor = SessionActor {
            receiver,
            config,
            options,
            timing,
            session: None,
            in_battle: false,
            command_tx,
            solver,
            rng: StdRng::from_entropy(),
        };
        tokio::spawn(run_session_actor(actor));
        Self { sender }
    }

    /// One raw state message from the game-state provider.
    pub async fn game_state(&self, raw: String) {
        self.send(SessionMessage::GameState { raw }).await;
    }

    /// One inbound chat message, in arrival order.
    pub async fn chat_message(&self, message: ChatMessage) {
        self.send(SessionMessage::Chat(message)).await;
    }

    /// Host-driven periodic tick; resolves the round once the deadline has
    /// passed.
    pub async fn tick(&self) {
        self.send(SessionMessage::Tick).await;
    }

    /// The battle solver finished; voting resumes on the next snapshot.
    pub async fn battle_complete(&self) {
        self.send(SessionMessage::BattleComplete).await;
    }

    /// Read-only view for the renderer. Never mutates session state.
    pub async fn render_state(&self) -> Result<RenderSnapshot, SessionError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(SessionMessage::RenderQuery { respond_to })
            .await
            .map_err(|e| SessionError::ActorComm(format!("Failed to send RenderQuery: {e}")))?;
        response
            .await
            .map_err(|e| SessionError::ActorComm(format!("RenderQuery dropped: {e}")))
    }

    async fn send(&self, message: SessionMessage) {
        if self.sender.send(message).await.is_err() {
            tracing::error!("Session actor is gone; dropping message");
        }
    }
}

struct SessionActor {
    receiver: mpsc::Receiver<SessionMessage>,
    config: SessionConfig,
    options: VoteOptions,
    timing: AdaptiveTiming,
    session: Option<VoteSession>,
    in_battle: bool,
    command_tx: mpsc::UnboundedSender<String>,
    solver: SolverHandle,
    rng: StdRng,
}

async fn run_session_actor(mut actor: SessionActor) {
    tracing::debug!("Session actor started");
    while let Some(message) = actor.receiver.recv().await {
        actor.handle_message(message);
    }
    tracing::debug!("Session actor stopped");
}

impl SessionActor {
    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::GameState { raw } => self.handle_game_state(&raw),
            SessionMessage::Chat(chat) => self.handle_chat(chat),
            SessionMessage::Tick => self.handle_tick(),
            SessionMessage::BattleComplete => {
                tracing::info!("Battle complete; voting resumes");
                self.in_battle = false;
            }
            SessionMessage::RenderQuery { respond_to } => {
                let _ = respond_to.send(self.render_snapshot());
            }
        }
    }

    // --- snapshot ingress -------------------------------------------------

    fn handle_game_state(&mut self, raw: &str) {
        let message = match StateMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unparseable state message");
                return;
            }
        };

        if message.available_commands.is_empty() {
            tracing::debug!("State message carries no available commands");
            return;
        }
        if self.in_battle {
            tracing::debug!("In battle; ignoring state message");
            return;
        }

        if message.has_command("choose") {
            match message.require_game_state() {
                Ok(state) => self.open_vote(build_choose_vote(state), false),
                Err(e) => {
                    // MalformedSnapshot: report and skip the round.
                    tracing::error!(error = %e, "Skipping round");
                }
            }
        } else if message.has_command("play") {
            self.begin_battle();
        } else if message.has_command("start") {
            self.open_character_vote();
        } else if message.has_command("proceed") {
            let screen_type = message
                .game_state
                .as_ref()
                .map(|s| s.screen_type.as_str())
                .unwrap_or_default();
            self.open_proceed_vote(screen_type);
        } else if message.has_command("confirm") {
            tracing::info!("Choosing confirm");
            self.push_command("confirm");
        } else if message.has_command("leave") {
            // Exit shop hell.
            self.push_command("leave");
            self.push_command("proceed");
        }
    }

    fn begin_battle(&mut self) {
        self.in_battle = true;
        let solver = self.solver.clone();
        let settle_delay = self.config.battle_settle_delay;
        // Settle delay runs off the actor so ingestion never stalls.
        tokio::spawn(async move {
            tokio::time::sleep(settle_delay).await;
            solver.begin_battle().await;
        });
    }

    // --- session opening --------------------------------------------------

    fn open_character_vote(&mut self) {
        let choices = ChoiceSet::new(vec![
            Choice::new("ironclad", "1", &["start ironclad"]),
            Choice::new("silent", "2", &["start silent"]),
            Choice::new("defect", "3", &["start defect"]),
            Choice::new("watcher", "4", &["start watcher"]),
        ]);
        self.open_vote(
            BuiltVote {
                choices,
                vote_type: VoteType::Character,
                screen: ScreenContext::Character,
            },
            false,
        );
    }

    fn open_proceed_vote(&mut self, screen_type: &str) {
        let vote_type = match screen_type {
            "REST" => VoteType::Rest,
            "COMBAT_REWARD" => VoteType::Skip,
            "GAME_OVER" => VoteType::GameOver,
            other => {
                tracing::warn!(screen_type = %other, "Unknown screen type for proceed timer");
                VoteType::Skip
            }
        };
        tracing::info!(screen_type = %screen_type, vote_type = ?vote_type, "Delaying proceed");
        self.open_vote(
            BuiltVote {
                choices: ChoiceSet::proceed_only(),
                vote_type,
                screen: ScreenContext::Generic,
            },
            true,
        );
    }

    fn open_vote(&mut self, built: BuiltVote, force_wait: bool) {
        if self.session.is_some() {
            // Callers gate on session state; reaching this is a contract
            // violation upstream, not a reason to corrupt the open round.
            tracing::warn!("Session already open; ignoring open request");
            return;
        }

        let choices = if built.choices.is_empty() {
            ChoiceSet::proceed_only()
        } else {
            built.choices
        };

        let duration_millis = if choices.len() > 1 || force_wait {
            if self.timing.fast_mode {
                FAST_VOTE_TIME_MILLIS
            } else {
                self.options.vote_time_millis(built.vote_type)
            }
        } else {
            NO_VOTE_TIME_MILLIS
        };

        tracing::info!(
            vote_type = ?built.vote_type,
            choices = choices.len(),
            duration_ms = duration_millis,
            "Opening vote session"
        );

        self.session = Some(VoteSession {
            vote_type: built.vote_type,
            deadline: Instant::now() + Duration::from_millis(duration_millis),
            choices,
            tally: VoteTally::new(),
            screen: built.screen,
        });
    }

    // --- tick / resolution ------------------------------------------------

    fn handle_tick(&mut self) {
        let deadline_passed = self
            .session
            .as_ref()
            .is_some_and(|session| Instant::now() >= session.deadline);
        if !deadline_passed {
            return;
        }

        // Atomic teardown: the session leaves the actor before resolution so
        // nothing can observe a half-cleared round.
        let Some(session) = self.session.take() else {
            return;
        };
        let winner = resolve_vote(
            &session.tally,
            &session.choices,
            &mut self.timing,
            &mut self.rng,
        );
        tracing::info!(
            label = %winner.label,
            key = %winner.vote_key,
            voters = session.tally.voter_count(),
            "Vote resolved"
        );
        self.emit_commands(session.vote_type, &winner);
    }

    fn emit_commands(&mut self, vote_type: VoteType, winner: &Choice) {
        let ascension = self.options.ascension();
        for command in &winner.commands {
            let command = if vote_type == VoteType::Character
                && ascension > 0
                && winner.commands.len() == 1
            {
                format!("{command} {ascension}")
            } else {
                command.clone()
            };
            self.push_command(&command);
        }
    }

    fn push_command(&self, command: &str) {
        tracing::debug!(command = %command, "Queueing outbound command");
        if self.command_tx.send(command.to_string()).is_err() {
            tracing::error!(command = %command, "Outbound command channel closed");
        }
    }

    // --- chat ingress -----------------------------------------------------

    fn handle_chat(&mut self, message: ChatMessage) {
        let tokens: Vec<&str> = message.text.split_whitespace().collect();
        if tokens.is_empty() {
            return;
        }

        if tokens.len() == 1 && tokens[0] == self.config.takeover_token {
            tracing::info!(user = %message.sender, "Fast mode disabled from chat");
            self.timing.disable_fast_mode();
        }

        if message.sender.eq_ignore_ascii_case(&self.config.admin_user) {
            self.handle_admin_command(&message.text, &tokens);
        }

        self.handle_vote_tokens(&message.sender, &tokens);
    }

    fn handle_admin_command(&mut self, text: &str, tokens: &[&str]) {
        if tokens.len() >= 2 && tokens[0] == "!sudo" {
            if let Some((_, command)) = text.trim_start().split_once(' ') {
                tracing::info!(command = %command, "Admin direct command");
                self.push_command(command.trim());
            }
        } else if tokens.len() >= 4 && tokens[0] == "!admin" && tokens[1] == "set" {
            let option_name = tokens[2];
            match tokens[3].parse::<i64>() {
                Ok(value) => {
                    if self.options.set(option_name, value) {
                        tracing::info!(option = %option_name, value, "Option set by admin");
                    } else {
                        tracing::warn!(option = %option_name, "Ignoring set for unknown option");
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        option = %option_name,
                        raw = %tokens[3],
                        "Ignoring set with non-integer value"
                    );
                }
            }
        }
    }

    fn handle_vote_tokens(&mut self, voter: &str, tokens: &[&str]) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        // The round is decided the instant the deadline passes, even if the
        // resolving tick hasn't run yet.
        if Instant::now() >= session.deadline {
            return;
        }

        let token = if tokens.len() == 1 {
            tokens[0]
        } else if tokens.len() >= 2 && VOTE_PREFIXES.contains(&tokens[0]) {
            tokens[1]
        } else {
            return;
        };

        let normalized = normalize_vote_token(token);
        if session.choices.contains_key(&normalized) {
            session.tally.cast(voter, &normalized);
        }
    }

    // --- render -----------------------------------------------------------

    fn render_snapshot(&self) -> RenderSnapshot {
        let vote = self.session.as_ref().map(|session| {
            let remaining = session.deadline.saturating_duration_since(Instant::now());
            RenderView {
                entries: build_entries(&session.choices, &session.tally),
                seconds_remaining: remaining.as_millis() as u64 / 1000 + 1,
                screen: session.screen.clone(),
            }
        });
        RenderSnapshot {
            vote,
            fast_mode: self.timing.fast_mode,
        }
    }
}

/// Lower-case and re-stringify numeric tokens so "007" and "7" count as the
/// same key. Non-numeric tokens only get the case fold.
fn normalize_vote_token(token: &str) -> String {
    let lowered = token.to_lowercase();
    match lowered.parse::<i64>() {
        Ok(numeric) => numeric.to_string(),
        Err(_) => lowered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    const ADMIN: &str = "overseer";

    struct Harness {
        session: SessionHandle,
        commands: mpsc::UnboundedReceiver<String>,
        solver_signals: mpsc::Receiver<crate::solver::BattleStarted>,
    }

    fn harness() -> Harness {
        harness_with(AdaptiveTiming::default())
    }

    fn harness_with(timing: AdaptiveTiming) -> Harness {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (solver_tx, solver_signals) = mpsc::channel(8);
        let session = SessionHandle::spawn(
            SessionConfig {
                admin_user: ADMIN.to_string(),
                takeover_token: "07734".to_string(),
                battle_settle_delay: Duration::from_millis(500),
            },
            VoteOptions::default(),
            timing,
            SolverHandle::new(solver_tx),
            command_tx,
            32,
        );
        Harness {
            session,
            commands,
            solver_signals,
        }
    }

    impl Harness {
        async fn state(&self, raw: &str) {
            self.session.game_state(raw.to_string()).await;
        }

        async fn chat(&self, sender: &str, text: &str) {
            self.session.chat_message(ChatMessage::new(sender, text)).await;
        }

        /// Round-trips a render query, which doubles as a mailbox barrier.
        async fn render(&self) -> RenderSnapshot {
            self.session.render_state().await.unwrap()
        }

        async fn tick(&self) {
            self.session.tick().await;
        }
    }

    fn rest_state() -> &'static str {
        r#"{
            "available_commands": ["choose"],
            "game_state": {
                "screen_type": "REST",
                "choice_list": ["rest", "smith", "lift"],
                "potions": [{"name": "Potion Slot"}]
            }
        }"#
    }

    #[tokio::test(start_paused = true)]
    async fn plurality_winner_is_emitted_and_session_torn_down() {
        let mut h = harness();
        h.state(rest_state()).await;

        h.chat("alice", "2").await;
        h.chat("bob", "vote 2").await;
        h.chat("carol", "1").await;
        h.render().await;

        // Fast mode default: 3 s window.
        tokio::time::advance(Duration::from_millis(3_100)).await;
        h.tick().await;
        let snapshot = h.render().await;

        assert_eq!(h.commands.try_recv().unwrap(), "choose 1");
        assert!(matches!(h.commands.try_recv(), Err(TryRecvError::Empty)));
        assert!(snapshot.vote.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn render_reads_are_idempotent_and_vote_overwrite_counts_once() {
        let mut h = harness();
        h.state(rest_state()).await;

        h.chat("alice", "1").await;
        h.chat("alice", "2").await;

        let first = h.render().await;
        let second = h.render().await;
        assert_eq!(first, second);

        let view = first.vote.unwrap();
        assert_eq!(view.entries[0].votes, 0);
        assert_eq!(view.entries[1].votes, 1);
        assert_eq!(view.screen, ScreenContext::Rest);

        // Reads left the round fully usable.
        h.chat("bob", "3").await;
        h.render().await;
        tokio::time::advance(Duration::from_millis(3_100)).await;
        h.tick().await;
        h.render().await;
        let winner = h.commands.try_recv().unwrap();
        assert!(winner == "choose 1" || winner == "choose 2");
    }

    #[tokio::test(start_paused = true)]
    async fn votes_after_the_deadline_are_rejected() {
        let mut h = harness();
        h.state(rest_state()).await;
        h.chat("alice", "1").await;
        h.render().await;

        tokio::time::advance(Duration::from_millis(3_100)).await;
        // Deadline has passed but the closing tick hasn't run yet.
        h.chat("bob", "2").await;
        h.chat("carol", "2").await;
        h.tick().await;
        h.render().await;

        assert_eq!(h.commands.try_recv().unwrap(), "choose 0");
    }

    #[tokio::test(start_paused = true)]
    async fn vote_tokens_normalize_case_and_leading_zeros() {
        let mut h = harness();
        h.state(rest_state()).await;

        h.chat("alice", "02").await;
        h.chat("bob", "!vote 002").await;

        let view = h.render().await.vote.unwrap();
        assert_eq!(view.entries[1].votes, 2);

        tokio::time::advance(Duration::from_millis(3_100)).await;
        h.tick().await;
        h.render().await;
        assert_eq!(h.commands.try_recv().unwrap(), "choose 1");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_tokens_never_reach_the_tally() {
        let h = harness();
        h.state(rest_state()).await;

        h.chat("alice", "9").await;
        h.chat("bob", "gibberish").await;
        h.chat("carol", "vote").await;

        let view = h.render().await.vote.unwrap();
        assert!(view.entries.iter().all(|entry| entry.votes == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_choose_snapshot_opens_nothing() {
        let h = harness();
        h.state(r#"{"available_commands": ["choose"]}"#).await;
        h.state("not json at all").await;

        assert!(h.render().await.vote.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn second_open_request_is_ignored_while_open() {
        let h = harness();
        h.state(rest_state()).await;
        let before = h.render().await.vote.unwrap();

        h.state(r#"{"available_commands": ["start"]}"#).await;
        let after = h.render().await.vote.unwrap();

        assert_eq!(before.entries, after.entries);
    }

    #[tokio::test(start_paused = true)]
    async fn admin_duration_override_shapes_the_next_window() {
        let h = harness();
        // A viewer turns demo mode off, then the admin stretches character
        // votes.
        h.chat("viewer", "07734").await;
        h.chat(ADMIN, "!admin set character 99999").await;

        h.state(r#"{"available_commands": ["start"]}"#).await;
        let view = h.render().await.vote.unwrap();
        assert_eq!(view.seconds_remaining, 100);
        assert_eq!(view.entries.len(), 4);
        assert_eq!(view.screen, ScreenContext::Character);
    }

    #[tokio::test(start_paused = true)]
    async fn admin_set_ignores_unknown_names_and_bad_values() {
        let h = harness();
        h.chat("viewer", "07734").await;
        h.chat(ADMIN, "!admin set nonsense 5").await;
        h.chat(ADMIN, "!admin set character lots").await;

        h.state(r#"{"available_commands": ["start"]}"#).await;
        let view = h.render().await.vote.unwrap();
        // Still the stock character window.
        assert_eq!(view.seconds_remaining, 26);
    }

    #[tokio::test(start_paused = true)]
    async fn sudo_passes_through_for_the_admin_only() {
        let mut h = harness();
        h.chat("mallory", "!sudo choose 3").await;
        h.chat(ADMIN, "!sudo choose 3").await;
        h.render().await;

        assert_eq!(h.commands.try_recv().unwrap(), "choose 3");
        assert!(matches!(h.commands.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn character_vote_appends_configured_ascension() {
        let mut h = harness();
        h.chat(ADMIN, "!admin set asc 12").await;
        h.state(r#"{"available_commands": ["start"]}"#).await;

        h.chat("alice", "1").await;
        h.render().await;
        tokio::time::advance(Duration::from_millis(3_100)).await;
        h.tick().await;
        h.render().await;

        assert_eq!(h.commands.try_recv().unwrap(), "start ironclad 12");
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_and_leave_bypass_voting() {
        let mut h = harness();
        h.state(r#"{"available_commands": ["confirm"]}"#).await;
        h.state(r#"{"available_commands": ["leave"]}"#).await;
        h.render().await;

        assert_eq!(h.commands.try_recv().unwrap(), "confirm");
        assert_eq!(h.commands.try_recv().unwrap(), "leave");
        assert_eq!(h.commands.try_recv().unwrap(), "proceed");
        assert!(h.render().await.vote.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_mode_round_uses_the_configured_window() {
        let h = harness_with(AdaptiveTiming {
            fast_mode: false,
            consecutive_no_votes: 0,
        });
        h.state(rest_state()).await;

        // REST choices map to the generic vote type: 25 s stock window.
        let view = h.render().await.vote.unwrap();
        assert_eq!(view.seconds_remaining, 26);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_proceed_round_waits_the_fast_window() {
        let mut h = harness();
        h.state(r#"{
            "available_commands": ["proceed"],
            "game_state": {"screen_type": "COMBAT_REWARD"}
        }"#)
        .await;

        // Forced wait keeps the fast window, not the 1 s no-vote window.
        let view = h.render().await.vote.unwrap();
        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.seconds_remaining, 4);

        tokio::time::advance(Duration::from_millis(3_100)).await;
        h.tick().await;
        h.render().await;
        assert_eq!(h.commands.try_recv().unwrap(), "proceed");
    }

    #[tokio::test(start_paused = true)]
    async fn battle_defers_to_the_solver_and_suppresses_voting() {
        let mut h = harness();
        h.state(r#"{"available_commands": ["play"]}"#).await;
        h.render().await;

        // Settle delay elapses off the tick path.
        tokio::time::advance(Duration::from_millis(600)).await;
        h.solver_signals.recv().await.expect("solver signal");

        // Mid-battle snapshots open nothing.
        h.state(rest_state()).await;
        assert!(h.render().await.vote.is_none());

        h.session.battle_complete().await;
        h.state(rest_state()).await;
        assert!(h.render().await.vote.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn no_vote_round_emits_some_choice_and_counts_silence() {
        let mut h = harness();

        for round in 0..2 {
            h.state(rest_state()).await;
            h.render().await;
            tokio::time::advance(Duration::from_millis(3_100)).await;
            h.tick().await;
            h.render().await;

            let command = h.commands.try_recv().unwrap();
            assert!(
                command.starts_with("choose "),
                "round {round} emitted {command}"
            );
        }
    }

    #[test]
    fn token_normalization_strips_leading_zeros_only_for_numbers() {
        assert_eq!(normalize_vote_token("007"), "7");
        assert_eq!(normalize_vote_token("0"), "0");
        assert_eq!(normalize_vote_token("PROCEED"), "proceed");
        assert_eq!(normalize_vote_token("x0y"), "x0y");
    }
}
