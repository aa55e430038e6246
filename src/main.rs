use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod chat;
mod config;
mod error;
mod snapshot;
mod solver;
mod voting;

use crate::config::load_settings;
use crate::error::Result as AppResult;
use crate::solver::SolverHandle;
use crate::voting::session::{SessionConfig, SessionHandle};
use crate::voting::{AdaptiveTiming, VoteOptions};

#[tokio::main]
async fn main() -> AppResult<()> {
    // stdout is the command channel to the game; all logging goes to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_PKG_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = load_settings()?;
    tracing::info!("Configuration loaded: {:?}", settings);

    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();
    let (solver_tx, solver_rx) = mpsc::channel(8);

    let session = SessionHandle::spawn(
        SessionConfig {
            admin_user: settings.chat.admin_user.clone(),
            takeover_token: settings.chat.takeover_token.clone(),
            battle_settle_delay: Duration::from_millis(settings.engine.battle_settle_delay_ms),
        },
        VoteOptions::default(),
        AdaptiveTiming::default(),
        SolverHandle::new(solver_tx),
        command_tx,
        settings.engine.mailbox_size,
    );

    solver::spawn_noop_solver(solver_rx, session.clone());

    // Action-executor bridge: one command per stdout line.
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(command) = command_rx.recv().await {
            tracing::info!(command = %command, "Emitting command");
            if stdout
                .write_all(format!("{command}\n").as_bytes())
                .await
                .is_err()
            {
                break;
            }
            let _ = stdout.flush().await;
        }
        tracing::warn!("Command output closed");
    });

    // Game-state bridge: one JSON state message per stdin line.
    {
        let session = session.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                session.game_state(line).await;
            }
            tracing::info!("Game-state input closed");
        });
    }

    // Chat bridge on its own listener.
    {
        let session = session.clone();
        let bind_addr = settings.chat.bind_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = chat::run_chat_bridge(&bind_addr, session).await {
                tracing::error!(error = %e, "Chat bridge terminated");
            }
        });
    }

    // External renderers poll the same surface; log it so headless runs stay
    // observable.
    {
        let session = session.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                if let Ok(snapshot) = session.render_state().await
                    && let Some(view) = snapshot.vote
                {
                    tracing::debug!(
                        seconds_remaining = view.seconds_remaining,
                        entries = view.entries.len(),
                        fast_mode = snapshot.fast_mode,
                        "Vote in progress"
                    );
                }
            }
        });
    }

    // Drive the state machine on a fixed tick.
    let mut ticker =
        tokio::time::interval(Duration::from_millis(settings.engine.tick_interval_ms.max(1)));
    loop {
        ticker.tick().await;
        session.tick().await;
    }
}
