use crate::error::Result as AppResult;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Address the line-protocol chat bridge listens on.
    pub bind_addr: String,
    /// The one chat identity allowed to use `!sudo` and `!admin`.
    pub admin_user: String,
    /// Single-token chat message that turns demo (fast) mode off.
    pub takeover_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    /// Pause between seeing a battle and handing it to the solver, so the
    /// game state settles first.
    pub battle_settle_delay_ms: u64,
    pub mailbox_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    pub chat: ChatConfig,
    pub engine: EngineConfig,
}

pub fn load_settings() -> AppResult<AppSettings> {
    let settings = Config::builder()
        .set_default("chat.bind_addr", "127.0.0.1:7788")?
        .set_default("chat.admin_user", "hivemind_admin")?
        .set_default("chat.takeover_token", "07734")?
        .set_default("engine.tick_interval_ms", 100_i64)?
        .set_default("engine.battle_settle_delay_ms", 500_i64)?
        .set_default("engine.mailbox_size", 32_i64)?
        .add_source(
            Environment::with_prefix("HIVEMIND")
                .separator("__")
                .try_parsing(true),
        )
        .add_source(File::with_name("config").required(false))
        .build()?;

    Ok(settings.try_deserialize()?)
}
