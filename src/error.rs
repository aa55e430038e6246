use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("State message is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("State message is missing the game_state object")]
    MissingGameState,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat bridge I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session actor communication error: {0}")]
    ActorComm(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigParsing(#[from] config::ConfigError),
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("Chat bridge error: {0}")]
    Chat(#[from] ChatError),
    #[error("Session engine error: {0}")]
    Session(#[from] SessionError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
