//! Engine failure modes. The daemon maps these onto wire status codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read game definition: {0}")]
    DefinitionIo(#[from] std::io::Error),

    #[error("failed to parse game definition: {0}")]
    DefinitionParse(#[from] serde_json::Error),

    #[error("invalid game definition: {0}")]
    DefinitionInvalid(String),

    /// Entity names are unique per game, players included.
    #[error("entity '{0}' already exists")]
    EntityExists(String),

    #[error("player '{0}' not found")]
    PlayerNotFound(String),

    #[error("entity '{0}' not found")]
    EntityNotFound(String),
}
