use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] notely_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Nothing to change: pass --title and/or --body")]
    NothingToEdit,
    #[error("Note {0} cannot be loaded offline: pass both --title and --body")]
    OfflineEditIncomplete(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
