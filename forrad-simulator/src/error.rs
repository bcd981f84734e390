use forrad_config::ConfigError;
use forrad_core::AllocError;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pool setup failed: {0}")]
    Alloc(#[from] AllocError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An object came back with a stamp other than the one its holder wrote.
    #[error("Task {task} found stamp {found:#018x}, expected {expected:#018x}")]
    Corruption { task: usize, expected: u64, found: u64 },

    #[error("Task processing error: {0}")]
    Processing(String),
}

impl From<JoinError> for SimulationError {
    fn from(err: JoinError) -> Self {
        SimulationError::Processing(err.to_string())
    }
}
