use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the environment and the simulator connection.
///
/// End-of-episode conditions (ego collided, ego left the network, no vehicles
/// left to insert) are not errors; they are reported through the
/// `terminated` flag of a [Step](crate::Step).
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid action: {action}, expected [{low}, {high}]")]
    InvalidAction { action: f64, low: f64, high: f64 },

    #[error("the environment must be reset before stepping")]
    NotStarted,

    #[error("the episode has finished; call reset to start a new one")]
    EpisodeFinished,

    #[error("ego vehicle `{0}` is not in the simulation")]
    EgoNotFound(String),

    #[error("ego vehicle `{id}` did not depart within {steps} steps")]
    EgoNeverDeparted { id: String, steps: usize },

    #[error("scenario configuration not found at {0}")]
    MissingScenario(PathBuf),

    #[error("could not launch simulator: {0}")]
    Launch(String),

    #[error("simulator rejected command 0x{command:02x}: {message}")]
    Simulator { command: u8, message: String },

    #[error("malformed simulator response: {0}")]
    Protocol(String),

    #[error("could not parse configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
