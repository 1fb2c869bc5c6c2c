use ml::MlError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("unknown environment `{0}`")]
    UnknownEnv(String),
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("simulation failed: {0}")]
    Simulation(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid { field, reason: reason.into() }
    }
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint i/o: {0}")]
    Io(#[from] io::Error),
    #[error("checkpoint header: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed checkpoint: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum RlError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("worker {worker}: {source}")]
    Worker {
        worker: usize,
        #[source]
        source: EnvError,
    },
    #[error("worker {0} exited before reporting")]
    WorkerLost(usize),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Ml(#[from] MlError),
    #[error("{what}: expected {expected} elements, got {got}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("collected batch is empty")]
    EmptyBatch,
    #[error("policy is still shared with a collection worker")]
    PolicyShared,
}
