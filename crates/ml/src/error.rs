use thiserror::Error;

#[derive(Error, Debug)]
pub enum MlError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("loss must be a scalar, got shape {0:?}")]
    NonScalarLoss(Vec<usize>),
    #[error("tensor {0} was not recorded on the tape")]
    MissingValue(usize),
    #[error("unknown activation `{0}` (expected tanh, relu or sigmoid)")]
    UnknownActivation(String),
}
