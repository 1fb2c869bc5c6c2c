//! Minimal tensor and autodiff toolkit for small policy networks.
//!
//! Forward passes are written once against [`Recorder`]: evaluate under a
//! [`Tape`] to differentiate, or under [`NoGrad`] to get plain values.

pub mod dist;
pub mod error;
pub mod graph;
pub mod nn;
pub mod optim;
pub mod recorder;
pub mod tape;
pub mod tensor;

pub use error::MlError;
pub use graph::NoGrad;
pub use nn::{Activation, Dense, Mlp, Module};
pub use optim::Adam;
pub use recorder::Recorder;
pub use tape::{Gradients, Tape};
pub use tensor::Tensor;
