//! Error types for field post-processing.
//!
//! Errors fall into two families:
//! - `Setup`: the caller asked for something the data cannot support, such as
//!   re-projecting exact-kernel fields or comparing planes with different normals.
//! - `Data`: the input data is internally inconsistent, such as a plane dataset
//!   missing one of its tangential components.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldProjError {
    #[error("setup error: {0}")]
    Setup(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, FieldProjError>;

impl FieldProjError {
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }
}
