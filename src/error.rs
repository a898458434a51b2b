use thiserror::Error;

use crate::artifact::ArtifactId;

/// Errors raised by polygon editing and erasing.
///
/// None of these are fatal: the gesture that produced them is abandoned and
/// the document keeps its previous state.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EditError {
    #[error("polygon needs at least 3 distinct vertices, got {vertices}")]
    DegenerateGeometry { vertices: usize },

    #[error("invalid stroke: {0}")]
    InvalidStroke(String),

    #[error("no artifact with id {0}")]
    UnknownArtifact(ArtifactId),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("sidecar i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("sidecar is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures reported by (or on the way to) the segmentation oracle.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum OracleError {
    #[error("segmentation failed: {0}")]
    Prediction(String),

    #[error("segmentation worker is no longer running")]
    WorkerGone,

    #[error("segmentation mask has no usable region")]
    EmptyMask,
}
