//! Construction-time errors, which abort a run, and per-event rejections, which
//! are counted and skipped.

use std::path::PathBuf;
use thiserror::Error;

use crate::event::Topology;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {axis} axis: {reason}")]
    InvalidDimension { axis: &'static str, reason: String },

    #[error("grid tables have not been prepared since the last change of dimensions")]
    GridNotPrepared,

    #[error("response model unavailable: cannot load `{}`: {cause}", path.display())]
    ModelUnavailable { path: PathBuf, cause: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self { Self::Config(e.to_string()) }
}

impl From<geometry::FrameError> for Error {
    fn from(e: geometry::FrameError) -> Self {
        Self::InvalidDimension { axis: "rotation", reason: e.to_string() }
    }
}

/// Why a single event produced no backprojection
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    #[error("{0:?} events cannot be backprojected on this grid")]
    UnsupportedTopology(Topology),

    #[error("response model lacks the inputs it needs for this {0:?} event")]
    ResponseUnavailable(Topology),

    #[error("numeric instability: {0}")]
    NumericInstability(Instability),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instability {
    #[error("non-finite weight or sum")]
    NonFinite,
    #[error("all weights (nearly) zero")]
    Empty,
}

impl From<Instability> for Rejection {
    fn from(i: Instability) -> Self { Self::NumericInstability(i) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
