//! List-mode backprojection for Compton and pair-conversion gamma-ray
//! telescopes: image grids, angular response models, the per-event
//! backprojector and the event supply queue which feeds it.

pub mod error;
pub mod index;
pub mod event;
pub mod grid;
pub mod response;
pub mod backprojector;
pub mod queue;
pub mod config;
pub mod summary;
pub mod synthetic;
pub mod io;
pub mod utils;

pub use error::{Error, Instability, Rejection, Result};
pub use event::{PhysicalEvent, Topology};
pub use grid::{AxisBins, Grid, GridKind};
pub use response::{Response, ResponseModel};
pub use backprojector::{Backprojector, NearFieldTuning, SparseBackprojection, Stage};
pub use queue::{EventSource, EventSupplyQueue, QueueSettings};
pub use summary::RunSummary;
