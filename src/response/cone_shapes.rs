use std::path::Path;

use units::todo::Densityf64;

use crate::error::{Error, Result};
use crate::event::PhysicalEvent;
use super::{slice::ResponseSlice, table::ResponseTable, ResponseModel};

/// Simulated distributions of the Compton offset, binned in (offset [deg],
/// scatter angle [deg], initial energy [keV], lever arm [cm], sequence length).
///
/// For each event the table is sliced at the event's parameters, smoothed and
/// renormalized; the integral of the resulting density is cached with it.
#[derive(Clone, Debug)]
pub struct ConeShapes {
    table: ResponseTable,
    smoothing: usize,
    current: Option<ResponseSlice>,
}

impl ConeShapes {

    /// Moving-average window applied to slices, in bins
    pub const DEFAULT_SMOOTHING: usize = 5;

    pub fn new(mut table: ResponseTable, smoothing: usize) -> Result<Self> {
        table.expect_axes(5).map_err(|e| Error::Config(format!("cone shapes `{}`: {e}", table.name)))?;
        table.map_axis(0, f64::to_radians);
        Ok(Self { table, smoothing, current: None })
    }

    pub fn load(path: &Path, smoothing: usize) -> Result<Self> {
        Self::new(ResponseTable::read(path)?, smoothing).map_err(|e| match e {
            Error::Config(cause) => Error::ModelUnavailable { path: path.to_owned(), cause },
            other => other,
        })
    }
}

impl ResponseModel for ConeShapes {

    fn analyze_event(&mut self, event: &PhysicalEvent) -> bool {
        self.current = match event {
            PhysicalEvent::Compton(c) => {
                let parameters = [c.phi.to_degrees(),
                                  c.e_initial(),
                                  c.lever_arm(),
                                  c.sequence_length as f64];
                self.table.slice(&parameters).ok()
                    .and_then(|lane| ResponseSlice::from_counts(self.table.axes[0].edges.clone(), &lane))
                    .and_then(|slice| slice.smoothed(self.smoothing))
                    .and_then(ResponseSlice::normalized)
            }
            _ => None,
        };
        self.current.is_some()
    }

    fn response(&self, offset: f64) -> Densityf64 {
        self.current.as_ref().map_or(0.0, |s| s.density(offset))
    }

    fn support_min(&self) -> f64 { self.current.as_ref().map_or(0.0, |s| s.support().0) }
    fn support_max(&self) -> f64 { self.current.as_ref().map_or(0.0, |s| s.support().1) }
    fn integral   (&self) -> f64 { self.current.as_ref().map_or(0.0, ResponseSlice::integral) }
    fn maximum    (&self) -> f64 { self.current.as_ref().map_or(0.0, ResponseSlice::maximum) }
}
