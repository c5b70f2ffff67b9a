use std::path::Path;

use units::todo::Densityf64;

use crate::error::{Error, Result};
use crate::event::PhysicalEvent;
use super::{slice::ResponseSlice, table::ResponseTable, ResponseModel};

/// Response interpolated from simulated tables of the Compton offset.
///
/// The transversal table has axes (offset [deg], scatter angle [deg], initial
/// energy [keV]); the optional longitudinal table, used for events with an
/// electron track, has axes (offset [deg], electron scatter angle [deg],
/// electron energy [keV]). Each (angle, energy) lane is normalized to unit
/// integral when the table is loaded, so interpolated slices integrate to 1 as
/// well.
#[derive(Clone, Debug)]
pub struct ResponseMatrix {
    transversal: ResponseTable,
    longitudinal: Option<ResponseTable>,
    smoothing: usize,
    current: Option<(ResponseSlice, Option<ResponseSlice>)>,
}

impl ResponseMatrix {

    pub fn new(transversal: ResponseTable, longitudinal: Option<ResponseTable>, smoothing: usize) -> Result<Self> {
        let prepare = |mut table: ResponseTable| -> Result<ResponseTable> {
            table.expect_axes(3).map_err(|e| Error::Config(format!("response matrix `{}`: {e}", table.name)))?;
            table.map_axis(0, f64::to_radians);
            table.normalize_lanes();
            Ok(table)
        };
        Ok(Self {
            transversal: prepare(transversal)?,
            longitudinal: longitudinal.map(prepare).transpose()?,
            smoothing,
            current: None,
        })
    }

    pub fn load(transversal: &Path, longitudinal: Option<&Path>, smoothing: usize) -> Result<Self> {
        let t = ResponseTable::read(transversal)?;
        let l = longitudinal.map(ResponseTable::read).transpose()?;
        Self::new(t, l, smoothing).map_err(|e| match e {
            Error::Config(cause) => Error::ModelUnavailable { path: transversal.to_owned(), cause },
            other => other,
        })
    }

    fn slice(&self, table: &ResponseTable, parameters: &[f64]) -> Option<ResponseSlice> {
        let lane = table.slice(parameters).ok()?;
        ResponseSlice::new(table.axes[0].edges.clone(), lane)?
            .smoothed(self.smoothing)?
            .normalized()
    }
}

impl ResponseModel for ResponseMatrix {

    fn analyze_event(&mut self, event: &PhysicalEvent) -> bool {
        self.current = match event {
            PhysicalEvent::Compton(c) => {
                let transversal = self.slice(&self.transversal, &[c.phi.to_degrees(), c.e_initial()]);
                let longitudinal = match (&self.longitudinal, c.track) {
                    (Some(table), Some(_)) => self.slice(table, &[c.epsilon().to_degrees(), c.e_electron]),
                    _ => None,
                };
                transversal.map(|t| (t, longitudinal))
            }
            _ => None,
        };
        self.current.is_some()
    }

    fn response(&self, offset: f64) -> Densityf64 {
        self.current.as_ref().map_or(0.0, |(t, _)| t.density(offset))
    }

    fn has_longitudinal(&self) -> bool {
        matches!(self.current, Some((_, Some(_))))
    }

    fn response_with_track(&self, transversal: f64, longitudinal: f64) -> Densityf64 {
        match &self.current {
            Some((t, Some(l))) => t.density(transversal) * l.density(longitudinal),
            Some((t, None   )) => t.density(transversal),
            None               => 0.0,
        }
    }

    fn support_min(&self) -> f64 { self.current.as_ref().map_or(0.0, |(t, _)| t.support().0) }
    fn support_max(&self) -> f64 { self.current.as_ref().map_or(0.0, |(t, _)| t.support().1) }

    fn integral(&self) -> f64 {
        match &self.current {
            Some((t, Some(l))) => t.integral() * l.integral(),
            Some((t, None   )) => t.integral(),
            None               => 0.0,
        }
    }

    fn maximum(&self) -> Densityf64 {
        match &self.current {
            Some((t, Some(l))) => t.maximum() * l.maximum(),
            Some((t, None   )) => t.maximum(),
            None               => 0.0,
        }
    }
}
