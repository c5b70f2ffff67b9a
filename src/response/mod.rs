//! Angular response models: the density of the offset between the measured
//! cone (or pair direction, or PET line) and the true origin.
//!
//! Every model is stateful: `analyze_event` extracts what it needs from one
//! event and prepares the density which subsequent `response` calls evaluate,
//! until the next event is analyzed. Offsets are in radians, except for PET
//! events, where they are distances in cm.

pub mod gauss;
pub mod slice;
pub mod table;

mod fixed;
mod uncertainty;
mod matrix;
mod cone_shapes;

pub use fixed::FixedGaussian;
pub use uncertainty::UncertaintyGaussian;
pub use matrix::ResponseMatrix;
pub use cone_shapes::ConeShapes;

use crate::event::PhysicalEvent;
use units::todo::Densityf64;

/// The capabilities the backprojector needs from a response model
pub trait ResponseModel {

    /// Prepare the density for `event`. Returns `false` if this model cannot
    /// describe the event, in which case the event must not be backprojected
    /// with it.
    fn analyze_event(&mut self, event: &PhysicalEvent) -> bool;

    /// Density at the given transversal offset
    fn response(&self, offset: f64) -> Densityf64;

    /// Whether the analyzed event also has a longitudinal (electron track)
    /// component, to be evaluated with `response_with_track`
    fn has_longitudinal(&self) -> bool { false }

    fn response_with_track(&self, transversal: f64, _longitudinal: f64) -> Densityf64 {
        self.response(transversal)
    }

    /// Lower bound of the transversal offsets outside which the density is
    /// negligible (below 1% of its maximum)
    fn support_min(&self) -> f64;

    fn support_max(&self) -> f64;

    /// Integral of the density over its domain
    fn integral(&self) -> f64;

    fn maximum(&self) -> Densityf64;
}

/// The response model chosen for a run
#[derive(Clone, Debug)]
pub enum Response {
    FixedGaussian(FixedGaussian),
    UncertaintyGaussian(UncertaintyGaussian),
    ResponseMatrix(ResponseMatrix),
    ConeShapes(ConeShapes),
}

macro_rules! dispatch {
    ($self:ident, $m:ident => $call:expr) => {
        match $self {
            Response::FixedGaussian      ($m) => $call,
            Response::UncertaintyGaussian($m) => $call,
            Response::ResponseMatrix     ($m) => $call,
            Response::ConeShapes         ($m) => $call,
        }
    };
}

impl ResponseModel for Response {
    fn analyze_event(&mut self, event: &PhysicalEvent) -> bool { dispatch!(self, m => m.analyze_event(event)) }
    fn response(&self, offset: f64) -> Densityf64 { dispatch!(self, m => m.response(offset)) }
    fn has_longitudinal(&self) -> bool { dispatch!(self, m => m.has_longitudinal()) }
    fn response_with_track(&self, t: f64, l: f64) -> Densityf64 { dispatch!(self, m => m.response_with_track(t, l)) }
    fn support_min(&self) -> f64 { dispatch!(self, m => m.support_min()) }
    fn support_max(&self) -> f64 { dispatch!(self, m => m.support_max()) }
    fn integral(&self) -> f64 { dispatch!(self, m => m.integral()) }
    fn maximum(&self) -> Densityf64 { dispatch!(self, m => m.maximum()) }
}

impl From<FixedGaussian>       for Response { fn from(m: FixedGaussian      ) -> Self { Self::FixedGaussian      (m) } }
impl From<UncertaintyGaussian> for Response { fn from(m: UncertaintyGaussian) -> Self { Self::UncertaintyGaussian(m) } }
impl From<ResponseMatrix>      for Response { fn from(m: ResponseMatrix     ) -> Self { Self::ResponseMatrix     (m) } }
impl From<ConeShapes>          for Response { fn from(m: ConeShapes         ) -> Self { Self::ConeShapes         (m) } }
