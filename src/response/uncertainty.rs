use units::{radian_, ratio_, Angle, Ratio};
use units::todo::{Anglef64, Densityf64};

use crate::error::{Error, Result};
use crate::event::PhysicalEvent;
use super::{gauss::Gauss, ResponseModel};

/// Gaussian responses whose width is the event's own propagated measurement
/// uncertainty, widened by a fixed inflation.
///
/// Describes Compton events (scatter-angle uncertainty from energy and position
/// errors) and pair events (reported direction uncertainty).
#[derive(Clone, Debug)]
pub struct UncertaintyGaussian {
    inflation: Anglef64,
    cutoff: f64,
    current: Option<Gauss>,
}

impl UncertaintyGaussian {

    pub fn new(inflation: Angle, cutoff: Ratio) -> Result<Self> {
        let (inflation, cutoff) = (radian_(inflation), ratio_(cutoff));
        if !(inflation.is_finite() && inflation >= 0.0) {
            return Err(Error::Config(format!("inflation must be non-negative, got {inflation} rad")))
        }
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(Error::Config(format!("cutoff must be positive, got {cutoff}")))
        }
        Ok(Self { inflation, cutoff, current: None })
    }

    fn sigma(&self, event: &PhysicalEvent) -> Option<Anglef64> {
        let measured = match event {
            PhysicalEvent::Compton(c) => c.dphi(),
            PhysicalEvent::Pair(p)    => p.angular_uncertainty.filter(|s| *s > 0.0),
            _ => None,
        };
        measured.map(|sigma| sigma + self.inflation)
    }
}

impl ResponseModel for UncertaintyGaussian {

    fn analyze_event(&mut self, event: &PhysicalEvent) -> bool {
        self.current = self.sigma(event).and_then(|sigma| Gauss::new(sigma, self.cutoff));
        self.current.is_some()
    }

    fn response(&self, offset: f64) -> Densityf64 {
        self.current.map_or(0.0, |g| g.density(offset))
    }

    fn support_min(&self) -> f64 { self.current.map_or(0.0, |g| -g.half_width()) }
    fn support_max(&self) -> f64 { self.current.map_or(0.0, |g|  g.half_width()) }
    fn integral   (&self) -> f64 { self.current.map_or(0.0, |g| g.integral()) }
    fn maximum    (&self) -> f64 { self.current.map_or(0.0, |g| g.peak()) }
}
