use std::f64::consts::{SQRT_2, TAU};

use units::todo::{Densityf64, Ratiof64};

/// Default truncation of Gaussian responses, in sigmas
pub const DEFAULT_CUTOFF: Ratiof64 = 2.5;

/// Normal density of width `sigma`, truncated at `cutoff` sigmas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gauss {
    sigma: f64,
    cutoff: Ratiof64,
    peak: Densityf64,
}

impl Gauss {

    /// `None` unless `sigma` and `cutoff` are finite and positive
    pub fn new(sigma: f64, cutoff: Ratiof64) -> Option<Self> {
        let ok = |x: f64| x.is_finite() && x > 0.0;
        if !(ok(sigma) && ok(cutoff)) { return None }
        Some(Self { sigma, cutoff, peak: 1.0 / (sigma * TAU.sqrt()) })
    }

    pub fn sigma(&self) -> f64 { self.sigma }

    pub fn density(&self, dx: f64) -> Densityf64 {
        if dx.abs() <= self.half_width() {
            let y = dx / self.sigma;
            self.peak * (-0.5 * y * y).exp()
        } else {
            0.0
        }
    }

    pub fn half_width(&self) -> f64 { self.cutoff * self.sigma }

    pub fn peak(&self) -> Densityf64 { self.peak }

    /// Integral of the truncated density
    pub fn integral(&self) -> f64 { libm::erf(self.cutoff / SQRT_2) }
}
