//! The discretized image space: bins in azimuth `phi`, colatitude `theta` and
//! radius `r`.
//!
//! Two flavours exist:
//!
//! + `Spherical`: the far-field sky. Event directions are rotated into the
//!   image frame and compared with bin-centre directions; radius only labels
//!   shells.
//!
//! + `NearFieldSpherical`: bins are volumes at finite distance. Bin centres are
//!   cached as Cartesian positions in the detector (reference) frame, using the
//!   grid's rotation and translation.

use std::f64::consts::{PI, TAU};
use std::sync::Arc;

use geometry::{Frame, Point, Spherical, Vector};
use units::todo::{Anglef64, Lengthf64, Volumef64};
use units::{cm_, radian_, Angle, Length};

use crate::error::{Error, Result};
use crate::index::{index1_to_3, index3_to_1, BinDim_u, Index1_u, Index3_u};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridKind {
    Spherical,
    NearFieldSpherical,
}

/// Range and number of bins along one axis, in radians or cm.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisBins {
    pub min: f64,
    pub max: f64,
    pub bins: usize,
}

impl AxisBins {
    pub fn new(min: f64, max: f64, bins: usize) -> Self { Self { min, max, bins } }

    pub fn angular(min: Angle, max: Angle, bins: usize) -> Self {
        Self::new(radian_(min), radian_(max), bins)
    }

    pub fn radial(min: Length, max: Length, bins: usize) -> Self {
        Self::new(cm_(min), cm_(max), bins)
    }

    pub fn width(&self) -> f64 { (self.max - self.min) / self.bins as f64 }

    /// Lower edge of bin `i`; `edge(bins)` is the upper edge of the last bin
    pub fn edge(&self, i: usize) -> f64 { self.min + i as f64 * self.width() }

    pub fn center(&self, i: usize) -> f64 { self.min + (i as f64 + 0.5) * self.width() }

    fn validate(&self, axis: &'static str) -> Result<()> {
        let fail = |reason: String| Err(Error::InvalidDimension { axis, reason });
        if self.bins < 1 { return fail("needs at least one bin".into()) }
        if !(self.min.is_finite() && self.max.is_finite()) {
            return fail(format!("non-finite range [{}, {}]", self.min, self.max))
        }
        if self.min >= self.max {
            return fail(format!("minimum {} not below maximum {}", self.min, self.max))
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Grid {
    kind: GridKind,
    phi: AxisBins,
    theta: AxisBins,
    radius: AxisBins,
    frame: Frame,
    tables: Option<Arc<BinTables>>,
}

/// Per-bin lookup tables, rebuilt by `Grid::prepare_backprojection`.
#[derive(Debug)]
pub struct BinTables {
    pub kind: GridKind,
    pub n: BinDim_u,
    /// Unit direction of each (phi, theta) bin centre in the image frame,
    /// indexed `iphi + itheta * nphi`
    pub directions: Vec<Vector>,
    /// Solid angle of each theta row: `Δφ |cos θ₁ − cos θ₂|`
    pub row_areas: Vec<f64>,
    /// Radial factor of each shell: `(r₂³ − r₁³) / 3`
    pub shell_factors: Vec<f64>,
    /// Bin-centre positions in the frame in which events are compared. Image
    /// frame for far-field grids; detector frame (rotated and translated) for
    /// near-field grids. Indexed by the linear bin index.
    pub centers: Vec<Point>,
    /// Colatitude of each theta row's centre
    pub row_thetas: Vec<Anglef64>,
    /// Inner radius of the grid
    pub radius_min: Lengthf64,
}

impl BinTables {
    pub fn n_bins(&self) -> usize { self.n[0] * self.n[1] * self.n[2] }

    pub fn volume(&self, i: Index1_u) -> Volumef64 {
        let [_, itheta, ir] = index1_to_3(i, self.n);
        self.row_areas[itheta] * self.shell_factors[ir]
    }

    pub fn direction(&self, i: Index1_u) -> &Vector {
        &self.directions[i % (self.n[0] * self.n[1])]
    }
}

impl Grid {

    pub fn new(kind: GridKind, phi: AxisBins, theta: AxisBins, radius: AxisBins) -> Result<Self> {
        let mut grid = Self { kind, phi, theta, radius, frame: Frame::identity(), tables: None };
        grid.set_dimensions(phi, theta, radius)?;
        Ok(grid)
    }

    pub fn kind(&self) -> GridKind { self.kind }
    pub fn phi   (&self) -> AxisBins { self.phi    }
    pub fn theta (&self) -> AxisBins { self.theta  }
    pub fn radius(&self) -> AxisBins { self.radius }
    pub fn frame (&self) -> Frame    { self.frame  }

    pub fn dims(&self) -> BinDim_u { [self.phi.bins, self.theta.bins, self.radius.bins] }
    pub fn n_bins(&self) -> usize { self.dims().iter().product() }

    /// Replace the axes. Invalidates the bin tables.
    pub fn set_dimensions(&mut self, phi: AxisBins, theta: AxisBins, radius: AxisBins) -> Result<()> {
        phi   .validate("phi")?;
        theta .validate("theta")?;
        radius.validate("radius")?;
        if phi.max - phi.min > TAU * (1.0 + 1e-12) {
            return Err(Error::InvalidDimension { axis: "phi", reason: "range exceeds a full turn".into() })
        }
        if theta.min < 0.0 || theta.max > PI * (1.0 + 1e-12) {
            return Err(Error::InvalidDimension { axis: "theta", reason: "range outside [0, π]".into() })
        }
        if radius.min < 0.0 {
            return Err(Error::InvalidDimension { axis: "radius", reason: "negative radius".into() })
        }
        self.phi = phi;
        self.theta = theta;
        self.radius = radius;
        self.tables = None;
        Ok(())
    }

    /// Orient the image by giving its x and z axes in detector coordinates.
    /// Invalidates the bin tables.
    pub fn set_rotation(&mut self, x_axis: Vector, z_axis: Vector) -> Result<()> {
        let translation = self.frame.translation;
        self.frame = Frame::from_axes(x_axis, z_axis)?.with_translation(translation);
        self.tables = None;
        Ok(())
    }

    /// Position of the image origin in detector coordinates (cm). Only
    /// meaningful for near-field grids. Invalidates the bin tables.
    pub fn set_translation(&mut self, translation: Vector) {
        self.frame = self.frame.with_translation(translation);
        self.tables = None;
    }

    pub fn is_prepared(&self) -> bool { self.tables.is_some() }

    pub fn tables(&self) -> Result<Arc<BinTables>> {
        self.tables.clone().ok_or(Error::GridNotPrepared)
    }

    /// Rebuild the bin-centre and bin-volume tables for the current
    /// dimensions and frame.
    pub fn prepare_backprojection(&mut self) {
        let n = self.dims();
        let [nphi, ntheta, nr] = n;

        let row_thetas: Vec<_> = (0..ntheta).map(|i| self.theta.center(i)).collect();
        let row_areas = (0..ntheta)
            .map(|i| {
                let (t1, t2) = (self.theta.edge(i), self.theta.edge(i + 1));
                (self.phi.width() * (t1.cos() - t2.cos())).abs()
            })
            .collect();
        let shell_factors = (0..nr)
            .map(|i| {
                let (r1, r2) = (self.radius.edge(i), self.radius.edge(i + 1));
                (r2.powi(3) - r1.powi(3)) / 3.0
            })
            .collect();

        let mut directions = Vec::with_capacity(nphi * ntheta);
        for &theta in &row_thetas {
            for iphi in 0..nphi {
                directions.push(Spherical::new(theta, self.phi.center(iphi), 1.0).to_cartesian());
            }
        }

        let mut centers = Vec::with_capacity(nphi * ntheta * nr);
        for ir in 0..nr {
            let r = self.radius.center(ir);
            for direction in &directions {
                let local = direction * r;
                centers.push(match self.kind {
                    GridKind::Spherical          => local,
                    GridKind::NearFieldSpherical => self.frame.point_to_global(&local),
                });
            }
        }

        self.tables = Some(Arc::new(BinTables {
            kind: self.kind,
            n,
            directions,
            row_areas,
            shell_factors,
            centers,
            row_thetas,
            radius_min: self.radius.min,
        }));
    }

    pub fn index(&self, i3: Index3_u) -> Index1_u { index3_to_1(i3, self.dims()) }

    /// Closed-form volume of the whole grid
    pub fn total_volume(&self) -> Volumef64 {
        let (r1, r2) = (self.radius.min, self.radius.max);
        (r2.powi(3) - r1.powi(3)) / 3.0 * self.total_solid_angle()
    }

    /// Closed-form solid angle covered by the grid
    pub fn total_solid_angle(&self) -> f64 {
        (self.theta.min.cos() - self.theta.max.cos()) * (self.phi.max - self.phi.min)
    }
}

/// Radius standing in for infinity in far-field grids (cm)
pub const FAR_AWAY: Lengthf64 = 1e20;
