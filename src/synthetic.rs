//! Synthetic events from a monoenergetic point source at infinity, for
//! driving the backprojection chain without an event file.
//!
//! Interactions happen uniformly inside a cubic detector centred on the
//! origin. Scatter angles are drawn uniformly in cosine (no Klein-Nishina
//! weighting); measured energies and positions are smeared with Gaussian
//! resolutions, which are also attached to the events as their uncertainties.

use std::f64::consts::TAU;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use geometry::{Point, Vector};
use units::todo::{Anglef64, Energyf64, Lengthf64};
use units::{cm_, kev, kev_, radian, radian_, Angle, Energy, Length, ELECTRON_MASS_KEV as ME};

use crate::event::{ComptonEvent, PairEvent, PhotoEvent, PhysicalEvent};

/// Give up on an event after this many kinematically impossible draws
const MAX_ATTEMPTS: usize = 100;

#[derive(Clone, Debug)]
pub struct PointSource<R> {
    /// Unit vector from the detector towards the source
    direction: Vector,
    energy: Energyf64,
    energy_resolution: Energyf64,
    position_resolution: Lengthf64,
    pair_resolution: Anglef64,
    half_size: Lengthf64,
    tracks: bool,
    pair_fraction: f64,
    photo_fraction: f64,
    rng: R,
}

impl<R: Rng> PointSource<R> {

    /// `None` if `direction` has zero length or `energy` is not positive
    pub fn new(direction: Vector, energy: Energy, rng: R) -> Option<Self> {
        let energy = kev_(energy);
        if !(energy > 0.0) { return None }
        Some(Self {
            direction: direction.try_normalize(0.0)?,
            energy,
            energy_resolution: 0.0,
            position_resolution: 0.0,
            pair_resolution: 0.0,
            half_size: 5.0,
            tracks: false,
            pair_fraction: 0.0,
            photo_fraction: 0.0,
            rng,
        })
    }

    pub fn with_energy_resolution  (self, sigma: Energy) -> Self { Self { energy_resolution  : kev_   (sigma), ..self } }
    pub fn with_position_resolution(self, sigma: Length) -> Self { Self { position_resolution: cm_    (sigma), ..self } }
    pub fn with_pair_resolution    (self, sigma: Angle ) -> Self { Self { pair_resolution    : radian_(sigma), ..self } }
    pub fn with_detector_size      (self, side : Length) -> Self { Self { half_size: cm_(side) / 2.0        , ..self } }
    pub fn with_tracks             (self, tracks: bool ) -> Self { Self { tracks, ..self } }

    /// Fractions of pair and photo events; the rest are Compton events
    pub fn with_topology_mix(self, pair: f64, photo: f64) -> Self {
        Self { pair_fraction: pair.clamp(0.0, 1.0), photo_fraction: photo.clamp(0.0, 1.0 - pair.clamp(0.0, 1.0)), ..self }
    }

    pub fn generate(&mut self) -> PhysicalEvent {
        let u: f64 = self.rng.gen();
        let event = if u < self.pair_fraction {
            self.retry(Self::pair).map(PhysicalEvent::from)
        } else if u < self.pair_fraction + self.photo_fraction {
            Some(self.photo().into())
        } else {
            self.retry(Self::compton).map(PhysicalEvent::from)
        };
        event.unwrap_or(PhysicalEvent::Unidentifiable)
    }

    fn retry<E>(&mut self, mut draw: impl FnMut(&mut Self) -> Option<E>) -> Option<E> {
        (0..MAX_ATTEMPTS).find_map(|_| draw(self))
    }

    fn compton(&mut self) -> Option<ComptonEvent> {
        let incoming = -self.direction;
        let cos_phi: f64 = self.rng.gen_range(-0.95..0.98);
        let sin_phi = (1.0 - cos_phi * cos_phi).sqrt();
        let azimuth = self.rng.gen_range(0.0..TAU);
        let (u, v) = perpendiculars(&incoming);
        let scattered = incoming * cos_phi + (u * azimuth.cos() + v * azimuth.sin()) * sin_phi;

        let e_gamma = self.energy / (1.0 + self.energy / ME * (1.0 - cos_phi));
        let e_electron = self.energy - e_gamma;
        let first = self.inside_detector();
        let second = first + scattered * self.rng.gen_range(0.5..10.0);

        let (de, dx) = (self.energy_resolution, self.position_resolution);
        let measured_e = e_electron + self.smear(de);
        let measured_g = e_gamma    + self.smear(de);
        let first_measured  = first  + self.smear_vector(dx);
        let second_measured = second + self.smear_vector(dx);

        let event = ComptonEvent::from_interactions(kev(measured_e), kev(measured_g), first_measured, second_measured)?
            .with_energy_uncertainties(kev(de), kev(de))
            .with_position_uncertainties(Vector::repeat(dx), Vector::repeat(dx));
        Some(if self.tracks {
            // Recoil electron carries the momentum the photon lost
            event.with_track(incoming * self.energy - scattered * e_gamma)
        } else {
            event
        })
    }

    fn pair(&mut self) -> Option<PairEvent> {
        let incoming = -self.direction;
        let (u, v) = perpendiculars(&incoming);
        let sigma = self.pair_resolution;
        let measured = incoming + u * self.smear(sigma) + v * self.smear(sigma);
        let event = PairEvent::new(self.inside_detector(), measured, kev(self.energy))?;
        Some(if sigma > 0.0 { event.with_angular_uncertainty(radian(sigma)) } else { event })
    }

    fn photo(&mut self) -> PhotoEvent {
        let position = self.inside_detector();
        let energy = self.energy + self.smear(self.energy_resolution);
        PhotoEvent::new(position, kev(energy))
    }

    fn inside_detector(&mut self) -> Point {
        let h = self.half_size;
        Point::new(self.rng.gen_range(-h..=h), self.rng.gen_range(-h..=h), self.rng.gen_range(-h..=h))
    }

    fn smear(&mut self, sigma: f64) -> f64 {
        if !(sigma > 0.0) { return 0.0 }
        Normal::new(0.0, sigma).map_or(0.0, |n| n.sample(&mut self.rng))
    }

    fn smear_vector(&mut self, sigma: f64) -> Vector {
        Vector::new(self.smear(sigma), self.smear(sigma), self.smear(sigma))
    }
}

/// An endless stream of events
impl<R: Rng> Iterator for PointSource<R> {
    type Item = PhysicalEvent;
    fn next(&mut self) -> Option<PhysicalEvent> { Some(self.generate()) }
}

/// Two unit vectors completing `w` to an orthonormal basis
fn perpendiculars(w: &Vector) -> (Vector, Vector) {
    let helper = if w.x.abs() < 0.9 { Vector::x() } else { Vector::y() };
    let u = w.cross(&helper).normalize();
    (u, w.cross(&u))
}
