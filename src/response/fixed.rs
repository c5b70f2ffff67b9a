use units::{radian_, ratio_, cm_, Angle, Length, Ratio};
use units::todo::Densityf64;

use crate::error::{Error, Result};
use crate::event::PhysicalEvent;
use super::{gauss::Gauss, ResponseModel};

/// Gaussian responses with one fixed width per topology
#[derive(Clone, Debug)]
pub struct FixedGaussian {
    transversal: Gauss,
    longitudinal: Gauss,
    pair: Gauss,
    pet: Option<Gauss>,
    cutoff: f64,
    current: Option<Shape>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Shape { Transversal, Track, Pair, Pet }

impl FixedGaussian {

    pub fn new(transversal: Angle, longitudinal: Angle, pair: Angle, cutoff: Ratio) -> Result<Self> {
        let cutoff = ratio_(cutoff);
        let gauss = |name: &str, sigma: f64| Gauss::new(sigma, cutoff)
            .ok_or_else(|| Error::Config(format!("{name} sigma {sigma} with cutoff {cutoff} is not usable")));
        Ok(Self {
            transversal : gauss("transversal" , radian_(transversal ))?,
            longitudinal: gauss("longitudinal", radian_(longitudinal))?,
            pair        : gauss("pair"        , radian_(pair        ))?,
            pet: None,
            cutoff,
            current: None,
        })
    }

    /// Enable PET events, with the given width of the line of response
    pub fn with_pet(self, sigma: Length) -> Result<Self> {
        let pet = Gauss::new(cm_(sigma), self.cutoff)
            .ok_or_else(|| Error::Config(format!("PET sigma {sigma:?} is not usable")))?;
        Ok(Self { pet: Some(pet), ..self })
    }

    fn gauss(&self) -> Option<&Gauss> {
        self.current.and_then(|shape| match shape {
            Shape::Transversal | Shape::Track => Some(&self.transversal),
            Shape::Pair                       => Some(&self.pair),
            Shape::Pet                        => self.pet.as_ref(),
        })
    }
}

impl ResponseModel for FixedGaussian {

    fn analyze_event(&mut self, event: &PhysicalEvent) -> bool {
        self.current = match event {
            PhysicalEvent::Compton(c) if c.track.is_some() => Some(Shape::Track),
            PhysicalEvent::Compton(_)                      => Some(Shape::Transversal),
            PhysicalEvent::Pair(_)                         => Some(Shape::Pair),
            PhysicalEvent::Pet(_) if self.pet.is_some()    => Some(Shape::Pet),
            _                                              => None,
        };
        self.current.is_some()
    }

    fn response(&self, offset: f64) -> Densityf64 {
        self.gauss().map_or(0.0, |g| g.density(offset))
    }

    fn has_longitudinal(&self) -> bool { self.current == Some(Shape::Track) }

    fn response_with_track(&self, transversal: f64, longitudinal: f64) -> Densityf64 {
        if self.has_longitudinal() {
            self.transversal.density(transversal) * self.longitudinal.density(longitudinal)
        } else {
            self.response(transversal)
        }
    }

    fn support_min(&self) -> f64 { self.gauss().map_or(0.0, |g| -g.half_width()) }
    fn support_max(&self) -> f64 { self.gauss().map_or(0.0, |g|  g.half_width()) }

    fn integral(&self) -> f64 {
        let transversal = self.gauss().map_or(0.0, Gauss::integral);
        if self.has_longitudinal() { transversal * self.longitudinal.integral() } else { transversal }
    }

    fn maximum(&self) -> Densityf64 {
        let transversal = self.gauss().map_or(0.0, Gauss::peak);
        if self.has_longitudinal() { transversal * self.longitudinal.peak() } else { transversal }
    }
}
