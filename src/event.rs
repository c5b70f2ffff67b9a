//! Reconstructed physical events, as delivered by the upstream event parser.
//!
//! Positions are in cm and energies in keV, both in the detector frame. An
//! optional `pose` places the detector frame in the reference frame in which
//! the image grid is defined (e.g. the attitude of a balloon-borne instrument).

use geometry::{angle_between, Frame, Point, Vector};
use units::todo::{Anglef64, Energyf64, Lengthf64};
use units::{cm_, kev_, radian_, Angle, Energy, Length, ELECTRON_MASS_KEV as ME};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    Compton,
    Pair,
    Photo,
    Pet,
    Multi,
    Unidentifiable,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PhysicalEvent {
    Compton(ComptonEvent),
    Pair(PairEvent),
    Photo(PhotoEvent),
    Pet(PetEvent),
    /// Several independently-measured sub-events of the same origin
    Multi(Vec<PhysicalEvent>),
    Unidentifiable,
}

impl PhysicalEvent {
    pub fn topology(&self) -> Topology {
        match self {
            Self::Compton(_)     => Topology::Compton,
            Self::Pair(_)        => Topology::Pair,
            Self::Photo(_)       => Topology::Photo,
            Self::Pet(_)         => Topology::Pet,
            Self::Multi(_)       => Topology::Multi,
            Self::Unidentifiable => Topology::Unidentifiable,
        }
    }
}

impl From<ComptonEvent> for PhysicalEvent { fn from(e: ComptonEvent) -> Self { Self::Compton(e) } }
impl From<PairEvent>    for PhysicalEvent { fn from(e: PairEvent   ) -> Self { Self::Pair   (e) } }
impl From<PhotoEvent>   for PhysicalEvent { fn from(e: PhotoEvent  ) -> Self { Self::Photo  (e) } }
impl From<PetEvent>     for PhysicalEvent { fn from(e: PetEvent    ) -> Self { Self::Pet    (e) } }

// ----- Compton ---------------------------------------------------------------------

/// A photon scattered at `first` and absorbed (or further scattered) at
/// `second`.
#[derive(Clone, Debug, PartialEq)]
pub struct ComptonEvent {
    /// Compton scatter angle
    pub phi: Anglef64,
    /// Unit cone axis, pointing from the second towards the first interaction,
    /// i.e. back towards the source side of the cone
    pub axis: Vector,
    pub first: Point,
    pub second: Point,
    pub e_electron: Energyf64,
    pub e_gamma: Energyf64,
    pub de_electron: Energyf64,
    pub de_gamma: Energyf64,
    pub d_first: Vector,
    pub d_second: Vector,
    /// Direction of the recoil electron, if its track was measured
    pub track: Option<Vector>,
    /// Number of interactions in the reconstructed sequence
    pub sequence_length: usize,
    pub pose: Frame,
}

impl ComptonEvent {

    /// Reconstruct the cone from the electron and scattered-gamma energies and
    /// the first two interaction positions (in cm).
    ///
    /// Returns `None` if the energies are kinematically impossible or the
    /// interactions coincide.
    pub fn from_interactions(e_electron: Energy, e_gamma: Energy, first: Point, second: Point) -> Option<Self> {
        let (ee, eg) = (kev_(e_electron), kev_(e_gamma));
        if !(ee > 0.0 && eg > 0.0) { return None }
        let cos_phi = 1.0 - ME / eg + ME / (ee + eg);
        if !(-1.0..=1.0).contains(&cos_phi) { return None }
        let axis = (first - second).try_normalize(0.0)?;
        Some(Self {
            phi: cos_phi.acos(),
            axis, first, second,
            e_electron: ee,
            e_gamma: eg,
            de_electron: 0.0,
            de_gamma: 0.0,
            d_first: Vector::zeros(),
            d_second: Vector::zeros(),
            track: None,
            sequence_length: 2,
            pose: Frame::identity(),
        })
    }

    /// An event whose cone has the given opening angle and axis, scattered at
    /// `first`, of a photon with initial energy `e_initial`. The second
    /// interaction is placed 1 cm along `-axis`; adjust with `with_lever_arm`.
    ///
    /// Returns `None` if the axis has zero length or `phi` is outside `(0, π)`.
    pub fn from_cone(phi: Angle, axis: Vector, first: Point, e_initial: Energy) -> Option<Self> {
        let phi = radian_(phi);
        if !(phi > 0.0 && phi < std::f64::consts::PI) { return None }
        let axis = axis.try_normalize(0.0)?;
        let ei = kev_(e_initial);
        let eg = ei / (1.0 + ei / ME * (1.0 - phi.cos()));
        Some(Self {
            phi,
            axis,
            first,
            second: first - axis,
            e_electron: ei - eg,
            e_gamma: eg,
            de_electron: 0.0,
            de_gamma: 0.0,
            d_first: Vector::zeros(),
            d_second: Vector::zeros(),
            track: None,
            sequence_length: 2,
            pose: Frame::identity(),
        })
    }

    pub fn with_energy_uncertainties(self, de_electron: Energy, de_gamma: Energy) -> Self {
        Self { de_electron: kev_(de_electron), de_gamma: kev_(de_gamma), ..self }
    }

    /// Per-component position uncertainties of the first two interactions, in cm
    pub fn with_position_uncertainties(self, d_first: Vector, d_second: Vector) -> Self {
        Self { d_first, d_second, ..self }
    }

    pub fn with_track(self, direction: Vector) -> Self {
        Self { track: direction.try_normalize(0.0), ..self }
    }

    pub fn with_sequence_length(self, sequence_length: usize) -> Self {
        Self { sequence_length, ..self }
    }

    pub fn with_lever_arm(self, distance: Length) -> Self {
        Self { second: self.first - self.axis * cm_(distance), ..self }
    }

    pub fn with_pose(self, pose: Frame) -> Self { Self { pose, ..self } }

    pub fn e_initial(&self) -> Energyf64 { self.e_electron + self.e_gamma }

    /// Distance between the first two interactions
    pub fn lever_arm(&self) -> Lengthf64 { (self.second - self.first).norm() }

    /// Angle between the incoming photon and the recoil electron
    pub fn epsilon(&self) -> Anglef64 {
        let (ee, ei) = (self.e_electron, self.e_initial());
        let cos_eps = ee * (ei + ME) / (ei * (ee * (ee + 2.0 * ME)).sqrt());
        cos_eps.clamp(-1.0, 1.0).acos()
    }

    /// Propagated 1σ uncertainty on the scatter angle, from the energy and
    /// position uncertainties. `None` if no uncertainties are known, or they
    /// cannot be propagated.
    pub fn dphi(&self) -> Option<Anglef64> {
        let (eg, ei) = (self.e_gamma, self.e_initial());
        let cos_phi = 1.0 - ME / eg + ME / ei;
        let sin2 = 1.0 - cos_phi * cos_phi;
        let d_eg = ME / (eg * eg) - ME / (ei * ei);
        let d_ee = ME / (ei * ei);
        let dphi_e2 = (d_eg * d_eg * self.de_gamma   * self.de_gamma +
                       d_ee * d_ee * self.de_electron * self.de_electron) / sin2;

        // Geometric part: how far the cone axis swings when each position
        // component is shifted by its uncertainty
        let mut dphi_a2 = 0.0;
        for k in 0..3 {
            let mut first = Vector::zeros();
            let mut second = Vector::zeros();
            first [k] = self.d_first [k];
            second[k] = self.d_second[k];
            dphi_a2 += self.axis_swing(first, Vector::zeros()).powi(2);
            dphi_a2 += self.axis_swing(Vector::zeros(), second).powi(2);
        }
        let dphi = (dphi_e2 + dphi_a2).sqrt();
        (dphi.is_finite() && dphi > 0.0).then_some(dphi)
    }

    fn axis_swing(&self, shift_first: Vector, shift_second: Vector) -> Anglef64 {
        if shift_first == Vector::zeros() && shift_second == Vector::zeros() { return 0.0 }
        let moved = (self.first + shift_first) - (self.second + shift_second);
        angle_between(&moved, &self.axis)
    }

    /// The most probable origin direction on the cone, given the electron
    /// track: the incoming direction reconstructed from momentum conservation,
    /// projected onto the cone. Detector frame; `None` without a track.
    pub fn origin_on_cone(&self) -> Option<Vector> {
        let track = self.track?;
        let scattered = -self.axis;
        let p_electron = (self.e_electron * (self.e_electron + 2.0 * ME)).sqrt();
        let incoming = scattered * self.e_gamma + track * p_electron;
        let origin = -incoming;
        let perpendicular = (origin - self.axis * origin.dot(&self.axis))
            .try_normalize(1e-12)
            .unwrap_or_else(|| any_perpendicular(&self.axis));
        Some(self.axis * self.phi.cos() + perpendicular * self.phi.sin())
    }
}

fn any_perpendicular(v: &Vector) -> Vector {
    let helper = if v.x.abs() < 0.9 { Vector::x() } else { Vector::y() };
    v.cross(&helper).normalize()
}

// ----- Pair ------------------------------------------------------------------------

/// A photon converted into an electron-positron pair at `conversion`
#[derive(Clone, Debug, PartialEq)]
pub struct PairEvent {
    pub conversion: Point,
    /// Unit direction of travel of the incoming photon
    pub incoming: Vector,
    pub e_initial: Energyf64,
    /// 1σ angular uncertainty on `incoming`, if known
    pub angular_uncertainty: Option<Anglef64>,
    pub pose: Frame,
}

impl PairEvent {
    pub fn new(conversion: Point, incoming: Vector, e_initial: Energy) -> Option<Self> {
        Some(Self {
            conversion,
            incoming: incoming.try_normalize(0.0)?,
            e_initial: kev_(e_initial),
            angular_uncertainty: None,
            pose: Frame::identity(),
        })
    }

    pub fn with_angular_uncertainty(self, sigma: Angle) -> Self {
        Self { angular_uncertainty: Some(radian_(sigma)), ..self }
    }

    pub fn with_pose(self, pose: Frame) -> Self { Self { pose, ..self } }
}

// ----- Photo -----------------------------------------------------------------------

/// Full absorption in a single interaction: no directional information
#[derive(Clone, Debug, PartialEq)]
pub struct PhotoEvent {
    pub position: Point,
    pub energy: Energyf64,
    pub pose: Frame,
}

impl PhotoEvent {
    pub fn new(position: Point, energy: Energy) -> Self {
        Self { position, energy: kev_(energy), pose: Frame::identity() }
    }
}

// ----- PET -------------------------------------------------------------------------

/// Two back-to-back annihilation photons detected at `first` and `second`
#[derive(Clone, Debug, PartialEq)]
pub struct PetEvent {
    pub first: Point,
    pub second: Point,
    /// 1σ position uncertainties of the two detections, if known
    pub d_first: Option<Lengthf64>,
    pub d_second: Option<Lengthf64>,
    pub pose: Frame,
}

impl PetEvent {
    pub fn new(first: Point, second: Point) -> Self {
        Self { first, second, d_first: None, d_second: None, pose: Frame::identity() }
    }

    pub fn with_position_uncertainties(self, d_first: Length, d_second: Length) -> Self {
        Self { d_first: Some(cm_(d_first)), d_second: Some(cm_(d_second)), ..self }
    }

    pub fn with_pose(self, pose: Frame) -> Self { Self { pose, ..self } }
}


#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;
    use units::{deg, deg_, kev, cm};

    #[rstest(/**/ phi_deg, e_initial,
             case( 10.0,   511.0),
             case( 30.0,   662.0),
             case( 90.0,  1000.0),
             case(150.0,   200.0),
    )]
    fn cone_and_interactions_agree(phi_deg: f64, e_initial: f64) {
        let cone = ComptonEvent::from_cone(deg(phi_deg), Vector::z(), Vector::zeros(), kev(e_initial)).unwrap();
        let measured = ComptonEvent::from_interactions(kev(cone.e_electron), kev(cone.e_gamma), cone.first, cone.second).unwrap();
        assert_float_eq!(deg_(units::radian(measured.phi)), phi_deg, abs <= 1e-9);
        assert_float_eq!(measured.e_initial(), e_initial, rel <= 1e-12);
        assert_float_eq!(measured.axis.z, 1.0, ulps <= 1);
    }

    #[test]
    fn impossible_kinematics_are_refused() {
        // Very low gamma energy after a high-energy electron: cos φ < -1
        let event = ComptonEvent::from_interactions(kev(2000.0), kev(10.0), Vector::zeros(), Vector::x());
        assert!(event.is_none());
        let coincident = ComptonEvent::from_interactions(kev(100.0), kev(400.0), Vector::x(), Vector::x());
        assert!(coincident.is_none());
    }

    #[test]
    fn lever_arm_moves_second_interaction() {
        let event = ComptonEvent::from_cone(deg(40.0), Vector::x(), Vector::zeros(), kev(662.0)).unwrap()
            .with_lever_arm(cm(7.5));
        assert_float_eq!(event.lever_arm(), 7.5, ulps <= 1);
        assert_float_eq!(event.second.x, -7.5, ulps <= 1);
    }

    #[test]
    fn dphi_needs_some_uncertainty() {
        let event = ComptonEvent::from_cone(deg(40.0), Vector::z(), Vector::zeros(), kev(662.0)).unwrap();
        assert_eq!(event.dphi(), None);
        let with_energy = event.clone().with_energy_uncertainties(kev(2.0), kev(3.0));
        let with_both = with_energy.clone()
            .with_position_uncertainties(Vector::repeat(0.1), Vector::repeat(0.1));
        let e_only = with_energy.dphi().unwrap();
        let both   = with_both  .dphi().unwrap();
        assert!(e_only > 0.0);
        assert!(both > e_only);
    }

    #[test]
    fn origin_on_cone_is_on_cone() {
        let event = ComptonEvent::from_cone(deg(35.0), Vector::z(), Vector::zeros(), kev(1000.0)).unwrap()
            .with_track(Vector::new(1.0, 0.2, -0.5));
        let origin = event.origin_on_cone().unwrap();
        assert_float_eq!(angle_between(&origin, &event.axis), event.phi, abs <= 1e-12);
        assert_float_eq!(origin.norm(), 1.0, abs <= 1e-12);
    }

    #[test]
    fn topology_tags() {
        let pet = PetEvent::new(Vector::x(), -Vector::x());
        assert_eq!(PhysicalEvent::from(pet).topology(), Topology::Pet);
        assert_eq!(PhysicalEvent::Multi(vec![]).topology(), Topology::Multi);
        assert_eq!(PhysicalEvent::Unidentifiable.topology(), Topology::Unidentifiable);
    }
}
