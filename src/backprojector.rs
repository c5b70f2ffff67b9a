//! Conversion of one event into weights over the bins of a prepared grid.
//!
//! Each call goes through the stages
//!
//!   `Idle → Assimilated → Dispatched → Computed | Rejected`
//!
//! + Assimilation moves the event's geometry into the frame in which bins are
//!   compared: the event's own pose first, then the image rotation for
//!   far-field grids. Near-field grids keep positions in the reference frame,
//!   where their bin centres are cached.
//!
//! + Dispatch picks the per-topology kernel for the grid kind, after the
//!   response model has analyzed the event.
//!
//! + Bins are always visited in linear-index order, so identical inputs give
//!   bit-identical output.
//!
//! A `Backprojector` owns its response model, whose per-event state is
//! overwritten on every call: use one instance per thread.

pub mod sparse;
mod far_field;
mod near_field;

pub use sparse::{BackprojectionElement, SparseBackprojection, MINIMUM_SUM};

/// Empirical corrections applied only on near-field grids
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NearFieldTuning {
    /// Bins seen from the cone apex at more than this angle from the apex's
    /// own position vector get no weight
    pub off_axis_cutoff: Option<Anglef64>,
    /// Scale Compton weights by `|apex distance − inner radius| / bin distance`
    pub distance_weighting: bool,
}

impl Default for NearFieldTuning {
    fn default() -> Self {
        Self { off_axis_cutoff: Some(60_f64.to_radians()), distance_weighting: true }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Assimilated(Topology),
    Dispatched(Topology),
    Computed,
    Rejected(Rejection),
}

/// A Compton cone in the comparison frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cone {
    pub apex: Point,
    pub axis: Vector,
    pub phi: Anglef64,
    /// Most probable origin on the cone, for events with an electron track
    pub origin: Option<Vector>,
}

/// Pair-conversion vertex and the direction towards the source
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairAxis {
    pub conversion: Point,
    pub source: Vector,
}

/// PET line of response
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Line {
    pub first: Point,
    pub second: Point,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Assimilated<'e> {
    Compton(Cone),
    Pair(PairAxis),
    Photo,
    Pet(Line),
    Multi(&'e [PhysicalEvent]),
}

impl Assimilated<'_> {
    /// Whether every coordinate and angle is finite
    pub fn is_finite(&self) -> bool {
        let finite = |v: &Vector| v.iter().all(|x| x.is_finite());
        match self {
            Self::Compton(c) => c.phi.is_finite() && finite(&c.apex) && finite(&c.axis) &&
                                c.origin.as_ref().map_or(true, finite),
            Self::Pair(p)    => finite(&p.conversion) && finite(&p.source),
            Self::Pet(l)     => finite(&l.first) && finite(&l.second),
            Self::Photo | Self::Multi(_) => true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Backprojector {
    tables: Arc<BinTables>,
    frame: Frame,
    response: Response,
    tuning: NearFieldTuning,
    stage: Stage,
}

impl Backprojector {

    /// Fails with `GridNotPrepared` unless `grid.prepare_backprojection()` ran
    /// after its last change.
    pub fn new(grid: &Grid, response: Response) -> Result<Self, Error> {
        Ok(Self {
            tables: grid.tables()?,
            frame: grid.frame(),
            response,
            tuning: NearFieldTuning::default(),
            stage: Stage::Idle,
        })
    }

    pub fn with_near_field_tuning(self, tuning: NearFieldTuning) -> Self { Self { tuning, ..self } }

    pub fn stage(&self) -> Stage { self.stage }
    pub fn response(&self) -> &Response { &self.response }
    pub fn grid_kind(&self) -> GridKind { self.tables.kind }
    pub fn n_bins(&self) -> usize { self.tables.n_bins() }

    /// Express the event's geometry in the frame in which it is compared with
    /// bin centres.
    pub fn assimilate<'e>(&self, event: &'e PhysicalEvent) -> Result<Assimilated<'e>, Rejection> {
        let far = self.tables.kind == GridKind::Spherical;
        let direction = |pose: &Frame, v: &Vector| {
            let reference = pose.direction_to_global(v);
            if far { self.frame.direction_to_local(&reference) } else { reference }
        };
        let assimilated = match event {
            PhysicalEvent::Compton(c) => Assimilated::Compton(Cone {
                apex:   c.pose.point_to_global(&c.first),
                axis:   direction(&c.pose, &c.axis),
                phi:    c.phi,
                origin: c.origin_on_cone().map(|o| direction(&c.pose, &o)),
            }),
            PhysicalEvent::Pair(p) => Assimilated::Pair(PairAxis {
                conversion: p.pose.point_to_global(&p.conversion),
                source:     direction(&p.pose, &-p.incoming),
            }),
            PhysicalEvent::Photo(_) => Assimilated::Photo,
            PhysicalEvent::Pet(p) => Assimilated::Pet(Line {
                first:  p.pose.point_to_global(&p.first),
                second: p.pose.point_to_global(&p.second),
            }),
            PhysicalEvent::Multi(events) => Assimilated::Multi(events),
            PhysicalEvent::Unidentifiable => return Err(Rejection::UnsupportedTopology(Topology::Unidentifiable)),
        };
        if assimilated.is_finite() { Ok(assimilated) } else { Err(Instability::NonFinite.into()) }
    }

    /// The weights of all bins which may contain the origin of `event`
    pub fn backproject(&mut self, event: &PhysicalEvent) -> Result<SparseBackprojection, Rejection> {
        self.stage = Stage::Idle;
        let result = self.run(event);
        self.stage = match &result {
            Ok(_)          => Stage::Computed,
            Err(rejection) => {
                debug!("rejected {:?} event: {rejection}", event.topology());
                Stage::Rejected(*rejection)
            }
        };
        result
    }

    fn run(&mut self, event: &PhysicalEvent) -> Result<SparseBackprojection, Rejection> {
        let topology = event.topology();
        let assimilated = self.assimilate(event)?;
        self.stage = Stage::Assimilated(topology);

        match assimilated {
            Assimilated::Multi(events) => return self.multi(events),
            Assimilated::Photo => {
                self.stage = Stage::Dispatched(topology);
                return Ok(self.uniform()?.finish()?)
            }
            _ => {}
        }

        if let (GridKind::Spherical, Assimilated::Pet(_)) = (self.tables.kind, &assimilated) {
            return Err(Rejection::UnsupportedTopology(topology))
        }
        if !self.response.analyze_event(event) {
            return Err(Rejection::ResponseUnavailable(topology))
        }
        self.stage = Stage::Dispatched(topology);

        let (tables, response) = (&*self.tables, &self.response);
        let accumulated = match (tables.kind, assimilated) {
            (GridKind::Spherical,          Assimilated::Compton(c)) => far_field ::compton(tables, response, &c),
            (GridKind::Spherical,          Assimilated::Pair   (p)) => far_field ::pair   (tables, response, &p),
            (GridKind::NearFieldSpherical, Assimilated::Compton(c)) => near_field::compton(tables, response, &c, &self.tuning),
            (GridKind::NearFieldSpherical, Assimilated::Pair   (p)) => near_field::pair   (tables, response, &p),
            (GridKind::NearFieldSpherical, Assimilated::Pet    (l)) => near_field::pet    (tables, response, &l),
            _ => return Err(Rejection::UnsupportedTopology(topology)),
        };
        Ok(accumulated?.finish()?)
    }

    /// Photo-absorption carries no directional information
    fn uniform(&self) -> Result<Accumulator, Instability> {
        let n = self.tables.n_bins();
        let mut acc = Accumulator::with_capacity(n);
        for i in 0..n { acc.push(i, 1.0)? }
        Ok(acc)
    }

    /// Joint likelihood of independently measured sub-events: the point-wise
    /// product of their backprojections. Photo sub-events are left out.
    fn multi(&mut self, events: &[PhysicalEvent]) -> Result<SparseBackprojection, Rejection> {
        let mut joint: Option<SparseBackprojection> = None;
        for event in events.iter().filter(|e| e.topology() != Topology::Photo) {
            let part = self.run(event)?;
            let product = match joint {
                None        => part,
                Some(joint) => joint.multiply(&part),
            };
            if product.n_used_bins() == 0 { return Err(Instability::Empty.into()) }
            joint = Some(product);
        }
        let joint = joint.ok_or(Instability::Empty)?;
        Ok(validate(joint)?)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ComptonEvent, PairEvent, PetEvent, PhotoEvent};
    use crate::grid::AxisBins;
    use crate::index::index1_to_3;
    use crate::response::{FixedGaussian, UncertaintyGaussian};
    use float_eq::assert_float_eq;
    use geometry::angle_between;
    use proptest::prelude::*;
    use rstest::rstest;
    use units::{cm, deg, kev, ratio};
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    /// 80 φ × 40 θ × 1 r sky: θ rows are 4.5° wide
    fn sky() -> Grid {
        let mut grid = Grid::new(GridKind::Spherical,
                                 AxisBins::angular(deg(-180.0), deg(180.0), 80),
                                 AxisBins::angular(deg(   0.0), deg(180.0), 40),
                                 AxisBins::radial (cm(1e10), cm(1e12), 1)).unwrap();
        grid.prepare_backprojection();
        grid
    }

    fn fixed() -> Response {
        FixedGaussian::new(deg(2.0), deg(10.0), deg(4.0), ratio(2.5)).unwrap().into()
    }

    fn cone(phi: f64, axis: Vector) -> ComptonEvent {
        ComptonEvent::from_cone(deg(phi), axis, Vector::zeros(), kev(662.0)).unwrap()
    }

    fn theta_row(bin: usize) -> usize { index1_to_3(bin, [80, 40, 1])[1] }

    #[test]
    fn cone_at_the_pole() {
        let mut bp = Backprojector::new(&sky(), fixed()).unwrap();
        let result = bp.backproject(&cone(30.0, Vector::z()).into()).unwrap();
        assert_eq!(bp.stage(), Stage::Computed);

        // Only the rows centred at 29.25° and 33.75° are within 2.5σ = 5° of the cone
        assert_eq!(result.n_used_bins(), 160);
        assert!(result.bins.iter().all(|&b| theta_row(b) == 6 || theta_row(b) == 7));

        let (peak, _) = result.iter()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .unwrap();
        assert_eq!(theta_row(peak), 6);
        assert_float_eq!(result.maximum, bp.response().response((-0.75_f64).to_radians()), rel <= 1e-9);
    }

    #[test]
    fn identical_calls_give_identical_output() {
        let mut bp = Backprojector::new(&sky(), fixed()).unwrap();
        let event: PhysicalEvent = cone(47.0, Vector::new(0.3, -0.2, 0.9)).with_track(Vector::x()).into();
        let a = bp.backproject(&event).unwrap();
        let b = bp.backproject(&event).unwrap();
        assert_eq!(a.bins, b.bins);
        let bits = |s: &SparseBackprojection| s.weights.iter().map(|w| w.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn unprepared_grid_is_refused() {
        let grid = Grid::new(GridKind::Spherical,
                             AxisBins::new(-1.0, 1.0, 4),
                             AxisBins::new( 0.0, 1.0, 4),
                             AxisBins::new( 1.0, 2.0, 1)).unwrap();
        assert!(matches!(Backprojector::new(&grid, fixed()), Err(Error::GridNotPrepared)));
    }

    #[rstest(/**/ event, expected,
             case(PhysicalEvent::Unidentifiable,                         Rejection::UnsupportedTopology(Topology::Unidentifiable)),
             case(PetEvent::new(Vector::x(), -Vector::x()).into(),       Rejection::UnsupportedTopology(Topology::Pet)),
             case(PhysicalEvent::Multi(vec![]),                          Rejection::NumericInstability(Instability::Empty)),
    )]
    fn rejections_on_the_sky(event: PhysicalEvent, expected: Rejection) {
        let mut bp = Backprojector::new(&sky(), fixed()).unwrap();
        assert_eq!(bp.backproject(&event), Err(expected));
        assert_eq!(bp.stage(), Stage::Rejected(expected));
    }

    #[test]
    fn model_without_inputs_rejects_event() {
        let model = UncertaintyGaussian::new(deg(0.5), ratio(2.5)).unwrap();
        let mut bp = Backprojector::new(&sky(), model.into()).unwrap();
        let bare = cone(30.0, Vector::z());
        assert_eq!(bp.backproject(&bare.clone().into()), Err(Rejection::ResponseUnavailable(Topology::Compton)));
        let measured = bare.with_energy_uncertainties(kev(2.0), kev(2.0));
        assert!(bp.backproject(&measured.into()).is_ok());
    }

    #[test]
    fn photo_events_cover_the_whole_image() {
        let mut bp = Backprojector::new(&sky(), fixed()).unwrap();
        let result = bp.backproject(&PhotoEvent::new(Vector::zeros(), kev(511.0)).into()).unwrap();
        assert_eq!(result.n_used_bins(), bp.n_bins());
        assert!(result.weights.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn pair_direction_points_back_along_incoming_photon() {
        let mut bp = Backprojector::new(&sky(), fixed()).unwrap();
        // Photon travelling downwards: source at the pole
        let pair = PairEvent::new(Vector::zeros(), -Vector::z(), kev(50_000.0)).unwrap();
        let result = bp.backproject(&pair.into()).unwrap();
        // 2.5 × 4° = 10° reaches the rows centred at 2.25° and 6.75°
        assert!(result.bins.iter().all(|&b| theta_row(b) < 2));
        assert_eq!(result.n_used_bins(), 160);
    }

    #[test]
    fn rotated_image_follows_its_axes() {
        let mut rotated = sky();
        rotated.set_rotation(Vector::y(), Vector::x()).unwrap();
        rotated.prepare_backprojection();
        let mut plain   = Backprojector::new(&sky()   , fixed()).unwrap();
        let mut rotated = Backprojector::new(&rotated , fixed()).unwrap();
        let expected = plain  .backproject(&cone(30.0, Vector::z()).into()).unwrap();
        let got      = rotated.backproject(&cone(30.0, Vector::x()).into()).unwrap();
        assert_eq!(got.bins, expected.bins);
        assert_float_eq!(got.sum(), expected.sum(), rel <= 1e-9);
    }

    #[test]
    fn event_pose_is_applied_before_image_rotation() {
        let pose = Frame::from_axes(Vector::y(), Vector::x()).unwrap();
        let mut rotated = sky();
        rotated.set_rotation(Vector::y(), Vector::x()).unwrap();
        rotated.prepare_backprojection();
        let mut plain   = Backprojector::new(&sky()   , fixed()).unwrap();
        let mut rotated = Backprojector::new(&rotated , fixed()).unwrap();
        let expected = plain  .backproject(&cone(30.0, Vector::z()).into()).unwrap();
        // Detector z is reference x, which is image z
        let got      = rotated.backproject(&cone(30.0, Vector::z()).with_pose(pose).into()).unwrap();
        assert_eq!(got.bins, expected.bins);
    }

    // ----- Multi ----------------------------------------------------------------------------------------

    #[test]
    fn disjoint_sub_events_cancel() {
        let mut bp = Backprojector::new(&sky(), fixed()).unwrap();
        let north = cone(30.0,  Vector::z()).into();
        let south = cone(30.0, -Vector::z()).into();
        assert_eq!(bp.backproject(&PhysicalEvent::Multi(vec![north, south])),
                   Err(Rejection::NumericInstability(Instability::Empty)));
    }

    #[test]
    fn overlapping_sub_events_multiply() {
        let mut bp = Backprojector::new(&sky(), fixed()).unwrap();
        let a: PhysicalEvent = cone(30.0, Vector::z()).into();
        let b: PhysicalEvent = cone(60.0, Vector::x()).into();
        let (sa, sb) = (bp.backproject(&a).unwrap(), bp.backproject(&b).unwrap());
        let joint = bp.backproject(&PhysicalEvent::Multi(vec![a, b])).unwrap();
        assert!(joint.n_used_bins() > 0);
        assert!(joint.n_used_bins() < sa.n_used_bins().min(sb.n_used_bins()));
        assert_eq!(joint, sa.multiply(&sb));
    }

    #[test]
    fn photo_sub_events_are_ignored() {
        let mut bp = Backprojector::new(&sky(), fixed()).unwrap();
        let compton: PhysicalEvent = cone(30.0, Vector::z()).into();
        let photo = PhotoEvent::new(Vector::zeros(), kev(300.0)).into();
        let alone = bp.backproject(&compton).unwrap();
        let joint = bp.backproject(&PhysicalEvent::Multi(vec![photo, compton])).unwrap();
        assert_eq!(joint, alone);
    }

    // ----- Near field -----------------------------------------------------------------------------------

    fn volume(r_max: f64) -> Grid {
        let mut grid = Grid::new(GridKind::NearFieldSpherical,
                                 AxisBins::angular(deg(-180.0), deg(180.0), 36),
                                 AxisBins::angular(deg(   0.0), deg(180.0), 18),
                                 AxisBins::radial (cm(0.0), cm(r_max), 10)).unwrap();
        grid.prepare_backprojection();
        grid
    }

    #[test]
    fn near_field_cone_respects_support_and_cutoff() {
        let event: PhysicalEvent = ComptonEvent::from_cone(deg(30.0), Vector::z(), Vector::new(0.0, 0.0, 1.0), kev(662.0))
            .unwrap()
            .into();
        let grid = volume(50.0);
        let mut bp = Backprojector::new(&grid, fixed()).unwrap();
        let result = bp.backproject(&event).unwrap();
        let tables = grid.tables().unwrap();
        let apex = Vector::z();
        for (i, _) in result.iter() {
            let d = tables.centers[i] - apex;
            let offset = angle_between(&d, &Vector::z()) - 30_f64.to_radians();
            assert!(offset.abs() <= 5_f64.to_radians() + 1e-12);
        }

        let strict = NearFieldTuning { off_axis_cutoff: Some(20_f64.to_radians()), ..NearFieldTuning::default() };
        let mut bp = bp.with_near_field_tuning(strict);
        assert_eq!(bp.backproject(&event), Err(Rejection::NumericInstability(Instability::Empty)));
    }

    #[test]
    fn near_field_weights_without_distance_factor_are_densities() {
        let event: PhysicalEvent = ComptonEvent::from_cone(deg(40.0), Vector::z(), Vector::new(0.0, 0.0, 2.0), kev(662.0))
            .unwrap()
            .into();
        let tuning = NearFieldTuning { distance_weighting: false, ..NearFieldTuning::default() };
        let mut bp = Backprojector::new(&volume(30.0), fixed()).unwrap().with_near_field_tuning(tuning);
        let result = bp.backproject(&event).unwrap();
        let peak = bp.response().maximum();
        assert!(result.weights.iter().all(|&w| w <= peak));
    }

    #[test]
    fn near_field_pet_follows_the_line() {
        let grid = volume(20.0);
        let model = FixedGaussian::new(deg(2.0), deg(10.0), deg(4.0), ratio(2.5)).unwrap()
            .with_pet(cm(2.0)).unwrap();
        let mut bp = Backprojector::new(&grid, model.into()).unwrap();
        let (a, b) = (Vector::new(-30.0, 1.0, 0.0), Vector::new(30.0, 1.0, 0.0));
        let result = bp.backproject(&PetEvent::new(a, b).into()).unwrap();
        let tables = grid.tables().unwrap();
        assert!(result.n_used_bins() > 0);
        for (i, _) in result.iter() {
            let distance = geometry::distance_to_line(&tables.centers[i], &a, &b).unwrap();
            assert!(distance <= 5.0 + 1e-9);
        }
        let degenerate = PetEvent::new(a, a).into();
        assert_eq!(bp.backproject(&degenerate), Err(Rejection::NumericInstability(Instability::NonFinite)));
    }

    proptest! {
        #[test]
        fn weights_are_always_finite(
            phi in 0.5..179.5_f64,
            x in -1.0..1.0_f64, y in -1.0..1.0_f64, z in -1.0..1.0_f64,
            energy in 100.0..5000.0_f64,
            track in proptest::option::of((-1.0..1.0_f64, -1.0..1.0_f64, -1.0..1.0_f64)),
        ) {
            prop_assume!(x*x + y*y + z*z > 1e-3);
            let mut event = ComptonEvent::from_cone(deg(phi), Vector::new(x, y, z), Vector::zeros(), kev(energy)).unwrap();
            if let Some((tx, ty, tz)) = track { event = event.with_track(Vector::new(tx, ty, tz)) }
            let mut bp = Backprojector::new(&sky(), fixed()).unwrap();
            if let Ok(result) = bp.backproject(&event.into()) {
                prop_assert!(result.n_used_bins() > 0);
                prop_assert!(result.weights.iter().all(|w| w.is_finite() && *w > 0.0));
                prop_assert!(result.bins.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::sync::Arc;

use geometry::{Frame, Point, Vector};
use tracing::debug;
use units::todo::Anglef64;

use crate::error::{Error, Instability, Rejection};
use crate::event::{PhysicalEvent, Topology};
use crate::grid::{BinTables, Grid, GridKind};
use crate::response::{Response, ResponseModel};
use sparse::{validate, Accumulator};
