use crate::{Point, Vector};
use units::todo::{Anglef64, Lengthf64};

/// A position in spherical coordinates: colatitude `theta` measured from +z,
/// azimuth `phi` measured from +x towards +y.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spherical {
    pub theta: Anglef64,
    pub phi  : Anglef64,
    pub r    : Lengthf64,
}

impl Spherical {
    pub fn new(theta: Anglef64, phi: Anglef64, r: Lengthf64) -> Self { Self { theta, phi, r } }
    pub fn to_cartesian(self) -> Point { to_cartesian(self) }
}

pub fn to_cartesian(Spherical { theta, phi, r }: Spherical) -> Point {
    let (sin_t, cos_t) = theta.sin_cos();
    let (sin_p, cos_p) = phi  .sin_cos();
    Vector::new(r * sin_t * cos_p,
                r * sin_t * sin_p,
                r * cos_t)
}

/// Inverse of `to_cartesian`. The origin maps to `theta = phi = r = 0`, points on
/// the z-axis get `phi = 0`.
pub fn to_spherical(p: &Point) -> Spherical {
    let rho = p.x.hypot(p.y);
    let r = p.norm();
    let theta = rho.atan2(p.z);
    let phi = if rho == 0.0 { 0.0 } else { p.y.atan2(p.x) };
    Spherical { theta, phi, r }
}

/// Angle between two vectors, in `[0, π]`.
///
/// `atan2(|a×b|, a·b)` stays accurate for nearly (anti-)parallel vectors, where
/// `acos` of the normalized dot product loses all precision. Zero-length input
/// yields zero.
pub fn angle_between(a: &Vector, b: &Vector) -> Anglef64 {
    a.cross(b).norm().atan2(a.dot(b))
}

/// Shortest distance from `point` to the infinite line through `a` and `b`.
///
/// Returns `None` if `a` and `b` coincide.
pub fn distance_to_line(point: &Point, a: &Point, b: &Point) -> Option<Lengthf64> {
    let along = b - a;
    let length = along.norm();
    if length == 0.0 { return None }
    Some((point - a).cross(&along).norm() / length)
}

/// The angle of a spherical triangle opposite side `c`, given the three sides
/// (arc lengths on the unit sphere), from the half-angle formula
///
/// `tan²(γ/2) = sin(s−a) sin(s−b) / (sin s · sin(s−c))`, `s = (a+b+c)/2`
///
/// Degenerate triangles (numerator or denominator zero) give `0` or `π` as the
/// limits dictate.
pub fn spherical_triangle_angle(a: Anglef64, b: Anglef64, c: Anglef64) -> Anglef64 {
    let s = 0.5 * (a + b + c);
    let numerator   = (s - a).sin() * (s - b).sin();
    let denominator =  s     .sin() * (s - c).sin();
    let t = (numerator / denominator).abs();
    if t.is_nan() { return 0.0 }
    2.0 * t.sqrt().atan()
}


#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use float_eq::assert_float_eq;
    use proptest::prelude::*;
    use std::f64::consts::{PI, FRAC_PI_2, FRAC_PI_4};

    #[rstest(/**/ theta,     phi,         expected,
             case(0.0,       0.0,        [ 0.0,  0.0,  1.0]),
             case(PI,        0.0,        [ 0.0,  0.0, -1.0]),
             case(FRAC_PI_2, 0.0,        [ 1.0,  0.0,  0.0]),
             case(FRAC_PI_2, FRAC_PI_2,  [ 0.0,  1.0,  0.0]),
             case(FRAC_PI_2, PI,         [-1.0,  0.0,  0.0]),
             case(FRAC_PI_2, -FRAC_PI_2, [ 0.0, -1.0,  0.0]),
    )]
    fn unit_sphere_landmarks(theta: f64, phi: f64, expected: [f64; 3]) {
        let p = to_cartesian(Spherical::new(theta, phi, 1.0));
        assert_float_eq!([p.x, p.y, p.z], expected, abs <= [1e-15; 3]);
    }

    #[rstest(/**/ a,                      b,                       expected,
             case(Vector::new(1.,0.,0.),  Vector::new(1.,0.,0.),   0.0),
             case(Vector::new(1.,0.,0.),  Vector::new(0.,3.,0.),   FRAC_PI_2),
             case(Vector::new(1.,0.,0.),  Vector::new(-2.,0.,0.),  PI),
             case(Vector::new(1.,1.,0.),  Vector::new(0.,1.,0.),   FRAC_PI_4),
             case(Vector::new(0.,0.,0.),  Vector::new(0.,1.,0.),   0.0),
    )]
    fn angles(a: Vector, b: Vector, expected: f64) {
        assert_float_eq!(angle_between(&a, &b), expected, ulps <= 2);
    }

    #[test]
    fn tiny_angles_keep_precision() {
        let a = Vector::new(1.0, 0.0, 0.0);
        let b = Vector::new(1.0, 1e-9, 0.0);
        assert_float_eq!(angle_between(&a, &b), 1e-9, rel <= 1e-6);
    }

    #[test]
    fn distance_from_line() {
        let a = Vector::new(0.0, 0.0, -5.0);
        let b = Vector::new(0.0, 0.0,  5.0);
        let p = Vector::new(3.0, 4.0, 17.0);
        assert_float_eq!(distance_to_line(&p, &a, &b).unwrap(), 5.0, ulps <= 2);
        assert_eq!(distance_to_line(&p, &a, &a), None);
    }

    #[test]
    fn right_angled_octant_triangle() {
        // The triangle with vertices on the x, y and z axes has all sides and
        // all angles equal to π/2.
        assert_float_eq!(spherical_triangle_angle(FRAC_PI_2, FRAC_PI_2, FRAC_PI_2), FRAC_PI_2, ulps <= 4);
    }

    proptest! {
        #[test]
        fn spherical_roundtrip(
            theta in 0.01..(PI - 0.01),
            phi   in -3.1..3.1_f64,
            r     in 0.1..1e4_f64,
        ) {
            let s = to_spherical(&to_cartesian(Spherical::new(theta, phi, r)));
            assert_float_eq!([s.theta, s.phi, s.r], [theta, phi, r], rel <= [1e-9; 3]);
        }

        #[test]
        fn triangle_angle_matches_dihedral(
            t1 in 0.1..3.0_f64, p1 in -3.0..3.0_f64,
            t2 in 0.1..3.0_f64, p2 in -3.0..3.0_f64,
        ) {
            // Triangle with one vertex at the pole: the angle at the pole is the
            // azimuthal separation of the other two vertices.
            let pole = Vector::z();
            let u = to_cartesian(Spherical::new(t1, p1, 1.0));
            let v = to_cartesian(Spherical::new(t2, p2, 1.0));
            let a = angle_between(&pole, &u);
            let b = angle_between(&pole, &v);
            let c = angle_between(&u, &v);
            let mut dphi = (p1 - p2).abs() % (2.0 * PI);
            if dphi > PI { dphi = 2.0 * PI - dphi }
            assert_float_eq!(spherical_triangle_angle(a, b, c), dphi, abs <= 1e-6);
        }
    }
}
