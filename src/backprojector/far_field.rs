//! Backprojection onto directions at infinity. Only the (phi, theta) shell is
//! computed; the radial shells all receive the same weights.

/// Tolerance on the row-skipping bounds, in radians
const ROW_MARGIN: Anglef64 = 1e-9;

pub(super) fn compton(tables: &BinTables, response: &Response, cone: &Cone) -> Result<Accumulator, Instability> {
    let [nphi, ntheta, nr] = tables.n;
    let (smin, smax) = (response.support_min(), response.support_max());
    let (lo, hi) = (cone.phi + smin, cone.phi + smax);
    let axis_theta = angle_between(&cone.axis, &Vector::z());

    // Longitudinal geometry, only if the model wants it
    let origin = cone.origin
        .filter(|_| response.has_longitudinal())
        .map(|o| (o, angle_between(&cone.axis, &o)));

    let mut shell = Accumulator::with_capacity(nphi * ntheta / 4);
    for itheta in 0..ntheta {
        // Range of angular distances between the axis and any direction in
        // this row: skip the row if it cannot reach the cone's support
        let row = tables.row_thetas[itheta];
        let nearest  = (row - axis_theta).abs();
        let farthest = (row + axis_theta).min(TAU - row - axis_theta);
        if farthest < lo - ROW_MARGIN || nearest > hi + ROW_MARGIN { continue }

        for iphi in 0..nphi {
            let i = iphi + itheta * nphi;
            let direction = &tables.directions[i];
            let to_axis = angle_between(direction, &cone.axis);
            let transversal = to_axis - cone.phi;
            if transversal < smin || transversal > smax { continue }
            let weight = match origin {
                Some((o, axis_to_origin)) => {
                    let longitudinal = spherical_triangle_angle(axis_to_origin, to_axis, angle_between(direction, &o));
                    response.response_with_track(transversal, longitudinal)
                }
                None => response.response(transversal),
            };
            shell.push(i, weight)?;
        }
    }
    shell.replicated(nr, nphi * ntheta)
}

pub(super) fn pair(tables: &BinTables, response: &Response, pair: &PairAxis) -> Result<Accumulator, Instability> {
    let [nphi, ntheta, nr] = tables.n;
    let smax = response.support_max();
    let source_theta = angle_between(&pair.source, &Vector::z());

    let mut shell = Accumulator::with_capacity(nphi * ntheta / 4);
    for itheta in 0..ntheta {
        if (tables.row_thetas[itheta] - source_theta).abs() > smax + ROW_MARGIN { continue }
        for iphi in 0..nphi {
            let i = iphi + itheta * nphi;
            let offset = angle_between(&tables.directions[i], &pair.source);
            if offset > smax { continue }
            shell.push(i, response.response(offset))?;
        }
    }
    shell.replicated(nr, nphi * ntheta)
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::f64::consts::TAU;

use geometry::{angle_between, spherical_triangle_angle, Vector};
use units::todo::Anglef64;

use crate::error::Instability;
use crate::grid::BinTables;
use crate::response::{Response, ResponseModel};
use super::sparse::Accumulator;
use super::{Cone, PairAxis};
