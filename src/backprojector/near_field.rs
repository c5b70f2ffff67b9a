//! Backprojection onto bins at finite distance. Bin centres are compared with
//! event positions in the reference frame.

pub(super) fn compton(tables: &BinTables, response: &Response, cone: &Cone, tuning: &NearFieldTuning)
                      -> Result<Accumulator, Instability> {
    let (smin, smax) = (response.support_min(), response.support_max());
    let tracked = response.has_longitudinal();
    let origin = cone.origin
        .filter(|_| tracked)
        .map(|o| (o, angle_between(&cone.axis, &o)));
    let numerator = (cone.apex.norm() - tables.radius_min).abs();

    let mut acc = Accumulator::with_capacity(tables.n_bins() / 8);
    for (i, centre) in tables.centers.iter().enumerate() {
        let d = centre - cone.apex;
        let distance = d.norm();
        if distance == 0.0 { continue }
        let to_axis = angle_between(&d, &cone.axis);
        let transversal = to_axis - cone.phi;
        if transversal < smin || transversal > smax { continue }
        if let Some(cutoff) = tuning.off_axis_cutoff {
            if angle_between(&d, &cone.apex) > cutoff { continue }
        }
        let mut weight = match origin {
            Some((o, axis_to_origin)) => {
                let longitudinal = spherical_triangle_angle(axis_to_origin, to_axis, angle_between(&d, &o));
                response.response_with_track(transversal, longitudinal)
            }
            None => response.response(transversal),
        };
        if tuning.distance_weighting { weight *= numerator / distance }
        acc.push(i, weight)?;
    }
    Ok(acc)
}

pub(super) fn pair(tables: &BinTables, response: &Response, pair: &PairAxis) -> Result<Accumulator, Instability> {
    let smax = response.support_max();
    let mut acc = Accumulator::with_capacity(tables.n_bins() / 8);
    for (i, centre) in tables.centers.iter().enumerate() {
        let d = centre - pair.conversion;
        if d.norm() == 0.0 { continue }
        let offset = angle_between(&d, &pair.source);
        if offset > smax { continue }
        acc.push(i, response.response(offset))?;
    }
    Ok(acc)
}

/// Weights by the distance of each bin centre from the line of response
pub(super) fn pet(tables: &BinTables, response: &Response, line: &Line) -> Result<Accumulator, Instability> {
    let smax = response.support_max();
    let mut acc = Accumulator::with_capacity(tables.n_bins() / 8);
    for (i, centre) in tables.centers.iter().enumerate() {
        let offset = distance_to_line(centre, &line.first, &line.second).ok_or(Instability::NonFinite)?;
        if offset > smax { continue }
        acc.push(i, response.response(offset))?;
    }
    Ok(acc)
}

// ----- Imports ------------------------------------------------------------------------------------------
use geometry::{angle_between, distance_to_line, spherical_triangle_angle};

use crate::error::Instability;
use crate::grid::BinTables;
use crate::response::{Response, ResponseModel};
use super::sparse::Accumulator;
use super::{Cone, Line, NearFieldTuning, PairAxis};
