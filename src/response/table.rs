//! Multi-dimensional response tables, produced by detector simulations.
//!
//! The first axis is always the offset whose density the table describes; the
//! remaining axes are event parameters at which the table is sliced.
//!
//! # Text format
//!
//! ```text
//! # comment
//! Version 1
//! Type ResponseMatrixON
//! NM cone-shapes
//! A1 -10 -5 0 5 10
//! N1 offset
//! A2 0 90 180
//! N2 scatter angle
//! StartStream 8
//! 1 2 3 4 5 6 7 8
//! StopStream
//! ```
//!
//! `A<k>` lists the bin edges of axis `k`, `N<k>` names it. The stream holds one
//! value per bin, axis 1 varying fastest.

use std::path::Path;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, ShapeBuilder};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("axis {0} is missing")]
    MissingAxis(usize),
    #[error("axis {0} needs at least two strictly increasing edges")]
    BadAxis(usize),
    #[error("expected {expected} values, found {found}")]
    CountMismatch { expected: usize, found: usize },
    #[error("table contains no data stream")]
    NoData,
    #[error("table contains non-finite or negative values")]
    BadValue,
    #[error("table has {found} axes, expected {expected}")]
    Dimensionality { expected: usize, found: usize },
    #[error("slice needs {expected} parameters, got {found}")]
    SliceParameters { expected: usize, found: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableAxis {
    pub name: String,
    pub edges: Vec<f64>,
}

impl TableAxis {
    pub fn new(name: impl Into<String>, edges: Vec<f64>) -> Self {
        Self { name: name.into(), edges }
    }

    pub fn bins(&self) -> usize { self.edges.len() - 1 }

    pub fn widths(&self) -> impl Iterator<Item = f64> + '_ {
        self.edges.windows(2).map(|w| w[1] - w[0])
    }

    fn center(&self, i: usize) -> f64 { 0.5 * (self.edges[i] + self.edges[i + 1]) }

    /// Neighbouring bins and interpolation fraction for `x`, treating values as
    /// sitting at bin centres. Outside the outermost centres the nearest bin is
    /// used unchanged.
    fn locate(&self, x: f64) -> (usize, usize, f64) {
        let n = self.bins();
        if n == 1 || !(x > self.center(0)) { return (0, 0, 0.0) }
        if x >= self.center(n - 1) { return (n - 1, n - 1, 0.0) }
        let above = (1..n).find(|&i| self.center(i) > x).unwrap_or(n - 1);
        let (c0, c1) = (self.center(above - 1), self.center(above));
        (above - 1, above, (x - c0) / (c1 - c0))
    }

    fn valid(&self) -> bool {
        self.edges.len() >= 2 && self.edges.windows(2).all(|w| w[0] < w[1]) &&
            self.edges.iter().all(|e| e.is_finite())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResponseTable {
    pub name: String,
    pub axes: Vec<TableAxis>,
    /// Indexed `[i1, i2, ...]` in axis order
    pub values: ArrayD<f64>,
}

impl ResponseTable {

    pub fn new(name: impl Into<String>, axes: Vec<TableAxis>, values: ArrayD<f64>) -> Result<Self, TableError> {
        if axes.is_empty() { return Err(TableError::MissingAxis(1)) }
        if let Some(k) = axes.iter().position(|a| !a.valid()) { return Err(TableError::BadAxis(k + 1)) }
        let shape: Vec<usize> = axes.iter().map(TableAxis::bins).collect();
        if values.shape() != shape.as_slice() {
            return Err(TableError::CountMismatch { expected: shape.iter().product(), found: values.len() })
        }
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) { return Err(TableError::BadValue) }
        Ok(Self { name: name.into(), axes, values })
    }

    /// From values listed with the first axis varying fastest
    pub fn from_stream(name: impl Into<String>, axes: Vec<TableAxis>, stream: Vec<f64>) -> Result<Self, TableError> {
        if axes.is_empty() { return Err(TableError::MissingAxis(1)) }
        if let Some(k) = axes.iter().position(|a| !a.valid()) { return Err(TableError::BadAxis(k + 1)) }
        let shape: Vec<usize> = axes.iter().map(TableAxis::bins).collect();
        let expected = shape.iter().product();
        if stream.len() != expected {
            return Err(TableError::CountMismatch { expected, found: stream.len() })
        }
        let values = ArrayD::from_shape_vec(IxDyn(&shape).f(), stream)
            .map_err(|_| TableError::CountMismatch { expected, found: 0 })?;
        Self::new(name, axes, values)
    }

    pub fn read(path: &Path) -> Result<Self, Error> {
        let unavailable = |cause: String| Error::ModelUnavailable { path: path.to_owned(), cause };
        let text = std::fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;
        let table = Self::parse(&text).map_err(|e| unavailable(e.to_string()))?;
        info!("Loaded response table `{}` from {}: {:?} bins", table.name, path.display(), table.values.shape());
        Ok(table)
    }

    pub fn parse(text: &str) -> Result<Self, TableError> {
        let mut name = String::new();
        let mut edges: Vec<Option<Vec<f64>>> = vec![];
        let mut names: Vec<Option<String>> = vec![];
        let mut stream: Option<(usize, Vec<f64>)> = None;
        let mut in_stream = false;

        for (n, line) in text.lines().enumerate() {
            let line_no = n + 1;
            let syntax = |message: String| TableError::Syntax { line: line_no, message };
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') { continue }

            if in_stream {
                if line == "StopStream" { in_stream = false; continue }
                if let Some((_, values)) = stream.as_mut() {
                    for word in line.split_whitespace() {
                        values.push(word.parse().map_err(|_| syntax(format!("bad value `{word}`")))?);
                    }
                }
                continue;
            }

            let (keyword, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let rest = rest.trim();
            match keyword {
                "NM" => name = rest.to_string(),
                "StartStream" => {
                    let count = rest.parse().map_err(|_| syntax(format!("bad stream length `{rest}`")))?;
                    stream = Some((count, Vec::new()));
                    in_stream = true;
                }
                "Version" | "Type" | "CE" | "TS" => debug!("response table header: {line}"),
                _ => {
                    let axis_number = |prefix: char| -> Option<usize> {
                        keyword.strip_prefix(prefix)?.parse::<usize>().ok().filter(|&k| k >= 1)
                    };
                    if let Some(k) = axis_number('A') {
                        let values = rest.split_whitespace()
                            .map(|w| w.parse::<f64>().map_err(|_| syntax(format!("bad edge `{w}`"))))
                            .collect::<Result<Vec<_>, _>>()?;
                        set_nth(&mut edges, k - 1, values);
                    } else if let Some(k) = axis_number('N') {
                        set_nth(&mut names, k - 1, rest.to_string());
                    } else {
                        debug!("ignoring unknown response table keyword `{keyword}`");
                    }
                }
            }
        }

        let (count, values) = stream.ok_or(TableError::NoData)?;
        if values.len() != count {
            return Err(TableError::CountMismatch { expected: count, found: values.len() })
        }
        let axes = edges.into_iter()
            .enumerate()
            .map(|(k, e)| {
                let edges = e.ok_or(TableError::MissingAxis(k + 1))?;
                let name = names.get(k).cloned().flatten().unwrap_or_else(|| format!("axis {}", k + 1));
                Ok(TableAxis::new(name, edges))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_stream(name, axes, values)
    }

    pub fn n_axes(&self) -> usize { self.axes.len() }

    pub fn expect_axes(&self, expected: usize) -> Result<(), TableError> {
        if self.n_axes() == expected { Ok(()) }
        else { Err(TableError::Dimensionality { expected, found: self.n_axes() }) }
    }

    /// Apply `f` to every edge of axis `k` (0-based), e.g. to change units
    pub fn map_axis(&mut self, k: usize, f: impl Fn(f64) -> f64) {
        for edge in &mut self.axes[k].edges { *edge = f(*edge) }
    }

    /// Turn every lane along the first axis from bin contents into a density
    /// which integrates to 1. Empty lanes stay empty.
    pub fn normalize_lanes(&mut self) {
        let widths: Vec<f64> = self.axes[0].widths().collect();
        for mut lane in self.values.lanes_mut(Axis(0)) {
            let total: f64 = lane.iter().sum();
            if total > 0.0 {
                lane.iter_mut().zip(&widths).for_each(|(v, w)| *v /= total * w);
            }
        }
    }

    /// The lane along the first axis, multilinearly interpolated between bin
    /// centres at `parameters` (one per remaining axis).
    pub fn slice(&self, parameters: &[f64]) -> Result<Vec<f64>, TableError> {
        let expected = self.n_axes() - 1;
        if parameters.len() != expected {
            return Err(TableError::SliceParameters { expected, found: parameters.len() })
        }
        // Remove axes from the back, so that the remaining axis numbers stay valid
        let mut reduced: Option<ArrayD<f64>> = None;
        for k in (1..self.n_axes()).rev() {
            let at = self.axes[k].locate(parameters[k - 1]);
            reduced = Some(match &reduced {
                None       => lerp_axis(self.values.view(), k, at),
                Some(prev) => lerp_axis(prev.view(), k, at),
            });
        }
        Ok(match reduced {
            Some(lane) => lane.iter().copied().collect(),
            None       => self.values.iter().copied().collect(),
        })
    }
}

fn lerp_axis(a: ArrayViewD<f64>, axis: usize, (i0, i1, t): (usize, usize, f64)) -> ArrayD<f64> {
    let lo = a.index_axis(Axis(axis), i0);
    if i0 == i1 || t == 0.0 { return lo.to_owned() }
    let hi = a.index_axis(Axis(axis), i1);
    &lo * (1.0 - t) + &hi * t
}

fn set_nth<T>(items: &mut Vec<Option<T>>, n: usize, item: T) {
    if items.len() <= n { items.resize_with(n + 1, || None) }
    items[n] = Some(item);
}
