//! One-dimensional densities sampled on a binned axis, as obtained by slicing a
//! response table at one event's parameters.
//!
//! Values are densities at bin centres. Between centres the density is
//! interpolated linearly; between the outermost centres and the axis edges it
//! is flat; outside the axis it is zero.

use units::todo::Densityf64;

/// Relative density below which a slice is considered to have no support
pub const SUPPORT_THRESHOLD: f64 = 0.01;

#[derive(Clone, Debug, PartialEq)]
pub struct ResponseSlice {
    edges: Vec<f64>,
    centers: Vec<f64>,
    values: Vec<Densityf64>,
    integral: f64,
    maximum: f64,
    support: (f64, f64),
}

impl ResponseSlice {

    /// Densities at the centres of the bins delimited by `edges`.
    ///
    /// `None` unless there is exactly one more edge than values, edges strictly
    /// increase, all values are finite and non-negative, and at least one is
    /// positive.
    pub fn new(edges: Vec<f64>, values: Vec<Densityf64>) -> Option<Self> {
        if values.is_empty() || edges.len() != values.len() + 1 { return None }
        if edges.windows(2).any(|w| !(w[0] < w[1])) { return None }
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) { return None }
        let maximum = values.iter().copied().fold(0.0, f64::max);
        if maximum <= 0.0 { return None }

        let centers = edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        let mut slice = Self { edges, centers, values, integral: 0.0, maximum, support: (0.0, 0.0) };
        slice.integral = slice.exact_integral();
        slice.support = slice.find_support(SUPPORT_THRESHOLD);
        Some(slice)
    }

    /// Histogram contents (e.g. event counts) per bin, converted to densities
    /// by dividing by the bin widths
    pub fn from_counts(edges: Vec<f64>, counts: &[f64]) -> Option<Self> {
        if edges.len() != counts.len() + 1 { return None }
        let densities = counts.iter()
            .zip(edges.windows(2))
            .map(|(c, w)| c / (w[1] - w[0]))
            .collect();
        Self::new(edges, densities)
    }

    /// Moving average over `window` bins (centred; shrinks at the edges).
    /// Windows of 0 or 1 leave the slice unchanged.
    pub fn smoothed(self, window: usize) -> Option<Self> {
        if window <= 1 { return Some(self) }
        let half = window / 2;
        let n = self.values.len();
        let values = (0..n)
            .map(|i| {
                let lo = i.saturating_sub(half);
                let hi = (i + half + 1).min(n);
                self.values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
            })
            .collect();
        Self::new(self.edges, values)
    }

    /// Rescaled so that the histogram (bin content × width) sums to 1
    pub fn normalized(self) -> Option<Self> {
        let total: f64 = self.values.iter()
            .zip(self.edges.windows(2))
            .map(|(v, w)| v * (w[1] - w[0]))
            .sum();
        if !(total > 0.0 && total.is_finite()) { return None }
        let values = self.values.iter().map(|v| v / total).collect();
        Self::new(self.edges, values)
    }

    pub fn density(&self, x: f64) -> Densityf64 {
        let n = self.values.len();
        if !(x >= self.edges[0] && x <= self.edges[n]) { return 0.0 }
        // Index of the first centre strictly above x
        let above = self.centers.partition_point(|&c| c <= x);
        if above == 0 { return self.values[0] }
        if above == n { return self.values[n - 1] }
        let (c0, c1) = (self.centers[above - 1], self.centers[above]);
        let (v0, v1) = (self.values [above - 1], self.values [above]);
        v0 + (v1 - v0) * (x - c0) / (c1 - c0)
    }

    /// Integral of the interpolated density over the whole axis
    pub fn integral(&self) -> f64 { self.integral }

    pub fn maximum(&self) -> Densityf64 { self.maximum }

    /// Range outside which the density never exceeds 1% of its maximum
    pub fn support(&self) -> (f64, f64) { self.support }

    pub fn edges(&self) -> &[f64] { &self.edges }
    pub fn values(&self) -> &[Densityf64] { &self.values }

    fn exact_integral(&self) -> f64 {
        let n = self.values.len();
        let (e, c, v) = (&self.edges, &self.centers, &self.values);
        let flanks = (c[0] - e[0]) * v[0] + (e[n] - c[n - 1]) * v[n - 1];
        let inner: f64 = (0..n - 1)
            .map(|i| 0.5 * (c[i + 1] - c[i]) * (v[i] + v[i + 1]))
            .sum();
        flanks + inner
    }

    fn find_support(&self, threshold: f64) -> (f64, f64) {
        let n = self.values.len();
        let above = |v: &f64| v / self.maximum > threshold;
        // `maximum > 0` guarantees at least one value above any threshold < 1
        let first = self.values.iter().position(above).unwrap_or(0);
        let last  = self.values.iter().rposition(above).unwrap_or(n - 1);
        let lo = if first == 0     { self.edges[0] } else { self.centers[first - 1] };
        let hi = if last  == n - 1 { self.edges[n] } else { self.centers[last  + 1] };
        (lo, hi)
    }
}
