//! Sparse storage of one event's backprojection: only bins with non-zero
//! weight, in increasing bin order.

/// Backprojections whose weights sum to less than this are considered empty
pub const MINIMUM_SUM: Weightf64 = 1e-5;

pub type BackprojectionElement = (Index1_u, Weightf64);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseBackprojection {
    pub bins: Vec<Index1_u>,
    pub weights: Vec<Weightf64>,
    pub maximum: Weightf64,
}

impl SparseBackprojection {

    pub fn n_used_bins(&self) -> usize { self.bins.len() }

    pub fn sum(&self) -> Weightf64 { self.weights.iter().sum() }

    pub fn iter(&self) -> impl Iterator<Item = BackprojectionElement> + '_ {
        self.bins.iter().copied().zip(self.weights.iter().copied())
    }

    /// Point-wise product with `other`, treating absent bins as zero: the joint
    /// likelihood of two independent measurements of the same origin.
    pub fn multiply(&self, other: &Self) -> Self {
        let mut product = Accumulator::with_capacity(self.n_used_bins().min(other.n_used_bins()));
        let (mut i, mut j) = (0, 0);
        while i < self.bins.len() && j < other.bins.len() {
            match self.bins[i].cmp(&other.bins[j]) {
                Ordering::Less    => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal   => {
                    product.push_unchecked(self.bins[i], self.weights[i] * other.weights[j]);
                    i += 1;
                    j += 1;
                }
            }
        }
        product.into_inner()
    }

    /// Add `scale ×` this backprojection into a dense image
    pub fn add_to(&self, image: &mut [Weightf64], scale: Weightf64) {
        for (i, w) in self.iter() { image[i] += scale * w }
    }
}

impl<'a> IntoIterator for &'a SparseBackprojection {
    type Item = BackprojectionElement;
    type IntoIter = std::iter::Zip<std::iter::Copied<std::slice::Iter<'a, Index1_u>>,
                                   std::iter::Copied<std::slice::Iter<'a, Weightf64>>>;
    fn into_iter(self) -> Self::IntoIter {
        self.bins.iter().copied().zip(self.weights.iter().copied())
    }
}

/// Collects `(bin, weight)` pairs while guarding against numerical trouble
#[derive(Debug, Default)]
pub(crate) struct Accumulator {
    inner: SparseBackprojection,
    sum: Weightf64,
}

impl Accumulator {

    pub(crate) fn with_capacity(n: usize) -> Self {
        Self {
            inner: SparseBackprojection {
                bins: Vec::with_capacity(n),
                weights: Vec::with_capacity(n),
                maximum: 0.0,
            },
            sum: 0.0,
        }
    }

    /// Keep positive weights; fail on any non-finite weight or sum
    pub(crate) fn push(&mut self, bin: Index1_u, weight: Weightf64) -> Result<(), Instability> {
        if !weight.is_finite() { return Err(Instability::NonFinite) }
        if weight > 0.0 {
            self.push_unchecked(bin, weight);
            if !self.sum.is_finite() { return Err(Instability::NonFinite) }
        }
        Ok(())
    }

    fn push_unchecked(&mut self, bin: Index1_u, weight: Weightf64) {
        if weight > 0.0 {
            self.inner.bins.push(bin);
            self.inner.weights.push(weight);
            self.inner.maximum = self.inner.maximum.max(weight);
            self.sum += weight;
        }
    }

    /// Repeat the contents of the first radial shell in all `shells` shells
    pub(crate) fn replicated(self, shells: usize, shell_size: usize) -> Result<Self, Instability> {
        if shells <= 1 { return Ok(self) }
        let mut all = Self::with_capacity(self.inner.n_used_bins() * shells);
        for ir in 0..shells {
            for (i, w) in self.inner.iter() { all.push(i + ir * shell_size, w)? }
        }
        Ok(all)
    }

    fn into_inner(self) -> SparseBackprojection { self.inner }

    /// The backprojection, unless it is (nearly) empty or numerically broken
    pub(crate) fn finish(self) -> Result<SparseBackprojection, Instability> {
        validate(self.into_inner())
    }
}

/// Refuse backprojections which are non-finite or (nearly) empty
pub(crate) fn validate(backprojection: SparseBackprojection) -> Result<SparseBackprojection, Instability> {
    let sum = backprojection.sum();
    if !sum.is_finite() { return Err(Instability::NonFinite) }
    if sum < MINIMUM_SUM { return Err(Instability::Empty) }
    Ok(backprojection)
}



// ----- Imports ------------------------------------------------------------------------------------------
use std::cmp::Ordering;

use units::todo::Weightf64;

use crate::error::Instability;
use crate::index::Index1_u;
