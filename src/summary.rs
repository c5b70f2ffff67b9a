//! Tally of accepted and rejected events over a run

use std::collections::HashMap;
use std::fmt;

use crate::backprojector::SparseBackprojection;
use crate::error::Rejection;
use crate::utils::group_digits;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub accepted: usize,
    pub rejected: HashMap<Rejection, usize>,
}

impl RunSummary {

    pub fn record(&mut self, outcome: &Result<SparseBackprojection, Rejection>) {
        match outcome {
            Ok(_)          => self.accepted += 1,
            Err(rejection) => *self.rejected.entry(*rejection).or_default() += 1,
        }
    }

    pub fn n_rejected(&self) -> usize { self.rejected.values().sum() }
    pub fn n_events  (&self) -> usize { self.accepted + self.n_rejected() }

    /// Combine tallies from independent workers
    pub fn merge(mut self, other: Self) -> Self {
        self.accepted += other.accepted;
        for (rejection, n) in other.rejected {
            *self.rejected.entry(rejection).or_default() += n;
        }
        self
    }

    /// Rejection causes, most frequent first
    pub fn causes(&self) -> Vec<(Rejection, usize)> {
        let mut causes: Vec<_> = self.rejected.iter().map(|(r, n)| (*r, *n)).collect();
        causes.sort_by(|(ra, a), (rb, b)| b.cmp(a).then_with(|| ra.to_string().cmp(&rb.to_string())));
        causes
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.n_events();
        let percent = |k: usize| if n > 0 { 100.0 * k as f64 / n as f64 } else { 0.0 };
        writeln!(f, "{} / {} events accepted ({:.1}%)",
                 group_digits(self.accepted), group_digits(n), percent(self.accepted))?;
        for (rejection, k) in self.causes() {
            writeln!(f, "  {:>12} rejected: {rejection}", group_digits(k))?;
        }
        Ok(())
    }
}
