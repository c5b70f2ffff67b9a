//! Conversion between the linear bin index used in backprojections and the
//! per-axis bin indices `[iphi, itheta, ir]` of a grid.
//!
//! `phi` varies fastest: `i = iphi + (itheta + ir * ntheta) * nphi`.

use std::ops::{Add, Div, Mul, Rem};

#[allow(non_camel_case_types)] pub type Index1_u = usize;
#[allow(non_camel_case_types)] pub type Index3_u = [usize; 3];
#[allow(non_camel_case_types)] pub type BinDim_u = [usize; 3];

pub fn index3_to_1<T>([i0, i1, i2]: [T; 3], [n0, n1, _n2]: [T; 3]) -> T
where
    T: Mul<Output = T> + Add<Output = T>
{
    i0 + (i1 + i2 * n1) * n0
}

pub fn index1_to_3<T>(i: T, [n0, n1, _n2]: [T; 3]) -> [T; 3]
where
    T: Mul<Output = T> +
    Div<Output = T> +
    Rem<Output = T> +
    Copy
{
    let layer = n0 * n1;
    let i2 = i / layer;
    let rest = i % layer;
    [rest % n0, rest / n0, i2]
}


#[cfg(test)]
mod test_index_conversion {
    use super::*;
    use rstest::rstest;

    #[rstest(/**/    size    , index3  , index1,
             case([80,40, 1], [ 0, 0,0],     0),
             case([80,40, 1], [79, 0,0],    79),
             case([80,40, 1], [ 0, 1,0],    80),
             case([80,40, 1], [ 5,39,0],  3125),
             case([ 3, 4, 5], [ 2, 3,4],    59),
             case([ 3, 4, 5], [ 0, 0,1],    12),
             case([10,10,10], [ 4, 5,6],   654),
    )]
    fn hand_picked(size: BinDim_u, index3: Index3_u, index1: usize) {
        assert_eq!(index3_to_1(index3, size), index1);
        assert_eq!(index1_to_3(index1, size), index3);
    }

    use proptest::prelude::*;

    fn size_and_in_range_index() -> impl Strategy<Value = (BinDim_u, usize)> {
        [1..100_usize, 1..100_usize, 1..20_usize]
            .prop_flat_map(|n| (Just(n), 0..(n[0] * n[1] * n[2])))
    }

    proptest! {
        #[test]
        fn index_roundtrip((size, index) in size_and_in_range_index()) {
            let there = index1_to_3(index, size);
            prop_assert!(there.iter().zip(size.iter()).all(|(i, n)| i < n));
            prop_assert_eq!(index3_to_1(there, size), index);
        }
    }
}
