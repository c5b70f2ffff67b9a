//! Physical quantities used throughout the reconstruction, with pithy
//! constructors and extractors.

pub mod todo;

pub use uom;
pub use uom::si::Quantity;
pub use uom::si::f64::{Angle, Energy, Length, Ratio, Time};

pub mod units {
  pub use uom::si::{length::{millimeter, centimeter, meter},
                    energy::{electronvolt, kiloelectronvolt, megaelectronvolt},
                    time  ::{millisecond, second},
                    ratio ::ratio,
                    angle ::{radian, degree, revolution},
  };
}

// Making values from float literals is very long-winded, so provide some
// pithily-named convenience constructors.

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
  ($name:ident $quantity:ident $unit:ident ) => {
    pub fn $name(x: f64) -> $quantity { $quantity::new::<units::$unit>(x) }
  };
}

wrap!(cm     Length        centimeter);
wrap!(mm     Length        millimeter);
wrap!(kev    Energy  kiloelectronvolt);
wrap!(mev    Energy  megaelectronvolt);
wrap!(ms     Time         millisecond);
wrap!(ratio  Ratio              ratio);
wrap!(radian Angle             radian);
wrap!(deg    Angle             degree);
wrap!(turn   Angle         revolution);

// Reverse direction of the above.
pub fn cm_    (x: Length) -> f64 { x.get::<units::centimeter>() }
pub fn mm_    (x: Length) -> f64 { x.get::<units::millimeter>() }
pub fn kev_   (x: Energy) -> f64 { x.get::<units::kiloelectronvolt>() }
pub fn ms_    (x: Time  ) -> f64 { x.get::<units::millisecond>() }
pub fn ratio_ (x: Ratio ) -> f64 { x.get::<units::ratio>() }
pub fn radian_(x: Angle ) -> f64 { x.get::<units::radian>() }
pub fn deg_   (x: Angle ) -> f64 { x.get::<units::degree>() }

/// Electron rest energy, in the plain-`f64` energy unit (keV)
pub const ELECTRON_MASS_KEV: todo::Energyf64 = 510.998_95;

#[macro_export]
macro_rules! assert_uom_eq {
  ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
    float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
  };
}
