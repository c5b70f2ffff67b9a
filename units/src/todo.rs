/// Units which are simply type aliases for `f64` rather than having an
/// implementation as a `uom` `Quantity`.
///
/// These are used in the per-bin inner loops of the backprojector, where every
/// value is converted once, at event assimilation, into a fixed internal unit:
///
/// + angles in radians
/// + lengths in cm
/// + energies in keV

pub type Anglef64     = f64;
pub type Lengthf64    = f64;
pub type Energyf64    = f64;
pub type Ratiof64     = f64;
pub type Weightf64    = f64;
pub type Densityf64   = f64; // per radian, or per cm for PET
pub type Volumef64    = f64;
