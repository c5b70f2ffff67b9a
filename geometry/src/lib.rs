//! Directions, positions and coordinate frames in the detector's Cartesian
//! coordinates and in the spherical coordinates of the image.
//!
//! Internal units are plain `f64`s: angles in radians, lengths in cm.

mod spherical;
mod frame;

pub use spherical::{Spherical, to_cartesian, to_spherical, angle_between,
                    distance_to_line, spherical_triangle_angle};
pub use frame::{Frame, FrameError};

pub type Vector = nalgebra::Vector3<f64>;
pub type Point  = nalgebra::Vector3<f64>;
pub type Rotation = nalgebra::Rotation3<f64>;
