use crate::{Point, Rotation, Vector};
use nalgebra::Matrix3;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("axis {0} has zero length")]
    ZeroAxis(&'static str),
    #[error("x and z axes are parallel")]
    ParallelAxes,
}

/// Orientation and position of a local coordinate system (the image, or a
/// detector in a moving platform) within a global one.
///
/// The columns of `rotation` are the local x, y and z axes expressed in global
/// coordinates, so `rotation * local` takes a local vector into the global
/// frame, and `rotation.inverse() * global` takes it back.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frame {
    pub rotation: Rotation,
    pub translation: Vector,
}

impl Default for Frame {
    fn default() -> Self { Self::identity() }
}

impl Frame {

    pub fn identity() -> Self {
        Self { rotation: Rotation::identity(), translation: Vector::zeros() }
    }

    /// Build the rotation from the local x and z axes, given in global
    /// coordinates. `z` is kept as given (normalized); `x` is orthogonalized
    /// against it and `y = z × x`.
    pub fn from_axes(x: Vector, z: Vector) -> Result<Self, FrameError> {
        let z = z.try_normalize(0.0).ok_or(FrameError::ZeroAxis("z"))?;
        if x.norm() == 0.0 { return Err(FrameError::ZeroAxis("x")) }
        let x = (x - z * x.dot(&z))
            .try_normalize(1e-12 * x.norm())
            .ok_or(FrameError::ParallelAxes)?;
        let y = z.cross(&x);
        let matrix = Matrix3::from_columns(&[x, y, z]);
        Ok(Self { rotation: Rotation::from_matrix_unchecked(matrix), translation: Vector::zeros() })
    }

    pub fn with_translation(self, translation: Vector) -> Self {
        Self { translation, ..self }
    }

    /// Global direction → local direction
    pub fn direction_to_local(&self, v: &Vector) -> Vector {
        self.rotation.inverse_transform_vector(v)
    }

    /// Local direction → global direction
    pub fn direction_to_global(&self, v: &Vector) -> Vector {
        self.rotation * v
    }

    /// Local position → global position
    pub fn point_to_global(&self, p: &Point) -> Point {
        self.rotation * p + self.translation
    }

    pub fn is_identity(&self) -> bool {
        self.rotation == Rotation::identity() && self.translation == Vector::zeros()
    }
}
