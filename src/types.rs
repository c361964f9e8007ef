//! Common types and traits for 3D geometry.
//!
//! Axis convention used throughout the crate: `x` is width, `y` is depth (the
//! access axis, `y = 0` is the open face of a container) and `z` is height.

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Global numerical tolerance for floating-point comparisons.
///
/// Used for containment, overlap and coordinate deduplication.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// A point or an extent; positions and dimensions share the type.
///
/// # Examples
/// ```
/// use stow_it_now::types::Vec3;
///
/// let start = Vec3::new(1.0, 2.0, 3.0);
/// let dims = Vec3::new(10.0, 20.0, 30.0);
/// assert_eq!((start + dims).y, 22.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Creates a zero vector (container origin).
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline]
    pub const fn from_tuple(tuple: (f64, f64, f64)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }

    /// Product of all components.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// Component-wise `<=` against `outer`, within `tolerance`.
    #[inline]
    pub fn fits_within(&self, outer: &Self, tolerance: f64) -> bool {
        self.x <= outer.x + tolerance && self.y <= outer.y + tolerance && self.z <= outer.z + tolerance
    }

    /// Approximate component-wise equality.
    #[inline]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Trait for objects with 3D dimensions.
///
/// Shared by containers and items so geometry helpers can take either.
pub trait Dimensional {
    /// Returns the dimensions of the object.
    fn dimensions(&self) -> Vec3;

    /// Calculates the volume.
    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }

    /// Checks if this object fits in a box with the given dimensions, ignoring occupancy.
    fn fits_in(&self, outer: &Vec3, tolerance: f64) -> bool {
        self.dimensions().fits_within(outer, tolerance)
    }
}

/// Represents an Axis-Aligned Bounding Box (AABB).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner (start coordinates)
    pub min: Vec3,
    /// Maximum corner (end coordinates)
    pub max: Vec3,
}

impl BoundingBox {
    /// Creates a new bounding box.
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Creates a bounding box from position and dimensions.
    #[inline]
    pub fn from_position_and_dims(position: Vec3, dims: Vec3) -> Self {
        Self {
            min: position,
            max: position + dims,
        }
    }

    /// Checks if two bounding boxes intersect.
    ///
    /// Open-interval test: boxes that only touch at a face do not intersect.
    /// Separations smaller than [`EPSILON_GENERAL`] count as touching.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        !(self.max.x <= other.min.x + EPSILON_GENERAL
            || other.max.x <= self.min.x + EPSILON_GENERAL
            || self.max.y <= other.min.y + EPSILON_GENERAL
            || other.max.y <= self.min.y + EPSILON_GENERAL
            || self.max.z <= other.min.z + EPSILON_GENERAL
            || other.max.z <= self.min.z + EPSILON_GENERAL)
    }

    /// Checks if `inner` lies entirely inside this box.
    #[inline]
    pub fn contains(&self, inner: &Self) -> bool {
        inner.min.x >= self.min.x - EPSILON_GENERAL
            && inner.min.y >= self.min.y - EPSILON_GENERAL
            && inner.min.z >= self.min.z - EPSILON_GENERAL
            && inner.max.x <= self.max.x + EPSILON_GENERAL
            && inner.max.y <= self.max.y + EPSILON_GENERAL
            && inner.max.z <= self.max.z + EPSILON_GENERAL
    }

    #[inline]
    fn overlap_1d(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> f64 {
        (a_max.min(b_max) - a_min.max(b_min)).max(0.0)
    }

    /// Checks whether the width/height faces (XZ plane) of two boxes intersect.
    ///
    /// This is the projection along the access axis.
    #[inline]
    pub fn intersects_xz(&self, other: &Self) -> bool {
        Self::overlap_1d(self.min.x, self.max.x, other.min.x, other.max.x) > EPSILON_GENERAL
            && Self::overlap_1d(self.min.z, self.max.z, other.min.z, other.max.z) > EPSILON_GENERAL
    }
}
