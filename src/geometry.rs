//! Geometric helpers for containment, collision detection and free-space scanning.
//!
//! All placement decisions go through three primitives:
//! [`fits`] (containment), [`overlaps`] (strict AABB intersection) and
//! [`candidate_positions`] (the lazy first-fit scan).

use crate::model::Placement;
use crate::types::{BoundingBox, EPSILON_GENERAL, Vec3};

/// Checks whether an item with `item_dims` starting at `start` lies entirely inside a container.
///
/// # Parameters
/// * `container_dims` - Interior dimensions of the container
/// * `item_dims` - Dimensions of the item
/// * `start` - Proposed start corner (minimum x, y, z)
///
/// # Returns
/// `true` if `0 <= start` and `start + item_dims <= container_dims` on every axis
pub fn fits(container_dims: Vec3, item_dims: Vec3, start: Vec3) -> bool {
    let container = BoundingBox::from_position_and_dims(Vec3::zero(), container_dims);
    container.contains(&BoundingBox::from_position_and_dims(start, item_dims))
}

/// Checks whether two boxes overlap.
///
/// Uses the separating-axis test for AABBs. Boxes touching at a face do
/// NOT overlap.
///
/// # Example
/// ```
/// use stow_it_now::geometry::overlaps;
/// use stow_it_now::types::{BoundingBox, Vec3};
///
/// let a = BoundingBox::from_position_and_dims(Vec3::zero(), Vec3::new(5.0, 5.0, 5.0));
/// let b = BoundingBox::from_position_and_dims(Vec3::new(5.0, 0.0, 0.0), Vec3::new(5.0, 5.0, 5.0));
/// assert!(!overlaps(&a, &b));
/// ```
pub fn overlaps(a: &BoundingBox, b: &BoundingBox) -> bool {
    a.intersects(b)
}

/// Checks whether `candidate` is free of collisions with every placement.
pub fn is_free(candidate: &BoundingBox, placements: &[Placement]) -> bool {
    !placements.iter().any(|p| overlaps(&p.bounds(), candidate))
}

/// Creates the lazy first-fit scan for an item inside a container.
///
/// Coordinates per axis are the container origin plus the end coordinate of
/// every existing placement on that axis. Positions are yielded in z, then
/// y, then x order (z outermost), and only when the item fits and overlaps
/// nothing.
pub fn candidate_positions(
    container_dims: Vec3,
    placements: &[Placement],
    item_dims: Vec3,
) -> CandidatePositions<'_> {
    let xs = axis_positions(container_dims.x, item_dims.x, placements.iter().map(|p| p.end.x));
    let ys = axis_positions(container_dims.y, item_dims.y, placements.iter().map(|p| p.end.y));
    let zs = axis_positions(container_dims.z, item_dims.z, placements.iter().map(|p| p.end.z));

    CandidatePositions {
        container_dims,
        item_dims,
        placements,
        xs,
        ys,
        zs,
        cursor: 0,
    }
}

/// Finite, restartable sequence of free start positions.
///
/// The axis coordinates are computed once; collision checks run lazily per
/// `next` call. Cloning yields an independent scan from the current cursor.
#[derive(Clone, Debug)]
pub struct CandidatePositions<'a> {
    container_dims: Vec3,
    item_dims: Vec3,
    placements: &'a [Placement],
    xs: Vec<f64>,
    ys: Vec<f64>,
    zs: Vec<f64>,
    cursor: usize,
}

impl CandidatePositions<'_> {
    fn total(&self) -> usize {
        self.xs.len() * self.ys.len() * self.zs.len()
    }

    fn position_at(&self, index: usize) -> Vec3 {
        let nx = self.xs.len();
        let ny = self.ys.len();
        Vec3::new(
            self.xs[index % nx],
            self.ys[(index / nx) % ny],
            self.zs[index / (nx * ny)],
        )
    }
}

impl Iterator for CandidatePositions<'_> {
    type Item = Vec3;

    fn next(&mut self) -> Option<Vec3> {
        let total = self.total();
        while self.cursor < total {
            let start = self.position_at(self.cursor);
            self.cursor += 1;

            if !fits(self.container_dims, self.item_dims, start) {
                continue;
            }
            let candidate = BoundingBox::from_position_and_dims(start, self.item_dims);
            if is_free(&candidate, self.placements) {
                return Some(start);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.total().saturating_sub(self.cursor)))
    }
}

/// Generates the sorted, deduplicated start coordinates along one axis.
///
/// # Parameters
/// * `container_len` - Length of the container in this dimension
/// * `object_len` - Length of the object in this dimension
/// * `boundaries` - End coordinates of existing placements on this axis
fn axis_positions(
    container_len: f64,
    object_len: f64,
    boundaries: impl Iterator<Item = f64>,
) -> Vec<f64> {
    let max_pos = container_len - object_len;
    if max_pos < -EPSILON_GENERAL {
        return Vec::new();
    }

    let mut positions: Vec<f64> = std::iter::once(0.0)
        .chain(boundaries)
        .filter(|&pos| pos <= max_pos + EPSILON_GENERAL)
        .collect();

    positions.sort_by(f64::total_cmp);
    positions.dedup_by(|a, b| (*a - *b).abs() < EPSILON_GENERAL);
    positions
}
