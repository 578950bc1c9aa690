//! Inclusive 3D voxel ranges

use crate::core::types::IVec3;
use super::aabb::Aabb;

/// Inclusive range of voxel coordinates, `lo..=hi` on each axis
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    pub lo: IVec3,
    pub hi: IVec3,
}

impl Range {
    /// Create range from inclusive bounds
    pub fn new(lo: IVec3, hi: IVec3) -> Self {
        Self { lo, hi }
    }

    /// Number of voxels covered, counting bounds inclusively
    ///
    /// Only meaningful when no axis is degenerate; check `is_degenerate`
    /// first when the range comes from two boxes that may not overlap.
    pub fn size(&self) -> i32 {
        let d = self.hi - self.lo + IVec3::ONE;
        d.x * d.y * d.z
    }

    /// True if any axis is inverted (`hi < lo`), i.e. the source boxes were disjoint
    pub fn is_degenerate(&self) -> bool {
        self.hi.x < self.lo.x || self.hi.y < self.lo.y || self.hi.z < self.lo.z
    }

    /// Check if a voxel coordinate falls inside the range
    pub fn contains(&self, v: IVec3) -> bool {
        v.x >= self.lo.x && v.x <= self.hi.x &&
        v.y >= self.lo.y && v.y <= self.hi.y &&
        v.z >= self.lo.z && v.z <= self.hi.z
    }
}

/// Compute the inclusive range of top-level voxels that intersect the given box
///
/// Bounds are clamped to `[0, dims - 1]` per axis. Disjoint boxes produce an
/// inverted range, which callers must detect via `Range::is_degenerate`.
pub fn compute_range(dims: IVec3, grid_bb: &Aabb, query_bb: &Aabb) -> Range {
    let inv = dims.as_vec3() / grid_bb.extents();
    let lo = ((query_bb.min - grid_bb.min) * inv).as_ivec3().max(IVec3::ZERO);
    let hi = ((query_bb.max - grid_bb.min) * inv).as_ivec3().min(dims - IVec3::ONE);
    Range::new(lo, hi)
}
