//! Leaf cell representations

use bytemuck::{Pod, Zeroable};
use rkyv::{Archive, Deserialize, Serialize};

use crate::core::types::IVec3;

/// Uncompressed grid cell - 32 bytes, two 16-byte transfer words
///
/// Bounds are inclusive voxel coordinates at the finest grid resolution.
/// `begin..end` delimits this cell's slice of the reference array.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable, Archive, Deserialize, Serialize)]
pub struct Cell {
    /// Minimum bounding voxel coordinate
    pub min: [i32; 3],
    /// Index of the first reference
    pub begin: i32,
    /// Maximum bounding voxel coordinate
    pub max: [i32; 3],
    /// Past-the-end reference index
    pub end: i32,
}

impl Cell {
    /// Create a cell from inclusive bounds and a reference slice
    pub fn new(min: IVec3, begin: i32, max: IVec3, end: i32) -> Self {
        Self {
            min: min.to_array(),
            begin,
            max: max.to_array(),
            end,
        }
    }

    /// Number of references owned by this cell
    pub fn num_refs(&self) -> usize {
        (self.end - self.begin) as usize
    }

    /// Check if a voxel coordinate lies inside the cell bounds
    pub fn contains(&self, v: IVec3) -> bool {
        v.x >= self.min[0] && v.x <= self.max[0] &&
        v.y >= self.min[1] && v.y <= self.max[1] &&
        v.z >= self.min[2] && v.z <= self.max[2]
    }
}

/// Compressed grid cell - 16 bytes, one 16-byte transfer word
///
/// Bounds are quantized to u16, so the grid extent per axis must fit in
/// 65535 finest-resolution voxels. References form a chain in the reference
/// array starting at `begin`, terminated by a -1 slot; a negative `begin`
/// means the cell owns no references.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable, Archive, Deserialize, Serialize)]
pub struct SmallCell {
    /// Minimum bounding voxel coordinate (quantized)
    pub min: [u16; 3],
    /// Maximum bounding voxel coordinate (quantized)
    pub max: [u16; 3],
    /// Index of the first reference, negative if none
    pub begin: i32,
}

impl SmallCell {
    /// Create a compressed cell from quantized bounds and a chain head
    pub fn new(min: [u16; 3], max: [u16; 3], begin: i32) -> Self {
        Self { min, max, begin }
    }

    /// Check if a voxel coordinate lies inside the cell bounds
    pub fn contains(&self, v: IVec3) -> bool {
        v.x >= self.min[0] as i32 && v.x <= self.max[0] as i32 &&
        v.y >= self.min[1] as i32 && v.y <= self.max[1] as i32 &&
        v.z >= self.min[2] as i32 && v.z <= self.max[2] as i32
    }
}
