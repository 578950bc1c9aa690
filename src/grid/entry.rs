//! Packed voxel map entry and hierarchical lookup

use bytemuck::{Pod, Zeroable};
use rkyv::{Archive, Deserialize, Serialize};

use crate::core::types::IVec3;

/// Voxel map entry - exactly 32 bits, the on-device node format
///
/// Layout:
/// - bits 0-1: log2 of the entry block side (0 for leaves)
/// - bits 2-31: begin index (child block base for internal entries,
///   cell index for leaves)
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable, Archive, Deserialize, Serialize)]
pub struct Entry(u32);

impl Entry {
    pub const LOG_DIM_BITS: u32 = 2;
    pub const BEGIN_BITS: u32 = 32 - Self::LOG_DIM_BITS;

    const LOG_DIM_MASK: u32 = (1 << Self::LOG_DIM_BITS) - 1;

    /// Create an entry with the given block dimension log and starting index
    pub fn new(log_dim: u32, begin: u32) -> Self {
        debug_assert!(log_dim <= Self::LOG_DIM_MASK);
        debug_assert!(begin < (1 << Self::BEGIN_BITS));
        Self((begin << Self::LOG_DIM_BITS) | log_dim)
    }

    /// Create a leaf entry pointing at a cell
    pub fn leaf(cell: u32) -> Self {
        Self::new(0, cell)
    }

    /// Log2 of the dimensions of the child block (0 for leaves)
    pub fn log_dim(self) -> u32 {
        self.0 & Self::LOG_DIM_MASK
    }

    /// Child block base index for internal entries, cell index for leaves
    pub fn begin(self) -> u32 {
        self.0 >> Self::LOG_DIM_BITS
    }

    /// True if this entry points at a cell
    pub fn is_leaf(self) -> bool {
        self.log_dim() == 0
    }

    /// Raw 32-bit wire representation
    pub fn to_bits(self) -> u32 {
        self.0
    }

    /// Reconstruct from the 32-bit wire representation
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

/// Resolve a voxel coordinate to the index of its owning leaf cell
///
/// Fetches the top-level entry from `voxel >> shift`, then descends while the
/// entry is internal. An internal entry with `log_dim` d owns a contiguous
/// block of `8^d` children, addressed by the next d bits of each voxel axis.
///
/// No bounds checking is performed: `voxel` must lie inside the indexed
/// domain and `shift`/`dims` must describe the grid the entries were built
/// for. This is the per-ray hot path.
pub fn lookup_entry(entries: &[Entry], shift: i32, dims: IVec3, voxel: IVec3) -> u32 {
    let top = voxel >> shift;
    let mut entry = entries[(top.x + dims.x * (top.y + dims.y * top.z)) as usize];
    let mut log_dim = entry.log_dim();
    let mut d = log_dim;
    while log_dim > 0 {
        let begin = entry.begin();
        let mask = ((1 << log_dim) - 1) as i32;

        let k = (voxel >> (shift - d as i32)) & IVec3::splat(mask);
        let offset = k.x as u32 + ((k.y as u32 + ((k.z as u32) << log_dim)) << log_dim);
        entry = entries[(begin + offset) as usize];
        log_dim = entry.log_dim();
        d += log_dim;
    }
    entry.begin()
}
