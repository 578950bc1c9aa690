//! Bit-exact cell marshalling for wide aligned memory transactions
//!
//! Accelerator back-ends move cells through 128-bit coalesced loads and
//! stores. The lane layout below is the wire format those consumers see, so
//! it must round-trip exactly; hosts that do not need wide transactions can
//! use ordinary field access instead.

use bytemuck::{Pod, Zeroable};

use crate::core::types::IVec3;
use super::cell::{Cell, SmallCell};

/// One 128-bit aligned memory word, four 32-bit lanes
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Word4(pub [u32; 4]);

/// Pack a cell into two transfer words
///
/// Word 0 carries `(min.x, min.y, min.z, begin)`, word 1 carries
/// `(max.x, max.y, max.z, end)`.
pub fn store_cell(cell: &Cell, dst: &mut [Word4; 2]) {
    dst[0] = Word4([
        cell.min[0] as u32,
        cell.min[1] as u32,
        cell.min[2] as u32,
        cell.begin as u32,
    ]);
    dst[1] = Word4([
        cell.max[0] as u32,
        cell.max[1] as u32,
        cell.max[2] as u32,
        cell.end as u32,
    ]);
}

/// Unpack a cell from two transfer words
pub fn load_cell(src: &[Word4; 2]) -> Cell {
    let lo = src[0].0;
    let hi = src[1].0;
    Cell::new(
        IVec3::new(lo[0] as i32, lo[1] as i32, lo[2] as i32),
        lo[3] as i32,
        IVec3::new(hi[0] as i32, hi[1] as i32, hi[2] as i32),
        hi[3] as i32,
    )
}

/// Unpack only the minimum corner, reading a single transfer word
pub fn load_cell_min(src: &[Word4; 2]) -> IVec3 {
    let lo = src[0].0;
    IVec3::new(lo[0] as i32, lo[1] as i32, lo[2] as i32)
}

/// Pack a compressed cell into one transfer word
///
/// Two 16-bit coordinate lanes per 32-bit subword:
/// `min.x | min.y << 16`, `min.z | max.x << 16`, `max.y | max.z << 16`,
/// then `begin` in the last lane.
pub fn store_small_cell(cell: &SmallCell, dst: &mut Word4) {
    *dst = Word4([
        cell.min[0] as u32 | ((cell.min[1] as u32) << 16),
        cell.min[2] as u32 | ((cell.max[0] as u32) << 16),
        cell.max[1] as u32 | ((cell.max[2] as u32) << 16),
        cell.begin as u32,
    ]);
}

/// Unpack a compressed cell from one transfer word
pub fn load_small_cell(src: &Word4) -> SmallCell {
    let w = src.0;
    SmallCell::new(
        [w[0] as u16, (w[0] >> 16) as u16, w[1] as u16],
        [(w[1] >> 16) as u16, w[2] as u16, (w[2] >> 16) as u16],
        w[3] as i32,
    )
}
