//! Irregular grid container and read-time queries

use log::debug;
use rayon::prelude::*;
use rkyv::{Archive, Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{IVec3, Result, Vec3};
use crate::math::aabb::Aabb;
use super::cell::{Cell, SmallCell};
use super::entry::{Entry, lookup_entry};
use super::refs::CellRefs;

/// Leaf cell storage, either full-precision or memory-compressed
///
/// A grid carries exactly one representation; modeling this as a variant
/// rules out the both-empty/both-populated states.
#[derive(Clone, Debug, Archive, Deserialize, Serialize)]
pub enum Leaves {
    Full(Vec<Cell>),
    Compressed(Vec<SmallCell>),
}

impl Leaves {
    /// Number of leaf cells
    pub fn len(&self) -> usize {
        match self {
            Leaves::Full(cells) => cells.len(),
            Leaves::Compressed(cells) => cells.len(),
        }
    }

    /// True if the grid holds no cells
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes used by the cell array
    pub fn memory_usage(&self) -> usize {
        match self {
            Leaves::Full(cells) => std::mem::size_of::<Cell>() * cells.len(),
            Leaves::Compressed(cells) => std::mem::size_of::<SmallCell>() * cells.len(),
        }
    }
}

/// Everything the builder hands over when freezing a grid
///
/// Field set mirrors what an external builder materializes: the voxel map,
/// the reference array, one leaf representation, the indexed bounds, the
/// top-level dimensions, the top-to-finest shift, the semantic reference
/// count, and per-depth-level starting offsets into the voxel map.
pub struct GridParts {
    pub entries: Vec<Entry>,
    pub ref_ids: Vec<i32>,
    pub leaves: Leaves,
    pub bbox: Aabb,
    pub dims: IVec3,
    pub shift: i32,
    pub num_refs: usize,
    pub offsets: Vec<i32>,
}

/// Summary counters for logging and inspection tools
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct GridStats {
    pub num_cells: usize,
    pub num_entries: usize,
    pub num_refs: usize,
    pub num_levels: usize,
    pub compressed: bool,
    pub memory_bytes: usize,
}

/// Frozen irregular grid
///
/// Built once by an external builder, then read-only. All query methods are
/// pure reads and safe to call from any number of threads concurrently.
#[derive(Debug, Clone)]
pub struct Grid {
    entries: Vec<Entry>,
    ref_ids: Vec<i32>,
    leaves: Leaves,
    bbox: Aabb,
    dims: IVec3,
    shift: i32,
    num_refs: usize,
    offsets: Vec<i32>,
}

impl Grid {
    /// Freeze builder output into a queryable grid
    ///
    /// Enforces the cheap structural invariants: positive dimensions, a
    /// non-negative shift, a complete top-level entry block, and a reference
    /// count within the reference array. Deep consistency is the builder's
    /// contract; `validate` checks it explicitly when wanted.
    pub fn from_parts(parts: GridParts) -> Result<Self> {
        let GridParts { entries, ref_ids, leaves, bbox, dims, shift, num_refs, offsets } = parts;

        if dims.x <= 0 || dims.y <= 0 || dims.z <= 0 {
            return Err(Error::Grid(format!("non-positive grid dims: {dims}")));
        }
        if shift < 0 {
            return Err(Error::Grid(format!("negative shift: {shift}")));
        }
        let top_entries = (dims.x * dims.y * dims.z) as usize;
        if entries.len() < top_entries {
            return Err(Error::Grid(format!(
                "voxel map holds {} entries, top level needs {}",
                entries.len(),
                top_entries
            )));
        }
        if num_refs > ref_ids.len() {
            return Err(Error::Grid(format!(
                "{} references claimed but reference array holds {}",
                num_refs,
                ref_ids.len()
            )));
        }

        let grid = Self { entries, ref_ids, leaves, bbox, dims, shift, num_refs, offsets };
        debug!(
            "grid frozen: dims {}, shift {}, {} cells, {} entries, {} refs, {} levels, {} bytes",
            grid.dims,
            grid.shift,
            grid.num_cells(),
            grid.num_entries(),
            grid.num_refs(),
            grid.num_levels(),
            grid.memory_usage()
        );
        Ok(grid)
    }

    /// Voxel map entries
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Primitive reference array
    pub fn ref_ids(&self) -> &[i32] {
        &self.ref_ids
    }

    /// Leaf cell storage
    pub fn leaves(&self) -> &Leaves {
        &self.leaves
    }

    /// Full-precision cells, if this grid is uncompressed
    pub fn cells(&self) -> Option<&[Cell]> {
        match &self.leaves {
            Leaves::Full(cells) => Some(cells),
            Leaves::Compressed(_) => None,
        }
    }

    /// Compressed cells, if this grid is compressed
    pub fn small_cells(&self) -> Option<&[SmallCell]> {
        match &self.leaves {
            Leaves::Full(_) => None,
            Leaves::Compressed(cells) => Some(cells),
        }
    }

    /// Bounding box of the indexed space
    pub fn bbox(&self) -> &Aabb {
        &self.bbox
    }

    /// Top-level dimensions
    pub fn dims(&self) -> IVec3 {
        self.dims
    }

    /// Dimensions of the finest addressable voxel space
    pub fn voxel_dims(&self) -> IVec3 {
        self.dims << self.shift
    }

    /// Bits separating a finest-resolution voxel address from the top level
    pub fn shift(&self) -> i32 {
        self.shift
    }

    /// Per-depth-level starting offsets into the voxel map
    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    /// Number of leaf cells
    pub fn num_cells(&self) -> usize {
        self.leaves.len()
    }

    /// Number of voxel map entries
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Number of primitive references
    ///
    /// In compressed grids the reference array also stores chain
    /// terminators, so this differs from `ref_ids().len()`.
    pub fn num_refs(&self) -> usize {
        self.num_refs
    }

    /// Number of voxel map levels
    pub fn num_levels(&self) -> usize {
        self.offsets.len()
    }

    /// True if leaves use the compressed representation
    pub fn is_compressed(&self) -> bool {
        matches!(self.leaves, Leaves::Compressed(_))
    }

    /// Resolve a finest-resolution voxel coordinate to its owning leaf cell index
    ///
    /// The voxel must lie inside `voxel_dims`; see `lookup_entry`.
    pub fn lookup(&self, voxel: IVec3) -> u32 {
        lookup_entry(&self.entries, self.shift, self.dims, voxel)
    }

    /// Enumerate the references of the given leaf cell, returning the count
    pub fn for_each_ref<F: FnMut(i32)>(&self, cell: u32, f: F) -> usize {
        match &self.leaves {
            Leaves::Full(cells) => cells[cell as usize].for_each_ref(&self.ref_ids, f),
            Leaves::Compressed(cells) => cells[cell as usize].for_each_ref(&self.ref_ids, f),
        }
    }

    /// Voxel map as raw bytes, for device upload
    pub fn entries_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.entries)
    }

    /// Reference array as raw bytes, for device upload
    pub fn ref_ids_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.ref_ids)
    }

    /// Leaf cell array as raw bytes, for device upload
    pub fn leaves_bytes(&self) -> &[u8] {
        match &self.leaves {
            Leaves::Full(cells) => bytemuck::cast_slice(cells),
            Leaves::Compressed(cells) => bytemuck::cast_slice(cells),
        }
    }

    /// Calculate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Entry>() * self.entries.len()
            + std::mem::size_of::<i32>() * self.ref_ids.len()
            + self.leaves.memory_usage()
            + std::mem::size_of::<i32>() * self.offsets.len()
    }

    /// Summary counters
    pub fn stats(&self) -> GridStats {
        GridStats {
            num_cells: self.num_cells(),
            num_entries: self.num_entries(),
            num_refs: self.num_refs(),
            num_levels: self.num_levels(),
            compressed: self.is_compressed(),
            memory_bytes: self.memory_usage(),
        }
    }

    /// Exhaustive structural check of the frozen arrays
    ///
    /// Verifies every voxel map entry targets in-bounds data, every cell's
    /// reference range or chain stays inside the reference array and
    /// terminates, and the per-cell reference counts sum to `num_refs`.
    /// Intended for the builder handoff and for tools; query paths never
    /// run this.
    pub fn validate(&self) -> Result<()> {
        let num_entries = self.entries.len();
        let num_cells = self.num_cells();

        self.entries.par_iter().enumerate().try_for_each(|(i, e)| {
            if e.is_leaf() {
                if (e.begin() as usize) >= num_cells {
                    return Err(Error::Grid(format!(
                        "entry {i} points at cell {} of {num_cells}",
                        e.begin()
                    )));
                }
            } else {
                let block = 1usize << (3 * e.log_dim());
                if e.begin() as usize + block > num_entries {
                    return Err(Error::Grid(format!(
                        "entry {i} child block [{}, {}) exceeds {num_entries} entries",
                        e.begin(),
                        e.begin() as usize + block
                    )));
                }
            }
            Ok(())
        })?;

        let counted: usize = match &self.leaves {
            Leaves::Full(cells) => cells
                .par_iter()
                .enumerate()
                .map(|(i, c)| {
                    if c.begin < 0 || c.end < c.begin || c.end as usize > self.ref_ids.len() {
                        return Err(Error::Grid(format!(
                            "cell {i} reference range [{}, {}) exceeds {} refs",
                            c.begin,
                            c.end,
                            self.ref_ids.len()
                        )));
                    }
                    Ok(c.num_refs())
                })
                .try_reduce(|| 0, |a, b| Ok(a + b))?,
            Leaves::Compressed(cells) => cells
                .par_iter()
                .enumerate()
                .map(|(i, c)| {
                    if c.begin < 0 {
                        return Ok(0);
                    }
                    let mut cur = c.begin as usize;
                    let mut count = 0;
                    loop {
                        if cur >= self.ref_ids.len() {
                            return Err(Error::Grid(format!(
                                "cell {i} chain ran past the reference array without a terminator"
                            )));
                        }
                        if self.ref_ids[cur] < 0 {
                            break;
                        }
                        cur += 1;
                        count += 1;
                    }
                    Ok(count)
                })
                .try_reduce(|| 0, |a, b| Ok(a + b))?,
        };

        if counted != self.num_refs {
            return Err(Error::Grid(format!(
                "cells own {counted} references, grid claims {}",
                self.num_refs
            )));
        }
        Ok(())
    }
}

/// Compute top-level grid dimensions from scene bounds and primitive count
///
/// Cleary's heuristic: the resolution per axis is the axis extent times
/// `cbrt(density * num_prims / volume)`, floored and clamped to at least 1.
/// Higher density trades memory for traversal speed. A degenerate box
/// (zero volume) is a caller precondition violation.
pub fn compute_grid_dims(bbox: &Aabb, num_prims: usize, density: f32) -> IVec3 {
    let extents = bbox.extents();
    let volume = extents.x * extents.y * extents.z;
    let ratio = (density * num_prims as f32 / volume).cbrt();
    (extents * ratio).as_ivec3().max(IVec3::ONE)
}

/// Build a small deterministic two-level grid for tests and benchmarks
///
/// Top level is 2x2x2 with shift 1 (finest resolution 4x4x4). The first
/// top-level voxel is subdivided once into eight single-voxel cells; the
/// remaining seven are leaves covering their full 2x2x2 block. Cell `i`
/// owns references `2i` and `2i + 1`.
pub fn create_test_grid(compressed: bool) -> Grid {
    let dims = IVec3::splat(2);
    let shift = 1;
    let num_cells = 8 + 7;

    let mut entries = Vec::with_capacity(8 + 8);
    entries.push(Entry::new(1, 8));
    for t in 1..8u32 {
        entries.push(Entry::leaf(8 + (t - 1)));
    }
    entries.extend((0..8).map(Entry::leaf));

    let mut bounds = Vec::with_capacity(num_cells);
    for j in 0..8i32 {
        let k = IVec3::new(j & 1, (j >> 1) & 1, j >> 2);
        bounds.push((k, k));
    }
    for t in 1..8i32 {
        let tv = IVec3::new(t & 1, (t >> 1) & 1, t >> 2);
        bounds.push((tv * 2, tv * 2 + IVec3::ONE));
    }

    let num_refs = 2 * num_cells;
    let (ref_ids, leaves) = if compressed {
        let mut ref_ids = Vec::with_capacity(3 * num_cells);
        let cells = bounds
            .iter()
            .enumerate()
            .map(|(i, (min, max))| {
                let begin = ref_ids.len() as i32;
                ref_ids.extend([2 * i as i32, 2 * i as i32 + 1, -1]);
                SmallCell::new(
                    [min.x as u16, min.y as u16, min.z as u16],
                    [max.x as u16, max.y as u16, max.z as u16],
                    begin,
                )
            })
            .collect();
        (ref_ids, Leaves::Compressed(cells))
    } else {
        let ref_ids = (0..num_refs as i32).collect();
        let cells = bounds
            .iter()
            .enumerate()
            .map(|(i, (min, max))| Cell::new(*min, 2 * i as i32, *max, 2 * i as i32 + 2))
            .collect();
        (ref_ids, Leaves::Full(cells))
    };

    Grid::from_parts(GridParts {
        entries,
        ref_ids,
        leaves,
        bbox: Aabb::new(Vec3::ZERO, Vec3::splat(4.0)),
        dims,
        shift,
        num_refs,
        offsets: vec![0, 8],
    })
    .expect("test grid parts are well-formed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_grid_dims_unit_ratio() {
        // Volume 8 with 8 primitives at density 1.0 gives ratio 1.0,
        // so dims equal the floored extents
        let bbox = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        assert_eq!(compute_grid_dims(&bbox, 8, 1.0), IVec3::splat(2));
    }

    #[test]
    fn test_compute_grid_dims_clamps_to_one() {
        let bbox = Aabb::new(Vec3::ZERO, Vec3::new(4.0, 4.0, 0.25));
        let dims = compute_grid_dims(&bbox, 4, 1.0);
        assert_eq!(dims, IVec3::new(4, 4, 1));
    }

    #[test]
    fn test_compute_grid_dims_density_scaling() {
        let bbox = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        let coarse = compute_grid_dims(&bbox, 8, 1.0);
        let fine = compute_grid_dims(&bbox, 8, 8.0);
        assert_eq!(fine, coarse * 2);
    }

    #[test]
    fn test_from_parts_rejects_short_voxel_map() {
        let parts = GridParts {
            entries: vec![Entry::leaf(0); 7],
            ref_ids: vec![],
            leaves: Leaves::Full(vec![]),
            bbox: Aabb::new(Vec3::ZERO, Vec3::ONE),
            dims: IVec3::splat(2),
            shift: 0,
            num_refs: 0,
            offsets: vec![0],
        };
        assert!(Grid::from_parts(parts).is_err());
    }

    #[test]
    fn test_from_parts_rejects_overclaimed_refs() {
        let parts = GridParts {
            entries: vec![Entry::leaf(0)],
            ref_ids: vec![1, 2],
            leaves: Leaves::Full(vec![Cell::new(IVec3::ZERO, 0, IVec3::ZERO, 2)]),
            bbox: Aabb::new(Vec3::ZERO, Vec3::ONE),
            dims: IVec3::splat(1),
            shift: 0,
            num_refs: 3,
            offsets: vec![0],
        };
        assert!(Grid::from_parts(parts).is_err());
    }

    #[test]
    fn test_lookup_consistency() {
        // Every voxel inside a cell's bounds must look up to that cell
        let grid = create_test_grid(false);
        let cells = grid.cells().unwrap();
        for (i, cell) in cells.iter().enumerate() {
            for z in cell.min[2]..=cell.max[2] {
                for y in cell.min[1]..=cell.max[1] {
                    for x in cell.min[0]..=cell.max[0] {
                        let v = IVec3::new(x, y, z);
                        assert_eq!(grid.lookup(v), i as u32, "voxel {v} in cell {i}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_lookup_consistency_compressed() {
        let grid = create_test_grid(true);
        let cells = grid.small_cells().unwrap().to_vec();
        for (i, cell) in cells.iter().enumerate() {
            for z in cell.min[2]..=cell.max[2] {
                for y in cell.min[1]..=cell.max[1] {
                    for x in cell.min[0]..=cell.max[0] {
                        let v = IVec3::new(x as i32, y as i32, z as i32);
                        assert_eq!(grid.lookup(v), i as u32, "voxel {v} in cell {i}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_lookup_is_idempotent() {
        let grid = create_test_grid(false);
        let v = IVec3::new(3, 2, 1);
        let first = grid.lookup(v);
        for _ in 0..10 {
            assert_eq!(grid.lookup(v), first);
        }
    }

    #[test]
    fn test_for_each_ref_through_grid() {
        for compressed in [false, true] {
            let grid = create_test_grid(compressed);
            for cell in 0..grid.num_cells() as u32 {
                let mut visited = Vec::new();
                let count = grid.for_each_ref(cell, |r| visited.push(r));
                assert_eq!(count, 2);
                assert_eq!(visited, vec![2 * cell as i32, 2 * cell as i32 + 1]);
            }
        }
    }

    #[test]
    fn test_parallel_reads_match_serial() {
        let grid = create_test_grid(false);
        let voxels: Vec<IVec3> = (0..64)
            .map(|i| IVec3::new(i % 4, (i / 4) % 4, i / 16))
            .collect();
        let serial: Vec<u32> = voxels.iter().map(|&v| grid.lookup(v)).collect();
        let parallel: Vec<u32> = voxels.par_iter().map(|&v| grid.lookup(v)).collect();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_stats_and_memory() {
        let grid = create_test_grid(false);
        let stats = grid.stats();
        assert_eq!(stats.num_cells, 15);
        assert_eq!(stats.num_entries, 16);
        assert_eq!(stats.num_refs, 30);
        assert_eq!(stats.num_levels, 2);
        assert!(!stats.compressed);
        assert_eq!(stats.memory_bytes, grid.memory_usage());
        assert!(grid.memory_usage() >= 16 * 4 + 30 * 4 + 15 * 32);

        assert!(create_test_grid(true).stats().compressed);
    }

    #[test]
    fn test_validate_accepts_test_grids() {
        assert!(create_test_grid(false).validate().is_ok());
        assert!(create_test_grid(true).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_entry_target() {
        let parts = GridParts {
            entries: vec![Entry::leaf(5)],
            ref_ids: vec![],
            leaves: Leaves::Full(vec![Cell::new(IVec3::ZERO, 0, IVec3::ZERO, 0)]),
            bbox: Aabb::new(Vec3::ZERO, Vec3::ONE),
            dims: IVec3::splat(1),
            shift: 0,
            num_refs: 0,
            offsets: vec![0],
        };
        let grid = Grid::from_parts(parts).unwrap();
        assert!(grid.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unterminated_chain() {
        let parts = GridParts {
            entries: vec![Entry::leaf(0)],
            ref_ids: vec![3, 4],
            leaves: Leaves::Compressed(vec![SmallCell::new([0; 3], [0; 3], 0)]),
            bbox: Aabb::new(Vec3::ZERO, Vec3::ONE),
            dims: IVec3::splat(1),
            shift: 0,
            num_refs: 2,
            offsets: vec![0],
        };
        let grid = Grid::from_parts(parts).unwrap();
        assert!(grid.validate().is_err());
    }

    #[test]
    fn test_upload_byte_views() {
        let grid = create_test_grid(false);
        assert_eq!(grid.entries_bytes().len(), 16 * 4);
        assert_eq!(grid.ref_ids_bytes().len(), 30 * 4);
        assert_eq!(grid.leaves_bytes().len(), 15 * 32);
        assert_eq!(create_test_grid(true).leaves_bytes().len(), 15 * 16);
    }

    #[test]
    fn test_voxel_dims() {
        let grid = create_test_grid(false);
        assert_eq!(grid.dims(), IVec3::splat(2));
        assert_eq!(grid.voxel_dims(), IVec3::splat(4));
    }
}
