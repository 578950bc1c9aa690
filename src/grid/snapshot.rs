//! Frozen-grid serialization and disk I/O

use std::path::Path;

use rkyv::{Archive, Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{IVec3, Result, Vec3};
use crate::math::aabb::Aabb;
use super::entry::Entry;
use super::grid::{Grid, GridParts, Leaves};

/// Serializable grid snapshot
///
/// Entry, Cell and SmallCell are plain Pod records, so the owned arrays
/// archive directly without translation.
#[derive(Archive, Deserialize, Serialize)]
pub struct GridData {
    pub bbox_min: [f32; 3],
    pub bbox_max: [f32; 3],
    pub dims: [i32; 3],
    pub shift: i32,
    pub num_refs: u64,
    pub offsets: Vec<i32>,
    pub entries: Vec<Entry>,
    pub ref_ids: Vec<i32>,
    pub leaves: Leaves,
}

/// Serialize a grid to bytes (uncompressed)
pub fn serialize_grid(grid: &Grid) -> Result<Vec<u8>> {
    let data = GridData {
        bbox_min: grid.bbox().min.to_array(),
        bbox_max: grid.bbox().max.to_array(),
        dims: grid.dims().to_array(),
        shift: grid.shift(),
        num_refs: grid.num_refs() as u64,
        offsets: grid.offsets().to_vec(),
        entries: grid.entries().to_vec(),
        ref_ids: grid.ref_ids().to_vec(),
        leaves: grid.leaves().clone(),
    };

    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&data)
        .map_err(|e| Error::Snapshot(e.to_string()))?;

    Ok(bytes.to_vec())
}

/// Deserialize a grid from bytes (uncompressed)
///
/// Runs the structural handoff checks again, so a truncated or tampered
/// snapshot surfaces as an error rather than a malformed grid.
pub fn deserialize_grid(data: &[u8]) -> Result<Grid> {
    let archived = rkyv::access::<ArchivedGridData, rkyv::rancor::Error>(data)
        .map_err(|e| Error::Snapshot(e.to_string()))?;

    let grid_data: GridData = rkyv::deserialize::<GridData, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Snapshot(e.to_string()))?;

    Grid::from_parts(GridParts {
        entries: grid_data.entries,
        ref_ids: grid_data.ref_ids,
        leaves: grid_data.leaves,
        bbox: Aabb::new(
            Vec3::from_array(grid_data.bbox_min),
            Vec3::from_array(grid_data.bbox_max),
        ),
        dims: IVec3::from_array(grid_data.dims),
        shift: grid_data.shift,
        num_refs: grid_data.num_refs as usize,
        offsets: grid_data.offsets,
    })
}

/// Serialize and compress a grid using LZ4
pub fn compress_grid(grid: &Grid) -> Result<Vec<u8>> {
    let serialized = serialize_grid(grid)?;
    Ok(lz4_flex::compress_prepend_size(&serialized))
}

/// Decompress and deserialize a grid
pub fn decompress_grid(data: &[u8]) -> Result<Grid> {
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::Snapshot(format!("LZ4 decompression failed: {}", e)))?;
    deserialize_grid(&decompressed)
}

/// Save a grid snapshot to disk (compressed)
pub fn save_grid(path: &Path, grid: &Grid) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, compress_grid(grid)?)?;
    Ok(())
}

/// Load a grid snapshot from disk
pub fn load_grid(path: &Path) -> Result<Grid> {
    let compressed = std::fs::read(path)?;
    decompress_grid(&compressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::grid::create_test_grid;

    fn assert_grids_equal(a: &Grid, b: &Grid) {
        assert_eq!(a.entries(), b.entries());
        assert_eq!(a.ref_ids(), b.ref_ids());
        assert_eq!(a.bbox(), b.bbox());
        assert_eq!(a.dims(), b.dims());
        assert_eq!(a.shift(), b.shift());
        assert_eq!(a.num_refs(), b.num_refs());
        assert_eq!(a.offsets(), b.offsets());
        assert_eq!(a.cells(), b.cells());
        assert_eq!(a.small_cells(), b.small_cells());
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        for compressed in [false, true] {
            let grid = create_test_grid(compressed);
            let bytes = serialize_grid(&grid).expect("serialization failed");
            assert!(!bytes.is_empty());

            let restored = deserialize_grid(&bytes).expect("deserialization failed");
            assert_grids_equal(&grid, &restored);
        }
    }

    #[test]
    fn test_compress_decompress_roundtrip() {
        let grid = create_test_grid(true);
        let compressed = compress_grid(&grid).expect("compression failed");
        let restored = decompress_grid(&compressed).expect("decompression failed");
        assert_grids_equal(&grid, &restored);
    }

    #[test]
    fn test_compression_shrinks_serialized_form() {
        let grid = create_test_grid(false);
        let uncompressed = serialize_grid(&grid).expect("serialization failed");
        let compressed = compress_grid(&grid).expect("compression failed");
        assert!(compressed.len() <= uncompressed.len());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("snapshots").join("scene.igx");
        let grid = create_test_grid(false);

        save_grid(&path, &grid).expect("save failed");
        let loaded = load_grid(&path).expect("load failed");
        assert_grids_equal(&grid, &loaded);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let result = load_grid(&dir.path().join("missing.igx"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_garbage_input_is_rejected() {
        assert!(decompress_grid(&[0x13, 0x37, 0x00]).is_err());
    }
}
