//! Irregrid - an irregular multi-resolution voxel grid for ray traversal acceleration

pub mod core;
pub mod math;
pub mod grid;
