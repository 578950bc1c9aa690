//! Mathematical utilities and data structures

pub mod aabb;
pub mod range;

pub use aabb::Aabb;
pub use range::{Range, compute_range};
