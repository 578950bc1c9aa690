//! Core types, error handling, and logging

pub mod types;
pub mod error;
pub mod logging;

pub use types::Result;
pub use error::Error;
