//! Utility functions for the block stream

pub mod codec;
pub mod hashing;

pub use codec::*;
pub use hashing::*;
