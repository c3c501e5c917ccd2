#![allow(dead_code)] // Each integration test binary uses a different slice of the harness

pub mod builders;
pub mod harness;
pub mod strategies;

pub use builders::*;
pub use harness::*;
