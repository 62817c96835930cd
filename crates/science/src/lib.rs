#![doc = include_str!("../../../README.md")]
//!

//! This crate re-exports the experiment engine from `science-core`.

pub use science_core::*;
