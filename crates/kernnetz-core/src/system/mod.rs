//! # System Module
//!
//! Store-wide verification of the core layer.

mod metrics;

pub use metrics::*;
