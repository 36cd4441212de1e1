//! # kernnetz
//!
//! Command-line front end for `kernnetz-core`.

pub mod cli;
pub mod config;
