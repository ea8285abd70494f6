//! Host-side startup for the Reel desktop library.
//!
//! Loads configuration and drives the database through its two startup
//! steps (open, then migrate) exactly once.

pub mod config;
pub mod startup;
