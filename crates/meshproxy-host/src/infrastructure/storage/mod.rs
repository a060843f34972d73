//! Persistent host configuration.

pub mod config;
