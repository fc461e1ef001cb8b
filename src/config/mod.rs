//! Session configuration.

pub mod config;
