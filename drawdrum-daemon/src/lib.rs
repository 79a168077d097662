//! DrawDrum daemon library
//!
//! This module re-exports the daemon's modules for integration testing.

pub mod config;
pub mod ipc;
pub mod server;
pub mod viewer;
