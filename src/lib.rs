//! Shared library modules for the bytewatch monitoring worker.
//!
//! The binary wires these together; tests exercise them through the same
//! public surface.

pub mod chains;
pub mod config;
pub mod events;
pub mod metadata;
pub mod monitor;
pub mod rpc;
pub mod services;
pub mod supervisor;
