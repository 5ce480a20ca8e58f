//! Filesystem layer for Graft
//!
//! Provides the primitives the plugin manager builds on: atomic writes
//! guarded by advisory lock files, a format-agnostic config store, and
//! helpers for walking, copying and pruning directory trees.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod lock;
pub mod tree;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use io::RobustnessConfig;
pub use lock::FileLock;
