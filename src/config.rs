//! Configuration for TideKV
//!
//! Centralized configuration with sensible defaults. Everything here is
//! fixed for the lifetime of an opened value log.

use std::path::PathBuf;

use crate::error::{Result, TideError};

/// Main configuration for a value log instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the segment files.
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── 0.vlog
    ///     ├── 1.vlog
    ///     └── ...      (highest id is the active segment)
    pub data_dir: PathBuf,

    /// Maximum segment size in bytes; a write that would reach it rotates
    pub block_size: u64,

    /// I/O strategy handed to every segment
    pub io_type: IoType,

    // -------------------------------------------------------------------------
    // Read Path Configuration
    // -------------------------------------------------------------------------
    /// Max closed segments kept open at once (0 = unbounded)
    pub max_open_segments: usize,
}

/// How a segment's bytes are accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoType {
    /// Positioned reads and writes on a plain file handle
    FileIo,

    /// File pre-allocated to the block size and memory-mapped
    MMap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tidekv_data"),
            block_size: 64 * 1024 * 1024, // 64 MB
            io_type: IoType::FileIo,
            max_open_segments: 32,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings no segment can work with
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(TideError::Config(
                "block_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment size limit (in bytes)
    pub fn block_size(mut self, size: u64) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the I/O strategy
    pub fn io_type(mut self, io_type: IoType) -> Self {
        self.config.io_type = io_type;
        self
    }

    /// Set the bound on lazily opened closed segments
    pub fn max_open_segments(mut self, count: usize) -> Self {
        self.config.max_open_segments = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
