use crate::align::ALIGNMENT;
use crate::block::MIN_BLOCK_SIZE;
use crate::error::{AllocError, Result};

/// Tunables of the allocator engine. None of them affects correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  /// Free blocks inspected by one best-fit search before settling.
  pub fit_scan_limit: u32,
  /// Seed of the adaptive heap-growth chunk, in bytes.
  pub initial_chunk_size: usize,
  /// Smallest surplus worth requesting a whole chunk for.
  pub min_grow_excess: usize,
}

impl Config {
  pub const DEFAULT: Config = Config {
    fit_scan_limit: 1 << 9,
    initial_chunk_size: 1 << 7,
    min_grow_excess: 64,
  };

  pub const fn new() -> Self {
    Self::DEFAULT
  }

  pub const fn with_fit_scan_limit(
    mut self,
    limit: u32,
  ) -> Self {
    self.fit_scan_limit = limit;
    self
  }

  pub const fn with_initial_chunk_size(
    mut self,
    bytes: usize,
  ) -> Self {
    self.initial_chunk_size = bytes;
    self
  }

  pub const fn with_min_grow_excess(
    mut self,
    bytes: usize,
  ) -> Self {
    self.min_grow_excess = bytes;
    self
  }

  pub(crate) fn validate(&self) -> Result<()> {
    if self.fit_scan_limit == 0 {
      return Err(AllocError::InvalidConfig("fit scan limit must be positive"));
    }
    if self.initial_chunk_size == 0 || self.initial_chunk_size % ALIGNMENT != 0 {
      return Err(AllocError::InvalidConfig(
        "initial chunk size must be a non-zero multiple of the alignment unit",
      ));
    }
    if self.min_grow_excess < MIN_BLOCK_SIZE {
      return Err(AllocError::InvalidConfig(
        "grow excess threshold must hold at least one block",
      ));
    }
    Ok(())
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::DEFAULT
  }
}
