use thiserror::Error;

/// Failures of the allocator engine.
///
/// Public allocation operations never surface these directly: they are
/// logged and turned into `None`, leaving every live allocation untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  #[error("Out of memory (requested: {requested} bytes)")]
  OutOfMemory { requested: usize },

  #[error("Heap grew non-contiguously (expected {expected:#x}, got {found:#x})")]
  Discontiguous { expected: usize, found: usize },

  #[error("Invalid configuration: {0}")]
  InvalidConfig(&'static str),
}

pub type Result<T> = core::result::Result<T, AllocError>;

/// A broken heap invariant, as reported by the auditor.
///
/// Offsets are relative to the sentinel block.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
  #[error("Block {offset:#x}: header {header:#x} does not match footer {footer:#x}")]
  TagMismatch { offset: usize, header: u32, footer: u32 },

  #[error("Block {offset:#x}: malformed tag {tag:#x}")]
  MalformedTag { offset: usize, tag: u32 },

  #[error("Block {offset:#x}: payload is not aligned")]
  MisalignedPayload { offset: usize },

  #[error("Free blocks {first:#x} and {second:#x} are adjacent")]
  AdjacentFree { first: usize, second: usize },

  #[error("Free block {offset:#x} is missing from the free list")]
  NotInFreeList { offset: usize },

  #[error("Allocated block {offset:#x} is linked into the free list")]
  AllocatedInFreeList { offset: usize },

  #[error("Free list entry {offset:#x} is not a block boundary")]
  DanglingLink { offset: usize },

  #[error("Free list links around {offset:#x} are not symmetric")]
  BrokenLink { offset: usize },

  #[error("Block {offset:#x} ends at {end:#x}, past the heap top {high:#x}")]
  Overrun { offset: usize, end: usize, high: usize },

  #[error("Sentinel block is corrupted (tag {tag:#x})")]
  Sentinel { tag: u32 },
}
