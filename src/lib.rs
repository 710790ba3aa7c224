//! # tagalloc - A Boundary-Tag Memory Allocator Library
//!
//! This crate provides a general-purpose **boundary-tag allocator**: a
//! replacement for the `malloc`/`free`/`realloc`/`calloc` family that manages
//! one contiguous heap grown through `sbrk(2)` (or any other
//! [`HeapSource`]).
//!
//! ## Overview
//!
//! Every block of the heap carries its size and state twice, at both ends,
//! so the neighbours of any block are found in O(1) in either direction:
//!
//! ```text
//!   Heap Region:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                           HEAP MEMORY                                │
//!   │                                                                      │
//!   │  ┌────┬──────────┬────────────────┬──────────┬──────────────────┐    │
//!   │  │ S  │ A1 used  │    F1 free     │ A2 used  │     F2 free      │    │
//!   │  └────┴──────────┴────────────────┴──────────┴──────────────────┘    │
//!   │    │                  ▲                              ▲           ▲   │
//!   │    │                  │     free list (circular)     │           │   │
//!   │    └──────────────────┴──────────────────────────────┘       Program │
//!   │  Sentinel                                                     Break  │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Allocation**: bounded best-fit over the free list, splitting off any
//!   remainder that can stand as a block of its own.
//! - **Deallocation**: the block is merged with free neighbours right away,
//!   so two free blocks are never adjacent.
//! - **Growth**: only when nothing fits, in chunks that adapt to the
//!   recent request sizes.
//! - **Reallocation**: in place whenever the block has room, can swallow a
//!   free successor, or sits at the end of the heap.
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment unit and macros (align!, align_to!)
//!   ├── block      - Boundary tags and neighbour navigation (internal)
//!   ├── region     - Offset-addressed view of the heap (internal)
//!   ├── free_list  - Circular free list with sentinel (internal)
//!   ├── fit        - Best-fit search and splitting (internal)
//!   ├── coalesce   - Merging of free neighbours (internal)
//!   ├── grow       - Adaptive heap growth (internal)
//!   ├── realloc    - In-place reallocation
//!   ├── allocator  - TagAllocator
//!   ├── check      - Heap consistency checker, HeapStats
//!   ├── global     - LockedAllocator (GlobalAlloc)
//!   ├── heap       - HeapSource, SbrkHeap, ArenaHeap
//!   ├── config     - Config
//!   └── error      - AllocError, InvariantViolation
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{ArenaHeap, TagAllocator};
//!
//! let heap = ArenaHeap::new(1 << 20).unwrap();
//! let mut allocator = TagAllocator::new(heap).unwrap();
//!
//! let ptr = allocator.allocate(64).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0x2A, 64);
//!
//!     let ptr = allocator.reallocate(Some(ptr), 256).unwrap();
//!     assert_eq!(*ptr.as_ptr(), 0x2A);
//!
//!     allocator.free(Some(ptr));
//! }
//!
//! assert!(allocator.check_invariants(false).is_ok());
//! ```
//!
//! ## How It Works
//!
//! Each block is framed by a 4-byte header and a 4-byte footer holding the
//! block size with the allocated flag in the lowest bit:
//!
//! ```text
//!   Allocated Block:
//!   ┌────────┬──────────────────────────────────────────┬────────┐
//!   │ size|1 │             payload (16-aligned)         │ size|1 │
//!   └────────┴──────────────────────────────────────────┴────────┘
//!            ▲
//!            └── Pointer returned to user
//!
//!   Free Block:
//!   ┌────────┬──────┬──────┬────────────────────────────┬────────┐
//!   │ size|0 │ prev │ next │                            │ size|0 │
//!   └────────┴──────┴──────┴────────────────────────────┴────────┘
//!                ▲      ▲
//!                └──────┴── 32-bit offsets from the sentinel
//! ```
//!
//! ## Features
//!
//! - **O(1) free**: boundary tags make both neighbours reachable directly
//! - **Compact metadata**: 8 bytes per allocated block, 16-byte minimum block
//! - **Pluggable growth**: `sbrk(2)`, a fixed arena, or your own [`HeapSource`]
//! - **Auditable**: [`TagAllocator::check_invariants`] verifies the whole heap
//!
//! ## Limitations
//!
//! - **Single-threaded core**: wrap in [`LockedAllocator`] to share it
//! - **Grow-only**: memory is never returned to the operating system
//! - **4 GiB heap**: free-list links are 32-bit offsets
//! - **16-byte alignment**: stricter alignments are not supported
//!
//! ## Safety
//!
//! Freeing or reallocating a pointer that this allocator did not hand out, or
//! freeing it twice, is undefined behaviour and is not detected.

pub mod align;
mod allocator;
mod block;
mod check;
mod coalesce;
mod config;
mod error;
mod fit;
mod free_list;
mod global;
mod grow;
mod heap;
mod realloc;
mod region;

pub use allocator::TagAllocator;
pub use block::MIN_BLOCK_SIZE;
pub use check::HeapStats;
pub use config::Config;
pub use error::{AllocError, InvariantViolation, Result};
pub use global::LockedAllocator;
pub use heap::{ArenaHeap, HeapSource};
#[cfg(unix)]
pub use heap::{SbrkHeap, program_break};
