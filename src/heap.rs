use core::ptr::NonNull;
use std::alloc::{self, Layout};

use crate::align::ALIGNMENT;
use crate::error::{AllocError, Result};

/// The heap-growth primitive: the only outward call the allocator makes.
///
/// # Safety
///
/// A successful `grow(n)` must return `n` bytes that are writable and owned
/// exclusively by the caller for as long as the source lives. Consecutive
/// grants are expected to be contiguous (each one starting where the previous
/// one ended); the allocator checks this and refuses space that is not.
pub unsafe trait HeapSource {
  /// Extends the heap by `increment` bytes and returns the start of the new
  /// space (the previous top of the heap).
  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>>;
}

/// Grows the process data segment with `sbrk(2)`.
///
/// Other users of the program break in the same process (the system `malloc`
/// for one) make growth non-contiguous; the allocator then reports
/// [`AllocError::Discontiguous`] instead of corrupting anything.
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct SbrkHeap {
  _private: (),
}

#[cfg(unix)]
impl SbrkHeap {
  pub const fn new() -> Self {
    Self { _private: () }
  }
}

/// Current program break, as reported by `sbrk(0)`.
#[cfg(unix)]
pub fn program_break() -> *mut u8 {
  unsafe { libc::sbrk(0) }.cast::<u8>()
}

#[cfg(unix)]
unsafe impl HeapSource for SbrkHeap {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>> {
    let out_of_memory = AllocError::OutOfMemory { requested: increment };

    let delta = libc::intptr_t::try_from(increment).map_err(|_| out_of_memory)?;
    let address = unsafe { libc::sbrk(delta) };

    if address == usize::MAX as *mut libc::c_void {
      return Err(out_of_memory);
    }

    NonNull::new(address.cast::<u8>()).ok_or(out_of_memory)
  }
}

/// A fixed-capacity heap carved out of one owned buffer.
///
/// Behaves like a private program break: `grow` bumps a cursor and fails
/// once the capacity is used up. The buffer is 16-byte aligned and zeroed.
pub struct ArenaHeap {
  base: NonNull<u8>,
  capacity: usize,
  brk: usize,
}

// The buffer is owned by the arena alone.
unsafe impl Send for ArenaHeap {}

impl ArenaHeap {
  pub fn new(capacity: usize) -> Result<Self> {
    let layout = Self::layout(capacity)?;
    let base = unsafe { alloc::alloc_zeroed(layout) };

    let base = NonNull::new(base).ok_or(AllocError::OutOfMemory { requested: capacity })?;

    Ok(Self { base, capacity, brk: 0 })
  }

  fn layout(capacity: usize) -> Result<Layout> {
    Layout::from_size_align(capacity.max(1), ALIGNMENT)
      .map_err(|_| AllocError::OutOfMemory { requested: capacity })
  }

  /// Total bytes this arena can ever hand out.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.brk
  }

  /// Current top of the arena.
  pub fn top(&self) -> *mut u8 {
    self.base.as_ptr().wrapping_add(self.brk)
  }
}

unsafe impl HeapSource for ArenaHeap {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>> {
    if increment > self.capacity - self.brk {
      return Err(AllocError::OutOfMemory { requested: increment });
    }

    let start = unsafe { self.base.add(self.brk) };
    self.brk += increment;

    Ok(start)
  }
}

impl Drop for ArenaHeap {
  fn drop(&mut self) {
    if let Ok(layout) = Self::layout(self.capacity) {
      unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
    }
  }
}
