use core::ptr::{self, NonNull};

use log::{debug, trace};

use crate::allocator::TagAllocator;
use crate::block::{Block, block_size_for};
use crate::heap::HeapSource;

/// How a resize was satisfied without moving the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InPlace {
  /// The block already had room.
  Fits,
  /// The free block that followed was absorbed.
  AbsorbedNext,
  /// The block was last and the region grew under it.
  ExtendedTail,
}

impl<H: HeapSource> TagAllocator<H> {
  /// Resizes an allocation, preserving the first `min(old, size)` bytes.
  ///
  /// `None` behaves like [`allocate`](Self::allocate), `size == 0` like
  /// [`free`](Self::free). The block is grown in place whenever possible;
  /// otherwise the contents move to a new allocation. When that fails the
  /// result is `None` and the original allocation stays valid.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by this allocator and not freed since.
  /// It must not be used after a successful call.
  pub unsafe fn reallocate(
    &mut self,
    ptr: Option<NonNull<u8>>,
    size: usize,
  ) -> Option<NonNull<u8>> {
    if size == 0 {
      unsafe { self.free(ptr) };
      return None;
    }

    let Some(ptr) = ptr else {
      return self.allocate(size);
    };

    let block = self.region.block_of(ptr);
    if let Some(how) = self.resize_in_place(block, size) {
      trace!("reallocate({ptr:p}, {size}) in place: {how:?}");
      return Some(ptr);
    }

    let old_size = self.region.usable_size(block);
    let moved = self.allocate(size)?;

    // Safety: both blocks are live and distinct, each long enough.
    unsafe { ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), old_size.min(size)) };
    self.release(block);

    trace!("reallocate({ptr:p}, {size}) moved to {moved:p}");
    Some(moved)
  }

  fn resize_in_place(
    &mut self,
    block: Block,
    size: usize,
  ) -> Option<InPlace> {
    if self.region.usable_size(block) >= size {
      return Some(InPlace::Fits);
    }

    let needed = block_size_for(size)?;
    let current = self.region.size_of(block);

    match self.region.next(block) {
      Some(next) => {
        if self.region.is_allocated(next) {
          return None;
        }

        let combined = current + self.region.size_of(next);
        if combined < needed {
          return None;
        }

        self.region.remove(next);
        self.region.encode(block, combined, true);
        Some(InPlace::AbsorbedNext)
      }
      None => {
        self
          .grower
          .grow(&mut self.heap, &mut self.region, needed - current)
          .inspect_err(|error| debug!("cannot extend tail block in place: {error}"))
          .ok()?;

        self.region.encode(block, needed, true);
        Some(InPlace::ExtendedTail)
      }
    }
  }
}
