use core::ptr::NonNull;

use crate::align::ALIGNMENT;

/// Width of a boundary tag and of a free-list link.
pub(crate) const WORD_SIZE: usize = core::mem::size_of::<u32>();

/// Links are 32-bit offsets, so the region can never outgrow them.
pub(crate) const MAX_REGION_SIZE: usize = (u32::MAX as usize) & !(ALIGNMENT - 1);

/// The managed region `[start, start + high)`.
///
/// `start` is the sentinel's header; every other position is an offset from
/// it. All typed access to heap memory goes through the word accessors below.
pub(crate) struct Region {
  start: NonNull<u8>,
  high: usize,
}

impl Region {
  /// # Safety
  ///
  /// `start` must be 4-byte aligned and point to `high` bytes that are
  /// writable and exclusively owned by the returned region.
  pub(crate) unsafe fn new(
    start: NonNull<u8>,
    high: usize,
  ) -> Self {
    debug_assert_eq!(start.as_ptr() as usize % WORD_SIZE, 0);
    Self { start, high }
  }

  /// Offset one past the last block.
  pub(crate) fn high(&self) -> usize {
    self.high
  }

  /// Absolute address of `offset`.
  pub(crate) fn address_of(
    &self,
    offset: usize,
  ) -> usize {
    self.start.as_ptr() as usize + offset
  }

  /// Takes ownership of `bytes` more bytes right after `high`.
  ///
  /// # Safety
  ///
  /// The bytes `[high, high + bytes)` must have just been granted by the heap
  /// source, contiguous with the region.
  pub(crate) unsafe fn extend(
    &mut self,
    bytes: usize,
  ) {
    debug_assert!(self.high + bytes <= MAX_REGION_SIZE);
    self.high += bytes;
  }

  pub(crate) fn read_word(
    &self,
    offset: usize,
  ) -> u32 {
    debug_assert!(
      offset % WORD_SIZE == 0 && offset + WORD_SIZE <= self.high,
      "word read at {offset:#x} outside region of {:#x} bytes",
      self.high
    );
    // Safety: offset is word aligned and inside the owned region.
    unsafe { self.start.as_ptr().add(offset).cast::<u32>().read() }
  }

  pub(crate) fn write_word(
    &mut self,
    offset: usize,
    value: u32,
  ) {
    debug_assert!(
      offset % WORD_SIZE == 0 && offset + WORD_SIZE <= self.high,
      "word write at {offset:#x} outside region of {:#x} bytes",
      self.high
    );
    // Safety: offset is word aligned and inside the owned region.
    unsafe { self.start.as_ptr().add(offset).cast::<u32>().write(value) }
  }

  /// Pointer to the byte at `offset`.
  pub(crate) fn pointer_at(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    debug_assert!(offset <= self.high);
    // Safety: offset lies inside the region, which cannot wrap the address space.
    unsafe { self.start.add(offset) }
  }

  /// Inverse of [`Region::pointer_at`].
  pub(crate) fn offset_of(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    let offset = (ptr.as_ptr() as usize).wrapping_sub(self.start.as_ptr() as usize);
    debug_assert!(offset < self.high, "pointer {ptr:?} does not belong to this region");
    offset
  }
}
