use core::ptr::NonNull;

use log::{debug, trace, warn};

use crate::align::ALIGNMENT;
use crate::block::{Block, MIN_BLOCK_SIZE, block_size_for};
use crate::config::Config;
use crate::error::{AllocError, Result};
use crate::grow::Grower;
use crate::heap::HeapSource;
use crate::region::{Region, WORD_SIZE};

/// A boundary-tag allocator owning one contiguous, growing region.
///
/// Every block carries a header and a footer; free blocks are additionally
/// threaded on a circular list anchored at a sentinel block. Allocation is
/// bounded best-fit with splitting, freeing coalesces eagerly, and the region
/// grows through the [`HeapSource`] only when no free block fits.
///
/// Not thread-safe on its own. See [`LockedAllocator`](crate::LockedAllocator)
/// for a shared, lock-protected wrapper.
pub struct TagAllocator<H: HeapSource> {
  pub(crate) heap: H,
  pub(crate) region: Region,
  pub(crate) grower: Grower,
  pub(crate) config: Config,
}

// The region is owned exclusively by the allocator.
unsafe impl<H: HeapSource + Send> Send for TagAllocator<H> {}

impl<H: HeapSource> TagAllocator<H> {
  /// Sets up an allocator with the default tunables.
  pub fn new(heap: H) -> Result<Self> {
    Self::init(heap, Config::DEFAULT)
  }

  /// Claims the start of the heap and places the sentinel block there.
  ///
  /// The sentinel is positioned so that every payload handed out later is
  /// aligned to [`ALIGNMENT`], whatever address the heap source starts at.
  pub fn init(
    mut heap: H,
    config: Config,
  ) -> Result<Self> {
    config.validate()?;

    let prologue = ALIGNMENT - WORD_SIZE;
    let base = heap.grow(prologue)?;
    let base_addr = base.as_ptr() as usize;

    let padding = crate::align!(base_addr + WORD_SIZE) - WORD_SIZE - base_addr;
    let rest = heap.grow(padding + MIN_BLOCK_SIZE - prologue)?;

    let expected = base_addr + prologue;
    let found = rest.as_ptr() as usize;
    if found != expected {
      return Err(AllocError::Discontiguous { expected, found });
    }

    // Safety: padding + sentinel lie within the two grants just received.
    let start = unsafe { base.add(padding) };
    let mut region = unsafe { Region::new(start, MIN_BLOCK_SIZE) };

    region.encode(Block::SENTINEL, MIN_BLOCK_SIZE, false);
    region.init_free_list();

    debug!(
      "heap initialised at {:#x} (padding {padding}, chunk {})",
      region.address_of(0),
      config.initial_chunk_size
    );

    Ok(Self {
      heap,
      region,
      grower: Grower::new(&config),
      config,
    })
  }

  /// Allocates `size` bytes aligned to [`ALIGNMENT`].
  ///
  /// Returns `None` for `size == 0` and when the heap cannot grow any
  /// further; in the latter case nothing else changes.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    if size == 0 {
      return None;
    }

    let block = self
      .allocate_block(size)
      .inspect_err(|error| warn!("allocate({size}) failed: {error}"))
      .ok()?;

    let ptr = self.region.payload(block);
    trace!("allocate({size}) -> {ptr:p}");
    Some(ptr)
  }

  pub(crate) fn allocate_block(
    &mut self,
    size: usize,
  ) -> Result<Block> {
    let needed = block_size_for(size).ok_or(AllocError::OutOfMemory { requested: size })?;

    if let Some(block) = self.region.find_fit(needed, self.config.fit_scan_limit) {
      self.region.place(block, needed);
      return Ok(block);
    }

    self
      .grower
      .grow(&mut self.heap, &mut self.region, needed)
  }

  /// Releases an allocation. `None` is ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by this allocator and not freed since.
  pub unsafe fn free(
    &mut self,
    ptr: Option<NonNull<u8>>,
  ) {
    let Some(ptr) = ptr else {
      return;
    };

    let block = self.region.block_of(ptr);
    let merged = self.release(block);
    trace!(
      "free({ptr:p}) -> free block {:#x} of {} bytes",
      merged.offset(),
      self.region.size_of(merged)
    );
  }

  pub(crate) fn release(
    &mut self,
    block: Block,
  ) -> Block {
    let size = self.region.size_of(block);
    self.region.encode(block, size, false);
    self.region.coalesce(block)
  }

  /// Allocates `count * size` zeroed bytes; `None` on overflow.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let Some(bytes) = count.checked_mul(size) else {
      warn!("zero_allocate({count}, {size}) overflows");
      return None;
    };

    let ptr = self.allocate(bytes)?;
    // Safety: the allocation is at least `bytes` long and exclusively ours.
    unsafe { ptr.as_ptr().write_bytes(0, bytes) };
    Some(ptr)
  }

  /// Bytes actually available behind `ptr`, which may exceed the request.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation of this allocator.
  pub unsafe fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    self.region.usable_size(self.region.block_of(ptr))
  }

  /// Bytes currently claimed from the heap source, sentinel included.
  pub fn heap_size(&self) -> usize {
    self.region.high()
  }

  /// Current heap-growth chunk estimate.
  pub fn chunk_size(&self) -> usize {
    self.grower.chunk_size()
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn heap(&self) -> &H {
    &self.heap
  }
}


#[cfg(test)]
mod tests {
  use super::testing::arena_allocator;
  use super::*;
  use crate::heap::ArenaHeap;

  #[test]
  fn test_init_places_sentinel() {
    let allocator = arena_allocator(4096);

    assert_eq!(allocator.heap_size(), MIN_BLOCK_SIZE);
    assert_eq!(allocator.heap().used(), 12 + 16);
    assert!(allocator.region.free_list_is_empty());
    assert!(allocator.check_invariants(false).is_ok());
  }

  #[test]
  fn test_init_realigns_odd_start() {
    struct Offset(ArenaHeap);

    unsafe impl HeapSource for Offset {
      fn grow(
        &mut self,
        increment: usize,
      ) -> Result<NonNull<u8>> {
        self.0.grow(increment)
      }
    }

    let mut heap = ArenaHeap::new(4096).unwrap();
    heap.grow(4).unwrap();

    let mut allocator = TagAllocator::new(Offset(heap)).unwrap();
    let ptr = allocator.allocate(24).unwrap();

    assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(allocator.heap().0.used(), 4 + 24 + 128);
    assert!(allocator.check_invariants(false).is_ok());
  }

  #[test]
  fn test_init_fails_without_memory() {
    let heap = ArenaHeap::new(8).unwrap();
    assert!(matches!(
      TagAllocator::new(heap),
      Err(AllocError::OutOfMemory { .. })
    ));
  }

  #[test]
  fn test_init_rejects_bad_config() {
    let heap = ArenaHeap::new(4096).unwrap();
    let config = Config::DEFAULT.with_fit_scan_limit(0);
    assert!(matches!(
      TagAllocator::init(heap, config),
      Err(AllocError::InvalidConfig(_))
    ));
  }

  #[test]
  fn test_alloc() {
    let mut allocator = arena_allocator(1 << 16);

    unsafe {
      let first_addr = allocator.allocate(8).unwrap().as_ptr() as *mut u64;

      *first_addr = 3u64;

      assert_eq!(*first_addr, 3);

      let size: usize = 6;

      let second_addr = allocator.allocate(size * 2).unwrap().as_ptr() as *mut u16;

      for i in 0..size {
        *(second_addr.add(i)) = (i + 1) as u16;
      }

      assert_eq!(*first_addr, 3);

      for i in 0..size {
        assert_eq!((i + 1) as u16, *(second_addr.add(i)))
      }

      allocator.free(NonNull::new(first_addr as *mut u8));

      let third_addr = allocator.allocate(4).unwrap().as_ptr() as *mut u32;

      assert_eq!(first_addr as *mut u32, third_addr);

      allocator.free(NonNull::new(third_addr as *mut u8));

      let fourth_addr = allocator.allocate(16).unwrap().as_ptr() as *mut u128;

      *fourth_addr = 25;

      assert!(fourth_addr > third_addr as *mut u128);

      assert_eq!(*fourth_addr, 25);
    }
  }

  #[test]
  fn test_zero_size_is_none() {
    let mut allocator = arena_allocator(4096);

    assert_eq!(allocator.allocate(0), None);
    assert_eq!(allocator.zero_allocate(0, 8), None);
    assert_eq!(allocator.heap_size(), MIN_BLOCK_SIZE);
  }

  #[test]
  fn test_free_none_is_noop() {
    let mut allocator = arena_allocator(4096);
    let ptr = allocator.allocate(32).unwrap();

    unsafe { allocator.free(None) };

    assert!(allocator.check_invariants(false).is_ok());
    unsafe { allocator.free(Some(ptr)) };
    assert!(allocator.check_invariants(false).is_ok());
  }

  #[test]
  fn test_reuses_freed_block_before_growing() {
    let mut allocator = arena_allocator(1 << 16);

    let a1 = allocator.allocate(40).unwrap();
    let a2 = allocator.allocate(40).unwrap();
    assert_ne!(a1, a2);

    unsafe { allocator.free(Some(a1)) };
    let high = allocator.heap_size();

    let a3 = allocator.allocate(40).unwrap();
    assert_eq!(a3, a1);
    assert_eq!(allocator.heap_size(), high);
    assert!(allocator.check_invariants(false).is_ok());
  }

  #[test]
  fn test_grows_when_nothing_fits() {
    let mut allocator = arena_allocator(1 << 16);

    let a = allocator.allocate(100).unwrap();
    let _guard = allocator.allocate(8).unwrap();
    unsafe { allocator.free(Some(a)) };
    let high = allocator.heap_size();

    let b = allocator.allocate(200).unwrap();

    assert_ne!(a, b);
    assert!(allocator.heap_size() > high);

    let freed = allocator.region.block_of(a);
    assert!(allocator.region.free_blocks().any(|block| block == freed));
    assert_eq!(allocator.region.size_of(freed), 112);
    assert!(allocator.check_invariants(false).is_ok());
  }

  #[test]
  fn test_frees_coalesce_into_one_entry() {
    let mut allocator = arena_allocator(1 << 16);

    let a1 = allocator.allocate(64).unwrap();
    let a2 = allocator.allocate(64).unwrap();
    let _guard = allocator.allocate(64).unwrap();

    unsafe {
      allocator.free(Some(a1));
      allocator.free(Some(a2));
    }

    let merged = allocator.region.block_of(a1);
    let free: Vec<_> = allocator.region.free_blocks().collect();
    assert_eq!(free.iter().filter(|&&block| block == merged).count(), 1);
    assert!(!free.contains(&allocator.region.block_of(a2)));
    assert!(allocator.region.size_of(merged) >= 2 * (64 + 8));
    assert!(allocator.check_invariants(false).is_ok());
  }

  #[test]
  fn test_out_of_memory_keeps_state() {
    let mut allocator = arena_allocator(1024);

    let a = allocator.allocate(100).unwrap();
    unsafe { a.as_ptr().write_bytes(0x5A, 100) };
    let before = allocator.check_invariants(false).unwrap();

    assert_eq!(allocator.allocate(4096), None);
    assert_eq!(allocator.allocate(usize::MAX), None);

    assert_eq!(allocator.check_invariants(false).unwrap(), before);
    let bytes = unsafe { core::slice::from_raw_parts(a.as_ptr(), 100) };
    assert!(bytes.iter().all(|&b| b == 0x5A));
  }

  #[test]
  fn test_uses_last_bytes_when_chunk_is_refused() {
    let mut allocator = arena_allocator(12 + 16 + 48);

    let a = allocator.allocate(24).unwrap();
    let b = allocator.allocate(8).unwrap();

    assert_ne!(a, b);
    assert_eq!(allocator.heap().used(), allocator.heap().capacity());
    assert_eq!(allocator.allocate(8), None);

    let stats = allocator.check_invariants(false).unwrap();
    assert_eq!(stats.allocated_bytes, 32 + 16);
    assert_eq!(stats.free_blocks, 0);
  }

  #[test]
  fn test_zero_allocate_clears_reused_memory() {
    let mut allocator = arena_allocator(1 << 16);

    let dirty = allocator.allocate(64).unwrap();
    unsafe {
      dirty.as_ptr().write_bytes(0xFF, 64);
      allocator.free(Some(dirty));
    }

    let ptr = allocator.zero_allocate(8, 8).unwrap();
    assert_eq!(ptr, dirty);

    let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 64) };
    assert!(bytes.iter().all(|&b| b == 0));
  }

  #[test]
  fn test_zero_allocate_overflow() {
    let mut allocator = arena_allocator(4096);
    assert_eq!(allocator.zero_allocate(usize::MAX, 2), None);
  }

  #[test]
  fn test_usable_size_covers_request() {
    let mut allocator = arena_allocator(4096);

    for size in [1, 8, 9, 40, 100] {
      let ptr = allocator.allocate(size).unwrap();
      let usable = unsafe { allocator.usable_size(ptr) };
      assert!(usable >= size);
      assert_eq!((usable + 8) % ALIGNMENT, 0);
    }
  }

  struct XorShift(u64);

  impl XorShift {
    fn next(&mut self) -> u64 {
      self.0 ^= self.0 << 13;
      self.0 ^= self.0 >> 7;
      self.0 ^= self.0 << 17;
      self.0
    }

    fn below(
      &mut self,
      bound: usize,
    ) -> usize {
      (self.next() % bound as u64) as usize
    }
  }

  fn assert_live_allocations(live: &[(NonNull<u8>, usize, u8)]) {
    let mut ranges: Vec<_> = live
      .iter()
      .map(|&(ptr, size, _)| (ptr.as_ptr() as usize, size))
      .collect();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
      assert!(pair[0].0 + pair[0].1 <= pair[1].0, "allocations overlap: {pair:?}");
    }

    for &(ptr, size, fill) in live {
      let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), size) };
      assert!(bytes.iter().all(|&b| b == fill), "payload at {ptr:p} was clobbered");
    }
  }

  #[test]
  fn test_random_trace_keeps_invariants() {
    let mut allocator = arena_allocator(1 << 22);
    let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
    let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

    for step in 0..3000 {
      let fill = (step % 251) as u8;

      match rng.below(10) {
        0..=4 => {
          let size = if rng.below(20) == 0 { 1 + rng.below(8192) } else { 1 + rng.below(300) };
          let ptr = allocator.allocate(size).unwrap();
          assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
          unsafe { ptr.as_ptr().write_bytes(fill, size) };
          live.push((ptr, size, fill));
        }
        5..=7 if !live.is_empty() => {
          let (ptr, _, _) = live.swap_remove(rng.below(live.len()));
          unsafe { allocator.free(Some(ptr)) };
        }
        8..=9 if !live.is_empty() => {
          let index = rng.below(live.len());
          let (ptr, old_size, old_fill) = live[index];
          let size = 1 + rng.below(600);

          let moved = unsafe { allocator.reallocate(Some(ptr), size) }.unwrap();
          let kept = old_size.min(size);
          let bytes = unsafe { core::slice::from_raw_parts(moved.as_ptr(), kept) };
          assert!(bytes.iter().all(|&b| b == old_fill));

          unsafe { moved.as_ptr().write_bytes(fill, size) };
          live[index] = (moved, size, fill);
        }
        _ => {}
      }

      if let Err(violation) = allocator.check_invariants(false) {
        panic!("step {step}: {violation}");
      }
      if step % 100 == 0 {
        assert_live_allocations(&live);
      }
    }

    assert_live_allocations(&live);

    for (ptr, _, _) in live.drain(..) {
      unsafe { allocator.free(Some(ptr)) };
    }

    let stats = allocator.check_invariants(true).unwrap();
    assert_eq!(stats.allocated_blocks, 0);
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_bytes + MIN_BLOCK_SIZE, allocator.heap_size());
  }
}
