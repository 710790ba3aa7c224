use crate::block::{Block, MIN_BLOCK_SIZE};
use crate::region::Region;

impl Region {
  /// Bounded best-fit search.
  ///
  /// Returns the smallest free block of at least `size` bytes among the
  /// first `scan_limit` blocks on the free list.
  pub(crate) fn find_fit(
    &self,
    size: usize,
    scan_limit: u32,
  ) -> Option<Block> {
    if self.free_list_is_empty() {
      return None;
    }

    let mut best: Option<(Block, usize)> = None;

    for block in self.free_blocks().take(scan_limit as usize) {
      let candidate = self.size_of(block);
      if candidate < size {
        continue;
      }
      if candidate == size {
        return Some(block);
      }
      if best.is_none_or(|(_, best_size)| candidate < best_size) {
        best = Some((block, candidate));
      }
    }

    best.map(|(block, _)| block)
  }

  /// Allocates `size` bytes out of the free block `block`.
  ///
  /// A remainder big enough to be a block is split off and freed; anything
  /// smaller stays inside the allocation.
  pub(crate) fn place(
    &mut self,
    block: Block,
    size: usize,
  ) {
    let available = self.size_of(block);
    debug_assert!(available >= size);

    self.remove(block);

    let remainder = available - size;
    if remainder >= MIN_BLOCK_SIZE {
      let rest = block.advance(size);
      self.encode(rest, remainder, false);
      self.insert_at_tail(rest);
      self.encode(block, size, true);
    } else {
      self.encode(block, available, true);
    }
  }
}
