//! Circular doubly-linked list of free blocks, anchored at the sentinel.
//!
//! Blocks are always appended at the tail, so list order follows the order
//! in which blocks became free, not their position in the region.

use crate::block::Block;
use crate::region::Region;

impl Region {
  /// Turns the first 16 bytes of the region into an empty list.
  pub(crate) fn init_free_list(&mut self) {
    self.set_link_prev(Block::SENTINEL, Block::SENTINEL);
    self.set_link_next(Block::SENTINEL, Block::SENTINEL);
  }

  /// Links `block` between the current tail and the sentinel.
  pub(crate) fn insert_at_tail(
    &mut self,
    block: Block,
  ) {
    let tail = self.link_prev(Block::SENTINEL);

    self.set_link_next(tail, block);
    self.set_link_next(block, Block::SENTINEL);
    self.set_link_prev(Block::SENTINEL, block);
    self.set_link_prev(block, tail);
  }

  /// Unlinks a block that is currently on the list.
  pub(crate) fn remove(
    &mut self,
    block: Block,
  ) {
    debug_assert_ne!(block, Block::SENTINEL);

    let prev = self.link_prev(block);
    let next = self.link_next(block);

    self.set_link_next(prev, next);
    self.set_link_prev(next, prev);
  }

  /// Whether no free block is linked in.
  pub(crate) fn free_list_is_empty(&self) -> bool {
    self.link_next(Block::SENTINEL) == Block::SENTINEL
  }

  /// Free blocks in list order, sentinel excluded.
  pub(crate) fn free_blocks(&self) -> FreeBlocks<'_> {
    FreeBlocks {
      region: self,
      cursor: Block::SENTINEL,
    }
  }
}

pub(crate) struct FreeBlocks<'a> {
  region: &'a Region,
  cursor: Block,
}

impl Iterator for FreeBlocks<'_> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    let next = self.region.link_next(self.cursor);
    if next == Block::SENTINEL {
      return None;
    }

    self.cursor = next;
    Some(next)
  }
}
