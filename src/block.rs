//! Boundary tags and physical block navigation.
//!
//! ```text
//!   allocated:  ┌────────┬───────────────────────────────┬────────┐
//!               │ header │          payload              │ footer │
//!               └────────┴───────────────────────────────┴────────┘
//!   free:       ┌────────┬──────┬──────┬─────────────────┬────────┐
//!               │ header │ prev │ next │    (unused)     │ footer │
//!               └────────┴──────┴──────┴─────────────────┴────────┘
//!                 4 B      4 B    4 B                       4 B
//! ```
//!
//! Header and footer carry the same word: the block size with the
//! allocated flag in bit 0. `prev`/`next` are free-list links stored as
//! offsets from the sentinel, and live in what is payload once allocated.

use core::ptr::NonNull;

use crate::align::{ALIGNMENT, checked_align};
use crate::region::{MAX_REGION_SIZE, Region, WORD_SIZE};

/// Header plus footer.
pub(crate) const TAGS_SIZE: usize = 2 * WORD_SIZE;

/// Smallest block: header, both links and footer.
pub const MIN_BLOCK_SIZE: usize = ALIGNMENT;

const LINK_PREV: usize = WORD_SIZE;
const LINK_NEXT: usize = 2 * WORD_SIZE;

/// Handle to a block: the offset of its header from the sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Block(u32);

impl Block {
  /// The free-list anchor, first block of the region.
  pub(crate) const SENTINEL: Block = Block(0);
  /// The first block that can ever be handed to a client.
  pub(crate) const FIRST: Block = Block(MIN_BLOCK_SIZE as u32);

  pub(crate) fn at(offset: usize) -> Self {
    debug_assert!(offset <= MAX_REGION_SIZE);
    Block(offset as u32)
  }

  pub(crate) fn offset(self) -> usize {
    self.0 as usize
  }

  /// The block starting `bytes` after this one.
  pub(crate) fn advance(
    self,
    bytes: usize,
  ) -> Self {
    Block::at(self.offset() + bytes)
  }
}

/// Encoded boundary tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Tag(u32);

impl Tag {
  pub(crate) const ALLOCATED: u32 = 1;
  pub(crate) const FLAGS: u32 = (ALIGNMENT - 1) as u32;

  pub(crate) fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert!(size % ALIGNMENT == 0 && size >= MIN_BLOCK_SIZE && size <= MAX_REGION_SIZE);
    Tag(size as u32 | if allocated { Self::ALLOCATED } else { 0 })
  }

  pub(crate) fn from_raw(raw: u32) -> Self {
    Tag(raw)
  }

  pub(crate) fn raw(self) -> u32 {
    self.0
  }

  pub(crate) fn size(self) -> usize {
    (self.0 & !Self::FLAGS) as usize
  }

  pub(crate) fn is_allocated(self) -> bool {
    self.0 & Self::ALLOCATED != 0
  }
}

/// What a block holds, read through its tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BlockKind {
  Allocated { size: usize },
  Free { size: usize, prev: Block, next: Block },
}

/// Size of the block able to hold `payload` client bytes, if representable.
pub(crate) fn block_size_for(payload: usize) -> Option<usize> {
  let size = checked_align(payload.checked_add(TAGS_SIZE)?)?;
  (size <= MAX_REGION_SIZE).then_some(size)
}

impl Region {
  /// Writes matching header and footer for `block`.
  pub(crate) fn encode(
    &mut self,
    block: Block,
    size: usize,
    allocated: bool,
  ) {
    let tag = Tag::new(size, allocated);
    self.write_word(block.offset(), tag.raw());
    self.write_word(block.offset() + size - WORD_SIZE, tag.raw());
  }

  pub(crate) fn tag(
    &self,
    block: Block,
  ) -> Tag {
    Tag::from_raw(self.read_word(block.offset()))
  }

  /// The footer word, located through the header's size.
  pub(crate) fn footer(
    &self,
    block: Block,
  ) -> Tag {
    let size = self.tag(block).size();
    Tag::from_raw(self.read_word(block.offset() + size - WORD_SIZE))
  }

  pub(crate) fn size_of(
    &self,
    block: Block,
  ) -> usize {
    self.tag(block).size()
  }

  pub(crate) fn is_allocated(
    &self,
    block: Block,
  ) -> bool {
    self.tag(block).is_allocated()
  }

  pub(crate) fn kind(
    &self,
    block: Block,
  ) -> BlockKind {
    let tag = self.tag(block);
    if tag.is_allocated() {
      BlockKind::Allocated { size: tag.size() }
    } else {
      BlockKind::Free {
        size: tag.size(),
        prev: self.link_prev(block),
        next: self.link_next(block),
      }
    }
  }

  pub(crate) fn link_prev(
    &self,
    block: Block,
  ) -> Block {
    Block(self.read_word(block.offset() + LINK_PREV))
  }

  pub(crate) fn link_next(
    &self,
    block: Block,
  ) -> Block {
    Block(self.read_word(block.offset() + LINK_NEXT))
  }

  pub(crate) fn set_link_prev(
    &mut self,
    block: Block,
    prev: Block,
  ) {
    debug_assert!(!self.is_allocated(block), "linking allocated block {block:?}");
    self.write_word(block.offset() + LINK_PREV, prev.0);
  }

  pub(crate) fn set_link_next(
    &mut self,
    block: Block,
    next: Block,
  ) {
    debug_assert!(!self.is_allocated(block), "linking allocated block {block:?}");
    self.write_word(block.offset() + LINK_NEXT, next.0);
  }

  /// Client-visible address of the block's payload.
  pub(crate) fn payload(
    &self,
    block: Block,
  ) -> NonNull<u8> {
    self.pointer_at(block.offset() + WORD_SIZE)
  }

  /// The block whose payload starts at `ptr`.
  pub(crate) fn block_of(
    &self,
    ptr: NonNull<u8>,
  ) -> Block {
    Block::at(self.offset_of(ptr) - WORD_SIZE)
  }

  /// Bytes a client may use in an allocated block.
  pub(crate) fn usable_size(
    &self,
    block: Block,
  ) -> usize {
    self.size_of(block) - TAGS_SIZE
  }

  /// The physically following block, or `None` for the last one.
  pub(crate) fn next(
    &self,
    block: Block,
  ) -> Option<Block> {
    let end = block.offset() + self.size_of(block);
    (end < self.high()).then(|| Block::at(end))
  }

  /// The physically preceding block, or `None` for the first one.
  ///
  /// The sentinel is never reported as a neighbour.
  pub(crate) fn prev(
    &self,
    block: Block,
  ) -> Option<Block> {
    if block <= Block::FIRST {
      return None;
    }

    let size = Tag::from_raw(self.read_word(block.offset() - WORD_SIZE)).size();
    Some(Block::at(block.offset() - size))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::region::testing::scratch_region;

  #[test]
  fn test_tag_packs_size_and_flag() {
    let tag = Tag::new(48, true);
    assert_eq!(tag.raw(), 49);
    assert_eq!(tag.size(), 48);
    assert!(tag.is_allocated());

    let tag = Tag::new(4096, false);
    assert_eq!(tag.size(), 4096);
    assert!(!tag.is_allocated());
  }

  #[test]
  fn test_block_size_for_payload() {
    assert_eq!(block_size_for(1), Some(16));
    assert_eq!(block_size_for(8), Some(16));
    assert_eq!(block_size_for(9), Some(32));
    assert_eq!(block_size_for(40), Some(48));
    assert_eq!(block_size_for(usize::MAX), None);
    assert_eq!(block_size_for(u32::MAX as usize), None);
  }

  #[test]
  fn test_encode_writes_header_and_footer() {
    let (_heap, mut region) = scratch_region(128);

    region.encode(Block::at(16), 48, true);

    assert_eq!(region.read_word(16), 49);
    assert_eq!(region.read_word(16 + 48 - WORD_SIZE), 49);
    assert_eq!(region.tag(Block::at(16)), region.footer(Block::at(16)));
    assert_eq!(region.kind(Block::at(16)), BlockKind::Allocated { size: 48 });
    assert_eq!(region.usable_size(Block::at(16)), 40);
  }

  #[test]
  fn test_free_block_view_exposes_links() {
    let (_heap, mut region) = scratch_region(128);

    region.encode(Block::at(32), 32, false);
    region.set_link_prev(Block::at(32), Block::SENTINEL);
    region.set_link_next(Block::at(32), Block::at(96));

    assert_eq!(
      region.kind(Block::at(32)),
      BlockKind::Free { size: 32, prev: Block::SENTINEL, next: Block::at(96) }
    );
  }

  #[test]
  fn test_navigation_across_blocks() {
    let (_heap, mut region) = scratch_region(128);

    region.encode(Block::SENTINEL, 16, false);
    region.encode(Block::at(16), 32, true);
    region.encode(Block::at(48), 48, false);
    region.encode(Block::at(96), 32, true);

    assert_eq!(region.next(Block::SENTINEL), Some(Block::FIRST));
    assert_eq!(region.next(Block::at(16)), Some(Block::at(48)));
    assert_eq!(region.next(Block::at(48)), Some(Block::at(96)));
    assert_eq!(region.next(Block::at(96)), None);

    assert_eq!(region.prev(Block::at(96)), Some(Block::at(48)));
    assert_eq!(region.prev(Block::at(48)), Some(Block::at(16)));
    assert_eq!(region.prev(Block::FIRST), None);
  }

  #[test]
  fn test_payload_maps_back_to_block() {
    let (_heap, mut region) = scratch_region(64);

    region.encode(Block::at(16), 32, true);
    let payload = region.payload(Block::at(16));

    assert_eq!(payload.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(region.block_of(payload), Block::at(16));
  }
}
