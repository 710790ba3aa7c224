use crate::block::Block;
use crate::region::Region;

impl Region {
  /// Merges a block that was just tagged free with its free neighbours and
  /// puts the result on the free list. Returns the merged block.
  pub(crate) fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    let prev = self.prev(block).filter(|&prev| !self.is_allocated(prev));
    let next = self.next(block).filter(|&next| !self.is_allocated(next));
    let size = self.size_of(block);

    let merged = match (prev, next) {
      (None, None) => block,
      (None, Some(next)) => {
        self.remove(next);
        let total = size + self.size_of(next);
        self.encode(block, total, false);
        block
      }
      (Some(prev), None) => {
        self.remove(prev);
        let total = self.size_of(prev) + size;
        self.encode(prev, total, false);
        prev
      }
      (Some(prev), Some(next)) => {
        self.remove(prev);
        self.remove(next);
        let total = self.size_of(prev) + size + self.size_of(next);
        self.encode(prev, total, false);
        prev
      }
    };

    self.insert_at_tail(merged);
    merged
  }
}
