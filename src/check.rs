use std::collections::BTreeSet;

use log::{error, info};

use crate::align::ALIGNMENT;
use crate::allocator::TagAllocator;
use crate::block::{Block, BlockKind, MIN_BLOCK_SIZE, Tag};
use crate::error::InvariantViolation;
use crate::heap::HeapSource;
use crate::region::{Region, WORD_SIZE};

/// Occupancy of the region, as measured by a successful audit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes claimed from the heap source, sentinel included.
  pub heap_size: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

impl<H: HeapSource> TagAllocator<H> {
  /// Walks the whole region and the free list and checks every heap
  /// invariant. Never called by the allocator itself.
  ///
  /// With `verbose`, every block is logged at `info` level.
  pub fn check_invariants(
    &self,
    verbose: bool,
  ) -> Result<HeapStats, InvariantViolation> {
    let result = self.region.audit(verbose);

    match &result {
      Ok(stats) if verbose => info!(
        "heap top {:#x}: {} allocated ({} bytes), {} free ({} bytes)",
        self.region.address_of(self.region.high()),
        stats.allocated_blocks,
        stats.allocated_bytes,
        stats.free_blocks,
        stats.free_bytes
      ),
      Ok(_) => {}
      Err(violation) => error!("heap check failed: {violation}"),
    }

    result
  }
}

impl Region {
  fn audit(
    &self,
    verbose: bool,
  ) -> Result<HeapStats, InvariantViolation> {
    self.audit_sentinel()?;

    let mut stats = HeapStats {
      heap_size: self.high(),
      ..HeapStats::default()
    };
    let mut free = BTreeSet::new();
    let mut allocated = BTreeSet::new();
    let mut previous_free: Option<Block> = None;

    let mut block = Block::FIRST;
    let mut index = 0;
    while block.offset() < self.high() {
      let tag = self.audit_block(block)?;

      if verbose {
        match self.kind(block) {
          BlockKind::Allocated { size } => {
            info!("#{index} {:#x} size {size} allocated", block.offset());
          }
          BlockKind::Free { size, prev, next } => info!(
            "#{index} {:#x} size {size} free (prev {:#x}, next {:#x})",
            block.offset(),
            prev.offset(),
            next.offset()
          ),
        }
      }

      if tag.is_allocated() {
        stats.allocated_blocks += 1;
        stats.allocated_bytes += tag.size();
        allocated.insert(block);
        previous_free = None;
      } else {
        if let Some(first) = previous_free {
          return Err(InvariantViolation::AdjacentFree {
            first: first.offset(),
            second: block.offset(),
          });
        }
        stats.free_blocks += 1;
        stats.free_bytes += tag.size();
        stats.largest_free = stats.largest_free.max(tag.size());
        free.insert(block);
        previous_free = Some(block);
      }

      block = block.advance(tag.size());
      index += 1;
    }

    self.audit_free_list(&free, &allocated)?;

    Ok(stats)
  }

  fn audit_sentinel(&self) -> Result<(), InvariantViolation> {
    let expected = Tag::new(MIN_BLOCK_SIZE, false);
    let tag = self.tag(Block::SENTINEL);

    if tag != expected || self.footer(Block::SENTINEL) != expected {
      return Err(InvariantViolation::Sentinel { tag: tag.raw() });
    }
    Ok(())
  }

  fn audit_block(
    &self,
    block: Block,
  ) -> Result<Tag, InvariantViolation> {
    let offset = block.offset();
    let tag = self.tag(block);

    if tag.raw() & Tag::FLAGS & !Tag::ALLOCATED != 0 || tag.size() < MIN_BLOCK_SIZE {
      return Err(InvariantViolation::MalformedTag { offset, tag: tag.raw() });
    }

    let end = offset + tag.size();
    if end > self.high() {
      return Err(InvariantViolation::Overrun {
        offset,
        end,
        high: self.high(),
      });
    }

    let footer = self.footer(block);
    if footer != tag {
      return Err(InvariantViolation::TagMismatch {
        offset,
        header: tag.raw(),
        footer: footer.raw(),
      });
    }

    if self.address_of(offset + WORD_SIZE) % ALIGNMENT != 0 {
      return Err(InvariantViolation::MisalignedPayload { offset });
    }

    Ok(tag)
  }

  fn audit_free_list(
    &self,
    free: &BTreeSet<Block>,
    allocated: &BTreeSet<Block>,
  ) -> Result<(), InvariantViolation> {
    let mut listed = BTreeSet::new();
    let mut cursor = Block::SENTINEL;

    loop {
      let next = self.link_next(cursor);

      if next != Block::SENTINEL && !free.contains(&next) {
        return Err(if allocated.contains(&next) {
          InvariantViolation::AllocatedInFreeList { offset: next.offset() }
        } else {
          InvariantViolation::DanglingLink { offset: next.offset() }
        });
      }

      if self.link_prev(next) != cursor || listed.contains(&next) {
        return Err(InvariantViolation::BrokenLink { offset: next.offset() });
      }

      if next == Block::SENTINEL {
        break;
      }

      listed.insert(next);
      cursor = next;
    }

    if let Some(missing) = free.difference(&listed).next() {
      return Err(InvariantViolation::NotInFreeList { offset: missing.offset() });
    }

    Ok(())
  }
}
