use log::{debug, warn};

use crate::block::Block;
use crate::config::Config;
use crate::error::{AllocError, Result};
use crate::heap::HeapSource;
use crate::region::{MAX_REGION_SIZE, Region};

/// Extends the region through the heap source, in adaptively sized chunks.
pub(crate) struct Grower {
  chunk_size: usize,
  min_excess: usize,
}

impl Grower {
  pub(crate) fn new(config: &Config) -> Self {
    Self {
      chunk_size: config.initial_chunk_size,
      min_excess: config.min_grow_excess,
    }
  }

  pub(crate) fn chunk_size(&self) -> usize {
    self.chunk_size
  }

  /// Folds a request of `size` bytes into the chunk estimate.
  ///
  /// The chunk follows requests upwards, holds steady for moderately
  /// smaller ones, and collapses to `size` when the request is tiny
  /// compared to it. It is never smaller than `size` afterwards.
  fn adapt(
    &mut self,
    size: usize,
  ) -> usize {
    self.chunk_size = if size > self.chunk_size {
      size
    } else if size > self.chunk_size >> 7 {
      self.chunk_size
    } else {
      size
    };
    self.chunk_size
  }

  /// Appends at least `size` bytes to the region.
  ///
  /// The new space starts at the old top of the region and its first `size`
  /// bytes come back as an allocated block. Surplus from a full chunk
  /// becomes a free block on the free list. A refused chunk is asked for
  /// again at exactly `size` bytes.
  pub(crate) fn grow<H: HeapSource>(
    &mut self,
    heap: &mut H,
    region: &mut Region,
    size: usize,
  ) -> Result<Block> {
    let chunk = self.adapt(size);
    let room = MAX_REGION_SIZE - region.high();

    let mut request = if chunk - size >= self.min_excess && chunk <= room {
      chunk
    } else {
      size
    };

    if request > room {
      warn!("heap region limit reached, cannot add {request} bytes");
      return Err(AllocError::OutOfMemory { requested: request });
    }

    let start = match heap.grow(request) {
      Ok(start) => start,
      Err(error) if request > size => {
        debug!("heap source refused a {request} byte chunk ({error}), retrying with {size}");
        request = size;
        heap.grow(size).inspect_err(|error| {
          warn!("heap source refused {size} bytes: {error}");
        })?
      }
      Err(error) => {
        warn!("heap source refused {request} bytes: {error}");
        return Err(error);
      }
    };

    let expected = region.address_of(region.high());
    let found = start.as_ptr() as usize;
    if found != expected {
      warn!("heap source returned {found:#x}, region ends at {expected:#x}");
      return Err(AllocError::Discontiguous { expected, found });
    }

    let head = Block::at(region.high());
    // Safety: the heap source just granted these bytes right after the region.
    unsafe { region.extend(request) };

    region.encode(head, size, true);
    if request > size {
      let surplus = head.advance(size);
      region.encode(surplus, request - size, false);
      region.insert_at_tail(surplus);
    }

    debug!(
      "heap grown by {request} bytes for a {size} byte block (chunk {chunk}, top {:#x})",
      region.high()
    );

    Ok(head)
  }
}
