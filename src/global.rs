use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use log::error;
use spin::Mutex;

use crate::align::ALIGNMENT;
use crate::allocator::TagAllocator;
use crate::config::Config;
use crate::heap::HeapSource;

/// A [`TagAllocator`] behind a single spin lock, usable as the process's
/// `#[global_allocator]`.
///
/// The allocator is set up on first use. Layouts aligned beyond
/// [`ALIGNMENT`] are refused. A logger installed while this is the global
/// allocator must not allocate from the logging path.
///
/// ```rust,ignore
/// use tagalloc::{Config, LockedAllocator, SbrkHeap};
///
/// #[global_allocator]
/// static ALLOCATOR: LockedAllocator<SbrkHeap> =
///   LockedAllocator::new(SbrkHeap::new(), Config::DEFAULT);
/// ```
pub struct LockedAllocator<H: HeapSource> {
  inner: Mutex<Lazy<H>>,
}

struct Lazy<H: HeapSource> {
  source: Option<H>,
  config: Config,
  allocator: Option<TagAllocator<H>>,
}

impl<H: HeapSource> Lazy<H> {
  fn get(&mut self) -> Option<&mut TagAllocator<H>> {
    if self.allocator.is_none() {
      let heap = self.source.take()?;
      match TagAllocator::init(heap, self.config) {
        Ok(allocator) => self.allocator = Some(allocator),
        Err(err) => {
          error!("heap initialisation failed: {err}");
          return None;
        }
      }
    }
    self.allocator.as_mut()
  }
}

impl<H: HeapSource> LockedAllocator<H> {
  pub const fn new(
    heap: H,
    config: Config,
  ) -> Self {
    Self {
      inner: Mutex::new(Lazy {
        source: Some(heap),
        config,
        allocator: None,
      }),
    }
  }

  /// Runs `f` with the lock held. `None` if the heap could not be set up.
  pub fn with_allocator<R>(
    &self,
    f: impl FnOnce(&mut TagAllocator<H>) -> R,
  ) -> Option<R> {
    let mut inner = self.inner.lock();
    inner.get().map(f)
  }
}

unsafe impl<H: HeapSource> GlobalAlloc for LockedAllocator<H> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return ptr::null_mut();
    }

    self
      .with_allocator(|allocator| allocator.allocate(layout.size()))
      .flatten()
      .map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    self.with_allocator(|allocator| unsafe { allocator.free(NonNull::new(ptr)) });
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return ptr::null_mut();
    }

    self
      .with_allocator(|allocator| allocator.zero_allocate(1, layout.size()))
      .flatten()
      .map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return ptr::null_mut();
    }

    self
      .with_allocator(|allocator| unsafe { allocator.reallocate(NonNull::new(ptr), new_size) })
      .flatten()
      .map_or(ptr::null_mut(), NonNull::as_ptr)
  }
}
