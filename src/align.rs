/// Alignment unit of every block and every payload handed out.
pub const ALIGNMENT: usize = 16;

/// Rounds `value` up to the next multiple of `align` (a power of two).
///
/// # Examples
///
/// ```rust
/// use tagalloc::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(32, 32), 32);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Rounds `value` up to the allocator's alignment unit.
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(17), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::ALIGNMENT)
  };
}

/// Overflow-aware version of [`align!`] for sizes coming from clients.
pub fn checked_align(value: usize) -> Option<usize> {
  value
    .checked_add(ALIGNMENT - 1)
    .map(|v| v & !(ALIGNMENT - 1))
}
