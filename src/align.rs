/// Rounds `value` up to the double word boundary ([`crate::ALIGNMENT`]).
///
/// Every block size and every payload address handed out by the heap is a
/// multiple of this value.
///
/// # Examples
///
/// ```rust
/// use tagheap::align;
///
/// assert_eq!(align!(5), 8);
/// assert_eq!(align!(8), 8);
/// assert_eq!(align!(18), 24);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::ALIGNMENT)
  };
}

/// Rounds `value` up to a multiple of `align`, which must be a power of two.
///
/// ```rust
/// use tagheap::align_to;
///
/// assert_eq!(align_to!(1, 4096), 4096);
/// assert_eq!(align_to!(4097, 4096), 8192);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}
