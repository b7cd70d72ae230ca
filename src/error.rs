use std::{error, fmt};

/// Everything that can go wrong when talking to a [`crate::Heap`].
///
/// A call that returns an error has not modified the region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapError {
  /// Requested a region or an allocation of zero bytes, or a region too large
  /// for the 32 bit size field.
  InvalidArgument,
  /// `init` was already called on this heap.
  AlreadyInitialized,
  /// The region provider could not supply the backing memory.
  RegionUnavailable,
  /// No free block can hold the request.
  OutOfMemory,
  /// Null, misaligned, out of range, or not the start of a block's payload.
  InvalidPointer,
  /// The block owning this address is already free.
  DoubleFree,
  /// The heap was used before `init`.
  Uninitialized,
}

impl fmt::Display for HeapError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let message = match self {
      Self::InvalidArgument => "requested size is not positive or too large",
      Self::AlreadyInitialized => "heap has allocated space during a previous call",
      Self::RegionUnavailable => "region provider cannot allocate space",
      Self::OutOfMemory => "no free block large enough",
      Self::InvalidPointer => "pointer does not refer to an allocated block",
      Self::DoubleFree => "block is already free",
      Self::Uninitialized => "heap is not initialized",
    };

    f.write_str(message)
  }
}

impl error::Error for HeapError {}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, HeapError>;
