use std::fmt;

/// Size of a block header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Size of the footer a free block carries in its last word.
pub const FOOTER_SIZE: usize = 4;

/// Double word alignment of block sizes and payload addresses.
pub const ALIGNMENT: usize = 8;

/// Smallest block the heap ever creates: a header and a footer, no payload.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE + FOOTER_SIZE;

/// Bit 0: this block is allocated.
const ALLOCATED: u32 = 0b01;

/// Bit 1: the block right below this one is allocated. Headers only.
const PREV_ALLOCATED: u32 = 0b10;

const FLAGS: u32 = ALLOCATED | PREV_ALLOCATED;

/// The `size_status` word stored in every header and in the footer of every
/// free block.
///
/// ```text
///   31                                   2   1   0
///   ┌─────────────────────────────────────┬───┬───┐
///   │        block size (multiple of 8)   │ P │ A │
///   └─────────────────────────────────────┴───┴───┘
///                                           │   └── this block is allocated
///                                           └────── previous block is allocated
/// ```
///
/// Footers always have both flag bits cleared.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Tag(u32);

impl Tag {
  /// End-of-heap marker: size 0, allocated.
  pub const SENTINEL: Tag = Tag(ALLOCATED);

  pub fn encode(
    size: usize,
    allocated: bool,
    prev_allocated: bool,
  ) -> Self {
    debug_assert_eq!(size % ALIGNMENT, 0, "block size {size} is not double word aligned");
    debug_assert!(size <= u32::MAX as usize);

    let mut word = size as u32;
    if allocated {
      word |= ALLOCATED;
    }
    if prev_allocated {
      word |= PREV_ALLOCATED;
    }

    Self(word)
  }

  /// Footer word for a free block of `size` bytes.
  #[inline]
  pub fn footer(size: usize) -> Self {
    Self::encode(size, false, false)
  }

  /// Returns `(size, allocated, prev_allocated)`.
  #[inline]
  pub fn decode(self) -> (usize, bool, bool) {
    (self.size(), self.is_allocated(), self.is_prev_allocated())
  }

  #[inline]
  pub fn size(self) -> usize {
    (self.0 & !FLAGS) as usize
  }

  #[inline]
  pub fn is_allocated(self) -> bool {
    self.0 & ALLOCATED != 0
  }

  #[inline]
  pub fn is_prev_allocated(self) -> bool {
    self.0 & PREV_ALLOCATED != 0
  }

  #[inline]
  pub fn is_sentinel(self) -> bool {
    self.size() == 0 && self.is_allocated()
  }

  pub fn with_allocated(
    self,
    allocated: bool,
  ) -> Self {
    Self::encode(self.size(), allocated, self.is_prev_allocated())
  }

  /// Sets or clears the previous-allocated bit.
  pub fn with_prev_allocated(
    self,
    prev_allocated: bool,
  ) -> Self {
    if prev_allocated {
      Self(self.0 | PREV_ALLOCATED)
    } else {
      Self(self.0 & !PREV_ALLOCATED)
    }
  }

  #[inline]
  pub fn from_word(word: u32) -> Self {
    Self(word)
  }

  #[inline]
  pub fn word(self) -> u32 {
    self.0
  }
}

impl fmt::Debug for Tag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Tag")
      .field("size", &self.size())
      .field("allocated", &self.is_allocated())
      .field("prev_allocated", &self.is_prev_allocated())
      .finish()
  }
}
