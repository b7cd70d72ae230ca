use std::{alloc, mem, ptr::NonNull};

use log::warn;

/// Page size assumed when the platform refuses to tell us.
const FALLBACK_PAGE_SIZE: usize = 4096;

/// Source of the raw memory a [`crate::Heap`] manages.
///
/// The heap asks for exactly one buffer during `init` and gives it back when
/// it is dropped.
///
/// # Safety
///
/// The heap reads and writes the buffer returned by [`Self::acquire`] without
/// further checks, so implementors must guarantee that every `Some(base)` it
/// returns:
///
/// - is valid for reads and writes of `length` bytes and stays valid until it
///   is passed to [`Self::release`],
/// - is aligned to [`Self::page_size`],
/// - is zero filled,
/// - is not accessed by anything else while the heap owns it.
///
/// A provider that does not make these promises cannot be written without
/// `unsafe`:
///
/// ```compile_fail
/// use std::ptr::NonNull;
/// use tagheap::RegionProvider;
///
/// struct Dangling;
///
/// impl RegionProvider for Dangling {
///   fn page_size(&self) -> usize {
///     4096
///   }
///
///   fn acquire(&mut self, _length: usize) -> Option<NonNull<u8>> {
///     Some(NonNull::dangling())
///   }
///
///   unsafe fn release(&mut self, _base: NonNull<u8>, _length: usize) {}
/// }
/// ```
pub unsafe trait RegionProvider {
  /// Granularity the requested length is rounded up to. Must be a power of
  /// two of at least [`crate::ALIGNMENT`] bytes, otherwise `init` fails with
  /// [`crate::HeapError::InvalidArgument`].
  fn page_size(&self) -> usize;

  /// Returns a zeroed buffer of `length` bytes or `None` if none is available.
  /// `length` is always a non-zero multiple of [`Self::page_size`].
  fn acquire(
    &mut self,
    length: usize,
  ) -> Option<NonNull<u8>>;

  /// Returns a buffer obtained from [`Self::acquire`].
  ///
  /// # Safety
  ///
  /// `base` and `length` must come from a previous call to `acquire` on this
  /// provider and the buffer must not be used afterwards.
  unsafe fn release(
    &mut self,
    base: NonNull<u8>,
    length: usize,
  );
}

/// Anonymous private mappings through `mmap(2)`.
#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
pub struct MmapProvider {
  page_size: usize,
}

#[cfg(unix)]
impl MmapProvider {
  pub fn new() -> Self {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };

    Self {
      page_size: if page_size > 0 { page_size as usize } else { FALLBACK_PAGE_SIZE },
    }
  }
}

#[cfg(unix)]
impl Default for MmapProvider {
  fn default() -> Self {
    Self::new()
  }
}

// SAFETY: anonymous private mappings are page aligned, zero filled and owned
// by this process until `munmap`.
#[cfg(unix)]
unsafe impl RegionProvider for MmapProvider {
  fn page_size(&self) -> usize {
    self.page_size
  }

  fn acquire(
    &mut self,
    length: usize,
  ) -> Option<NonNull<u8>> {
    // Read-write, private to this process, not backed by any file. The kernel
    // hands out zeroed pages.
    let protection = libc::PROT_READ | libc::PROT_WRITE;
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

    match unsafe { libc::mmap(std::ptr::null_mut(), length, protection, flags, -1, 0) } {
      libc::MAP_FAILED => {
        warn!("mmap cannot allocate {length} bytes");
        None
      }
      address => NonNull::new(address.cast()),
    }
  }

  unsafe fn release(
    &mut self,
    base: NonNull<u8>,
    length: usize,
  ) {
    if unsafe { libc::munmap(base.as_ptr().cast(), length) } != 0 {
      warn!("munmap failed for region at {:?} ({length} bytes)", base);
    }
  }
}

/// Page aligned buffers from the global allocator. Works on every target and
/// under Miri, where `mmap` is not available.
#[derive(Debug, Clone, Copy)]
pub struct GlobalProvider {
  page_size: usize,
}

impl GlobalProvider {
  pub fn new() -> Self {
    Self::with_page_size(FALLBACK_PAGE_SIZE)
  }

  /// # Panics
  ///
  /// If `page_size` is not a power of two or is smaller than a double word.
  pub fn with_page_size(page_size: usize) -> Self {
    assert!(
      page_size.is_power_of_two() && page_size >= crate::ALIGNMENT,
      "page size {page_size} must be a power of two of at least {} bytes",
      crate::ALIGNMENT
    );

    Self { page_size }
  }

  fn layout(
    &self,
    length: usize,
  ) -> Option<alloc::Layout> {
    alloc::Layout::from_size_align(length, self.page_size).ok()
  }
}

impl Default for GlobalProvider {
  fn default() -> Self {
    Self::new()
  }
}

// SAFETY: `alloc_zeroed` with a `length` sized, page aligned layout.
unsafe impl RegionProvider for GlobalProvider {
  fn page_size(&self) -> usize {
    self.page_size
  }

  fn acquire(
    &mut self,
    length: usize,
  ) -> Option<NonNull<u8>> {
    let layout = self.layout(length)?;

    NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
  }

  unsafe fn release(
    &mut self,
    base: NonNull<u8>,
    length: usize,
  ) {
    if let Some(layout) = self.layout(length) {
      unsafe { alloc::dealloc(base.as_ptr(), layout) };
    }
  }
}

/// Provider used by [`crate::Heap::new`].
#[cfg(all(unix, not(miri)))]
pub type DefaultProvider = MmapProvider;

/// Provider used by [`crate::Heap::new`].
#[cfg(any(not(unix), miri))]
pub type DefaultProvider = GlobalProvider;

/// The buffer a heap manages, addressed by byte offsets from `base`.
///
/// Metadata words are only ever read and written through [`Region::read`] and
/// [`Region::write`], which check that the word lies inside the buffer.
#[derive(Debug)]
pub(crate) struct Region {
  base: NonNull<u8>,
  length: usize,
}

impl Region {
  pub fn new(
    base: NonNull<u8>,
    length: usize,
  ) -> Self {
    Self { base, length }
  }

  #[inline]
  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.length
  }

  /// Absolute address of `offset`.
  #[inline]
  pub fn address(
    &self,
    offset: usize,
  ) -> usize {
    self.base.as_ptr() as usize + offset
  }

  /// Pointer to `offset`, carrying the provenance of the whole buffer.
  pub fn pointer(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    assert!(offset < self.length, "offset {offset} outside region of {} bytes", self.length);

    unsafe { self.base.add(offset) }
  }

  /// Offset of `address` inside the region, if it lies inside at all.
  pub fn offset_of(
    &self,
    address: usize,
  ) -> Option<usize> {
    address
      .checked_sub(self.base.as_ptr() as usize)
      .filter(|offset| *offset < self.length)
  }

  pub fn read(
    &self,
    offset: usize,
  ) -> u32 {
    self.check_word(offset);

    unsafe { self.base.as_ptr().add(offset).cast::<u32>().read() }
  }

  pub fn write(
    &mut self,
    offset: usize,
    word: u32,
  ) {
    self.check_word(offset);

    unsafe { self.base.as_ptr().add(offset).cast::<u32>().write(word) }
  }

  #[inline]
  fn check_word(
    &self,
    offset: usize,
  ) {
    assert!(
      offset % mem::align_of::<u32>() == 0 && offset + mem::size_of::<u32>() <= self.length,
      "metadata word at offset {offset} outside region of {} bytes",
      self.length
    );
  }
}
