use std::ptr::NonNull;

use log::{debug, trace, warn};

use crate::{
  align,
  block::{ALIGNMENT, FOOTER_SIZE, HEADER_SIZE, MIN_BLOCK_SIZE, Tag},
  error::{HeapError, Result},
  region::{DefaultProvider, Region, RegionProvider},
};

/// Offset of the first block header. The word in front of it is padding so
/// that the first payload lands on a double word boundary.
pub(crate) const FIRST_BLOCK: usize = HEADER_SIZE;

/// Bytes of the region outside the block chain: the leading padding word and
/// the sentinel.
pub(crate) const RESERVED: usize = 8;

/// Offset of the sentinel word, the last word of the region.
#[inline]
pub(crate) fn sentinel_offset(region: &Region) -> usize {
  region.len() - HEADER_SIZE
}

impl Region {
  #[inline]
  pub(crate) fn tag(
    &self,
    offset: usize,
  ) -> Tag {
    Tag::from_word(self.read(offset))
  }

  #[inline]
  fn set_tag(
    &mut self,
    offset: usize,
    tag: Tag,
  ) {
    self.write(offset, tag.word());
  }

  /// Updates the previous-allocated bit of the block at `offset`. The sentinel
  /// keeps its fixed value.
  fn set_prev_allocated(
    &mut self,
    offset: usize,
    prev_allocated: bool,
  ) {
    let tag = self.tag(offset);
    if !tag.is_sentinel() {
      self.set_tag(offset, tag.with_prev_allocated(prev_allocated));
    }
  }
}

/// Explicit free list heap over a single region.
///
/// ```text
///   offset 0   4                                              len-4  len
///          ┌───┬──────────┬──────────┬───────────────────────┬─────┐
///          │pad│ block 1  │ block 2  │        ...            │  1  │
///          └───┴──────────┴──────────┴───────────────────────┴─────┘
///              ▲                                              ▲
///              first block header                             sentinel
/// ```
///
/// A fresh heap is uninitialized; [`Heap::init`] acquires the region once and
/// every later call to `init` fails with [`HeapError::AlreadyInitialized`].
/// The region goes back to the provider when the heap is dropped.
pub struct Heap<P: RegionProvider = DefaultProvider> {
  provider: P,
  region: Option<Region>,
}

impl Heap {
  pub fn new() -> Self {
    Self::with_provider(DefaultProvider::default())
  }
}

impl Default for Heap {
  fn default() -> Self {
    Self::new()
  }
}

impl<P: RegionProvider> Heap<P> {
  pub fn with_provider(provider: P) -> Self {
    Self {
      provider,
      region: None,
    }
  }

  pub fn is_initialized(&self) -> bool {
    self.region.is_some()
  }

  /// Bytes covered by the block chain, 0 before `init`.
  pub fn capacity(&self) -> usize {
    self.region.as_ref().map_or(0, |region| region.len() - RESERVED)
  }

  pub(crate) fn region(&self) -> Option<&Region> {
    self.region.as_ref()
  }

  #[cfg(test)]
  pub(crate) fn region_mut(&mut self) -> Option<&mut Region> {
    self.region.as_mut()
  }

  /// Acquires a region of at least `requested` bytes and lays it out as a
  /// single free block followed by the sentinel.
  pub fn init(
    &mut self,
    requested: usize,
  ) -> Result<()> {
    if self.region.is_some() {
      return Err(HeapError::AlreadyInitialized);
    }
    if requested == 0 {
      return Err(HeapError::InvalidArgument);
    }

    let page_size = self.provider.page_size();
    if !page_size.is_power_of_two() || page_size < ALIGNMENT {
      warn!("region provider reports unusable page size {page_size}");
      return Err(HeapError::InvalidArgument);
    }

    // The whole region must be addressable by the 32 bit size field and hold
    // at least one minimum block next to the reserved words.
    let length = requested
      .checked_next_multiple_of(page_size)
      .filter(|length| u32::try_from(*length).is_ok())
      .filter(|length| *length >= RESERVED + MIN_BLOCK_SIZE)
      .ok_or(HeapError::InvalidArgument)?;

    let base = self.provider.acquire(length).ok_or(HeapError::RegionUnavailable)?;
    let mut region = Region::new(base, length);

    let size = length - RESERVED;
    region.set_tag(FIRST_BLOCK, Tag::encode(size, false, true));
    region.set_tag(FIRST_BLOCK + size - FOOTER_SIZE, Tag::footer(size));
    region.set_tag(FIRST_BLOCK + size, Tag::SENTINEL);

    debug!(
      "heap initialized: requested = {requested}, region = {length} bytes at {:?}, free block = {size}",
      base
    );

    self.region = Some(region);

    Ok(())
  }

  /// Allocates `size` bytes of payload. Returns `None` on a zero request, when
  /// no free block is large enough or before `init`.
  pub fn alloc(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    self.try_alloc(size).ok()
  }

  /// Same as [`Heap::alloc`], reporting why the allocation failed.
  pub fn try_alloc(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let region = self.region.as_mut().ok_or(HeapError::Uninitialized)?;

    if size == 0 {
      return Err(HeapError::InvalidArgument);
    }

    let total = size
      .checked_add(HEADER_SIZE)
      .filter(|total| *total <= region.len())
      .map(|total| align!(total).max(MIN_BLOCK_SIZE))
      .ok_or(HeapError::OutOfMemory)?;

    let Some((offset, tag)) = best_fit(region, total) else {
      debug!("alloc({size}): no free block of {total} bytes");
      return Err(HeapError::OutOfMemory);
    };

    let (block_size, _, prev_allocated) = tag.decode();
    let slack = block_size - total;

    if slack >= MIN_BLOCK_SIZE {
      region.set_tag(offset, Tag::encode(total, true, prev_allocated));

      let rest = offset + total;
      region.set_tag(rest, Tag::encode(slack, false, true));
      region.set_tag(rest + slack - FOOTER_SIZE, Tag::footer(slack));
    } else {
      region.set_tag(offset, tag.with_allocated(true));
      region.set_prev_allocated(offset + block_size, true);
    }

    let payload = region.pointer(offset + HEADER_SIZE);

    debug!(
      "alloc({size}) = {:?}: block at offset {offset}, {total} of {block_size} bytes",
      payload
    );

    Ok(payload)
  }

  /// Frees the block whose payload starts at `ptr` and merges it with free
  /// neighbours.
  pub fn free(
    &mut self,
    ptr: *mut u8,
  ) -> Result<()> {
    let region = self.region.as_mut().ok_or(HeapError::Uninitialized)?;

    let header = locate(region, ptr).inspect_err(|error| warn!("free({:?}) rejected: {error}", ptr))?;

    let tag = region.tag(header);
    let next = header + tag.size();

    let mut start = header;
    let mut size = tag.size();
    let mut prev_allocated = tag.is_prev_allocated();

    if !prev_allocated {
      let prev_size = region.tag(header - FOOTER_SIZE).size();
      start -= prev_size;
      size += prev_size;
      prev_allocated = region.tag(start).is_prev_allocated();
      region.set_tag(header, Tag::default());

      debug!("free({:?}): merged with previous block at offset {start}", ptr);
    }

    let next_tag = region.tag(next);
    if !next_tag.is_allocated() {
      size += next_tag.size();
      region.set_tag(next, Tag::default());

      debug!("free({:?}): merged with next block at offset {next}", ptr);
    }

    region.set_tag(start, Tag::encode(size, false, prev_allocated));
    region.set_tag(start + size - FOOTER_SIZE, Tag::footer(size));
    region.set_prev_allocated(start + size, false);

    debug!("free({:?}): free block at offset {start}, {size} bytes", ptr);

    Ok(())
  }

  /// Total size of the allocated block whose payload starts at `ptr`.
  pub fn block_size(
    &self,
    ptr: *const u8,
  ) -> Result<usize> {
    let region = self.region.as_ref().ok_or(HeapError::Uninitialized)?;

    Ok(region.tag(locate(region, ptr)?).size())
  }
}

impl<P: RegionProvider> Drop for Heap<P> {
  fn drop(&mut self) {
    if let Some(region) = self.region.take() {
      unsafe { self.provider.release(region.base(), region.len()) };
    }
  }
}

/// Smallest free block of at least `total` bytes, the first one on ties. An
/// exact fit ends the scan.
fn best_fit(
  region: &Region,
  total: usize,
) -> Option<(usize, Tag)> {
  let mut best: Option<(usize, Tag)> = None;
  let mut offset = FIRST_BLOCK;

  loop {
    let tag = region.tag(offset);
    if tag.is_sentinel() {
      return best;
    }

    let size = tag.size();
    if !tag.is_allocated() && size >= total {
      trace!("best_fit({total}): candidate at offset {offset}, {size} bytes");

      if size == total {
        return Some((offset, tag));
      }
      if best.is_none_or(|(_, current)| size < current.size()) {
        best = Some((offset, tag));
      }
    }

    offset += size;
  }
}

/// Header offset of the allocated block whose payload starts at `ptr`.
fn locate(
  region: &Region,
  ptr: *const u8,
) -> Result<usize> {
  let address = ptr as usize;
  if ptr.is_null() || address % ALIGNMENT != 0 {
    return Err(HeapError::InvalidPointer);
  }

  let payload = region.offset_of(address).ok_or(HeapError::InvalidPointer)?;
  if payload < FIRST_BLOCK + HEADER_SIZE || payload >= sentinel_offset(region) {
    return Err(HeapError::InvalidPointer);
  }

  let header = payload - HEADER_SIZE;
  let mut offset = FIRST_BLOCK;

  // Blocks tile the chain up to the sentinel, so some block contains `header`.
  loop {
    let tag = region.tag(offset);
    let end = offset + tag.size();

    if header < end {
      if !tag.is_allocated() {
        return Err(HeapError::DoubleFree);
      }
      if offset != header {
        return Err(HeapError::InvalidPointer);
      }
      return Ok(offset);
    }

    offset = end;
  }
}
