//! Read-only views of the block chain: per-block listings, totals, the
//! printable block table and an invariant checker.

use std::{error, fmt};

use crate::{
  block::{ALIGNMENT, FOOTER_SIZE, MIN_BLOCK_SIZE, Tag},
  heap::{FIRST_BLOCK, Heap, sentinel_offset},
  region::{Region, RegionProvider},
};

/// One block of the chain as seen by [`Heap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Position in address order, starting at 1.
  pub index: usize,
  pub allocated: bool,
  pub prev_allocated: bool,
  /// Offset of the header from the start of the region.
  pub offset: usize,
  /// Address of the first byte of the block (its header).
  pub start: usize,
  /// Address of the last byte of the block.
  pub end: usize,
  /// Total size including header and footer.
  pub size: usize,
}

/// Iterator over the blocks of a heap in address order.
pub struct Blocks<'a> {
  region: Option<&'a Region>,
  offset: usize,
  index: usize,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let region = self.region?;
    let offset = self.offset;
    let tag = region.tag(offset);

    if tag.is_sentinel() {
      self.region = None;
      return None;
    }

    let (size, allocated, prev_allocated) = tag.decode();
    let start = region.address(offset);

    self.index += 1;
    self.offset += size;

    Some(BlockInfo {
      index: self.index,
      allocated,
      prev_allocated,
      offset,
      start,
      end: start + size - 1,
      size,
    })
  }
}

/// Snapshot of the whole heap.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeapReport {
  pub blocks: Vec<BlockInfo>,
  /// Sum of allocated block sizes.
  pub busy: usize,
  /// Sum of free block sizes.
  pub free: usize,
  /// `busy + free`.
  pub total: usize,
}

fn status(allocated: bool) -> &'static str {
  if allocated { "Busy" } else { "Free" }
}

impl fmt::Display for HeapReport {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let rule = "-".repeat(80);
    let stars = "*".repeat(80);

    writeln!(f, "{:*^80}", " Block list ")?;
    writeln!(f, "No.\tStatus\tPrev\tt_Begin\t\tt_End\t\tt_Size")?;
    writeln!(f, "{rule}")?;

    for block in &self.blocks {
      writeln!(
        f,
        "{}\t{}\t{}\t{:#010x}\t{:#010x}\t{}",
        block.index,
        status(block.allocated),
        status(block.prev_allocated),
        block.start,
        block.end,
        block.size
      )?;
    }

    writeln!(f, "{rule}")?;
    writeln!(f, "{stars}")?;
    writeln!(f, "Total busy size = {}", self.busy)?;
    writeln!(f, "Total free size = {}", self.free)?;
    writeln!(f, "Total size = {}", self.total)?;
    write!(f, "{stars}")
  }
}

/// A broken region invariant, reported by [`Heap::verify`]. Offsets are
/// relative to the start of the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
  /// Size below the minimum block size or not a multiple of 8.
  BadSize { offset: usize, size: usize },
  /// The block runs past the sentinel.
  Overrun { offset: usize, size: usize },
  /// A free block whose footer does not repeat its size.
  FooterMismatch { offset: usize, header: usize, footer: u32 },
  /// The previous-allocated bit disagrees with the block below.
  PrevAllocatedMismatch { offset: usize, expected: bool },
  /// Two free blocks next to each other.
  AdjacentFree { offset: usize },
  /// The last word of the region is not the end marker.
  BadSentinel { word: u32 },
}

impl fmt::Display for Violation {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::BadSize { offset, size } => write!(f, "block at {offset} has invalid size {size}"),
      Self::Overrun { offset, size } => {
        write!(f, "block at {offset} of {size} bytes runs past the end marker")
      }
      Self::FooterMismatch { offset, header, footer } => {
        write!(f, "free block at {offset} has size {header} but footer {footer}")
      }
      Self::PrevAllocatedMismatch { offset, expected } => {
        write!(f, "block at {offset} should have previous-allocated = {expected}")
      }
      Self::AdjacentFree { offset } => write!(f, "free block at {offset} follows a free block"),
      Self::BadSentinel { word } => write!(f, "end marker is {word}, expected 1"),
    }
  }
}

impl error::Error for Violation {}

impl<P: RegionProvider> Heap<P> {
  /// Blocks in address order. Empty before `init`.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      region: self.region(),
      offset: FIRST_BLOCK,
      index: 0,
    }
  }

  pub fn report(&self) -> HeapReport {
    let mut report = HeapReport::default();

    for block in self.blocks() {
      if block.allocated {
        report.busy += block.size;
      } else {
        report.free += block.size;
      }
      report.blocks.push(block);
    }

    report.total = report.busy + report.free;
    report
  }

  /// Prints the block table to stdout.
  pub fn dump(&self) {
    println!("{}", self.report());
  }

  /// Walks the chain checking every region invariant. Unlike [`Heap::blocks`]
  /// this never trusts a size before checking it, so it is safe to run on a
  /// corrupted region.
  pub fn verify(&self) -> Result<(), Violation> {
    let Some(region) = self.region() else {
      return Ok(());
    };

    let sentinel = sentinel_offset(region);
    let mut offset = FIRST_BLOCK;
    let mut prev_allocated = true;

    while offset < sentinel {
      let tag = region.tag(offset);
      let (size, allocated, prev_bit) = tag.decode();

      if size < MIN_BLOCK_SIZE || size % ALIGNMENT != 0 {
        return Err(Violation::BadSize { offset, size });
      }
      if offset + size > sentinel {
        return Err(Violation::Overrun { offset, size });
      }
      if prev_bit != prev_allocated {
        return Err(Violation::PrevAllocatedMismatch {
          offset,
          expected: prev_allocated,
        });
      }

      if !allocated {
        if !prev_allocated {
          return Err(Violation::AdjacentFree { offset });
        }

        let footer = region.tag(offset + size - FOOTER_SIZE);
        if footer != Tag::footer(size) {
          return Err(Violation::FooterMismatch {
            offset,
            header: size,
            footer: footer.word(),
          });
        }
      }

      prev_allocated = allocated;
      offset += size;
    }

    let word = region.read(sentinel);
    if Tag::from_word(word) != Tag::SENTINEL {
      return Err(Violation::BadSentinel { word });
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;
  use crate::region::GlobalProvider;

  fn heap() -> Heap<GlobalProvider> {
    let mut heap = Heap::with_provider(GlobalProvider::new());
    heap.init(4096).unwrap();
    heap
  }

  #[test]
  fn test_uninitialized_heap_is_empty() {
    let heap = Heap::with_provider(GlobalProvider::new());

    assert_eq!(heap.blocks().count(), 0);
    assert_eq!(heap.report(), HeapReport::default());
    assert_eq!(heap.verify(), Ok(()));
  }

  #[test]
  fn test_blocks_in_address_order() {
    let mut heap = heap();
    let a = heap.alloc(1).unwrap();
    let b = heap.alloc(5).unwrap();
    heap.free(a.as_ptr()).unwrap();

    let blocks: Vec<_> = heap.blocks().collect();
    assert_eq!(blocks.len(), 3);

    assert_eq!(blocks[0].index, 1);
    assert!(!blocks[0].allocated);
    assert!(blocks[0].prev_allocated);
    assert_eq!(blocks[0].offset, FIRST_BLOCK);
    assert_eq!(blocks[0].size, 8);
    assert_eq!(blocks[0].end, blocks[0].start + 7);

    assert_eq!(blocks[1].start, b.as_ptr() as usize - 4);
    assert!(blocks[1].allocated);
    assert!(!blocks[1].prev_allocated);
    assert_eq!(blocks[1].size, 16);

    assert_eq!(blocks[2].start, blocks[1].end + 1);
    assert_eq!(blocks[2].size, 4088 - 24);

    let report = heap.report();
    assert_eq!(report.busy, 16);
    assert_eq!(report.free, 4072);
    assert_eq!(report.total, 4088);
  }

  #[test]
  fn test_report_table() {
    let mut heap = heap();
    heap.alloc(4).unwrap();

    let table = heap.report().to_string();
    let rows: Vec<_> = table.lines().filter(|line| line.starts_with(char::is_numeric)).collect();

    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with("1\tBusy\tBusy\t0x"));
    assert!(rows[0].ends_with("\t8"));
    assert!(rows[1].starts_with("2\tFree\tBusy\t0x"));
    assert!(rows[1].ends_with("\t4080"));
    assert!(table.contains("Total busy size = 8"));
    assert!(table.contains("Total free size = 4080"));
    assert!(table.contains("Total size = 4088"));
  }

  #[test]
  fn test_verify_detects_corruption() {
    let mut heap = heap();
    let a = heap.alloc(12).unwrap();
    heap.alloc(12).unwrap();
    heap.free(a.as_ptr()).unwrap();
    assert_eq!(heap.verify(), Ok(()));

    let region = heap.region_mut().unwrap();

    // Footer of the free 16 byte block at offset 4.
    region.write(FIRST_BLOCK + 16 - FOOTER_SIZE, 24);
    assert_eq!(
      heap.verify(),
      Err(Violation::FooterMismatch {
        offset: FIRST_BLOCK,
        header: 16,
        footer: 24
      })
    );

    let region = heap.region_mut().unwrap();
    region.write(FIRST_BLOCK + 16 - FOOTER_SIZE, 16);

    // Claim the allocated block at offset 20 follows an allocated block.
    let word = region.read(20);
    region.write(20, word | 0b10);
    assert_eq!(
      heap.verify(),
      Err(Violation::PrevAllocatedMismatch {
        offset: 20,
        expected: false
      })
    );

    let region = heap.region_mut().unwrap();
    region.write(20, 5);
    assert_eq!(heap.verify(), Err(Violation::BadSize { offset: 20, size: 4 }));

    let region = heap.region_mut().unwrap();
    region.write(20, 0x2001);
    assert_eq!(heap.verify(), Err(Violation::Overrun { offset: 20, size: 0x2000 }));
  }

  #[test]
  fn test_verify_detects_bad_sentinel() {
    let mut heap = heap();
    let region = heap.region_mut().unwrap();
    let sentinel = sentinel_offset(region);

    region.write(sentinel, 3);
    assert_eq!(heap.verify(), Err(Violation::BadSentinel { word: 3 }));
  }
}
