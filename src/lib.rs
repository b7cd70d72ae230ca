//! # tagheap - A Boundary Tag Heap Allocator
//!
//! This crate manages one contiguous, pre-reserved memory region with an
//! **explicit free list** heap: block metadata lives inside the region itself,
//! allocation uses **best fit** with block splitting and deallocation merges
//! free neighbours with **boundary tags**.
//!
//! ## Overview
//!
//! ```text
//!   Heap Region:
//!
//!   ┌───┬────────┬──────────────┬──────┬─────────────────────────────┬───┐
//!   │pad│ Busy 8 │   Free 24    │Busy16│          Free 4032          │ 1 │
//!   └───┴────────┴──────────────┴──────┴─────────────────────────────┴───┘
//!       ▲                                                              ▲
//!       │                                                              │
//!   First block                                                     Sentinel
//!   (offset 4, payloads land on 8 byte boundaries)              (end of heap)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagheap
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Header/footer word codec (Tag)
//!   ├── error      - HeapError
//!   ├── heap       - Heap: init, alloc, free
//!   ├── inspect    - Block listing, dump and invariant checks
//!   └── region     - RegionProvider, mmap and global allocator backends
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagheap::Heap;
//!
//! let mut heap = Heap::new();
//! heap.init(4096).unwrap();
//!
//! let ptr = heap.alloc(std::mem::size_of::<u64>()).unwrap().cast::<u64>();
//!
//! unsafe {
//!     ptr.write(42);
//!     assert_eq!(ptr.read(), 42);
//! }
//!
//! heap.free(ptr.as_ptr().cast()).unwrap();
//! ```
//!
//! ## How It Works
//!
//! Every block starts with a 4 byte header. Free blocks repeat their size in a
//! 4 byte footer so the block above them can find their header in O(1):
//!
//! ```text
//!   Allocated block:                     Free block:
//!   ┌──────────────────────────┐         ┌──────────────────────────┐
//!   │ header: size | P | A=1   │         │ header: size | P | A=0   │
//!   ├──────────────────────────┤         ├──────────────────────────┤
//!   │                          │ ◄─ ptr  │                          │
//!   │         payload          │         │        (unused)          │
//!   │                          │         ├──────────────────────────┤
//!   └──────────────────────────┘         │ footer: size | 0 | 0     │
//!                                        └──────────────────────────┘
//! ```
//!
//! - **alloc** scans every block, keeps the smallest free block that fits and
//!   stops early on an exact fit. Leftovers of 8 bytes or more become a new
//!   free block.
//! - **free** clears the allocated bit, then merges with the block below
//!   (found through its footer, signalled by `P = 0`) and the block above.
//!   Two free blocks are never left next to each other.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Heap` is neither `Send` nor `Sync`
//! - **Fixed size**: the region never grows or shrinks after `init`
//! - **One free list**: no size classes

pub mod align;
mod block;
mod error;
mod heap;
mod inspect;
mod region;

pub use block::{ALIGNMENT, FOOTER_SIZE, HEADER_SIZE, MIN_BLOCK_SIZE, Tag};
pub use error::{HeapError, Result};
pub use heap::Heap;
pub use inspect::{BlockInfo, Blocks, HeapReport, Violation};
#[cfg(unix)]
pub use region::MmapProvider;
pub use region::{DefaultProvider, GlobalProvider, RegionProvider};
