use std::{io::Read, mem};

use tagheap::Heap;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn main() {
  env_logger::init();

  let mut heap = Heap::new();

  // --------------------------------------------------------------------
  // 0) One page, one big free block and the end marker.
  // --------------------------------------------------------------------
  if let Err(error) = heap.init(4096) {
    eprintln!("init failed: {error}");
    return;
  }
  println!("[0] Initialized heap, capacity = {} bytes", heap.capacity());
  heap.dump();
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Odd sized allocations round up to multiples of 8.
  // --------------------------------------------------------------------
  let sizes = [1, 5, 14, 8];
  let mut ptrs = Vec::new();
  for size in sizes {
    match heap.try_alloc(size) {
      Ok(ptr) => {
        println!(
          "\n[1] alloc({size}) = {:?}, block size = {:?}",
          ptr,
          heap.block_size(ptr.as_ptr())
        );
        ptrs.push(ptr);
      }
      Err(error) => println!("\n[1] alloc({size}) failed: {error}"),
    }
  }
  heap.dump();
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Write through the returned pointer.
  // --------------------------------------------------------------------
  if let Some(ptr) = heap.alloc(mem::size_of::<u32>()) {
    let value = ptr.cast::<u32>();
    unsafe { value.write(0xDEADBEEF) };
    println!("\n[2] Value written = 0x{:X}", unsafe { value.read() });
  }
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Free the 16 byte block, then the 8 byte block below it: they merge
  //    into a single free block of 24 bytes.
  // --------------------------------------------------------------------
  for index in [1, 0] {
    if let Some(ptr) = ptrs.get(index) {
      println!("\n[3] free({:?}) = {:?}", ptr, heap.free(ptr.as_ptr()));
    }
  }
  heap.dump();
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Freeing the same pointer twice is reported, not corrupting.
  // --------------------------------------------------------------------
  if let Some(ptr) = ptrs.first() {
    println!("\n[4] free({:?}) again = {:?}", ptr, heap.free(ptr.as_ptr()));
  }
  println!("[4] verify = {:?}", heap.verify());

  // --------------------------------------------------------------------
  // 5) Best fit: a 20 byte request lands in the 24 byte hole, not in the
  //    large block at the end.
  // --------------------------------------------------------------------
  if let Some(ptr) = heap.alloc(20) {
    println!("\n[5] alloc(20) = {:?}, reused first hole? {}", ptr, ptrs.first() == Some(&ptr));
  }
  heap.dump();

  println!("\n[6] End of example. The region goes back to the OS when the heap is dropped.");
}
