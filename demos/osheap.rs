use std::{io::Read, ptr};

use libc::sbrk;
use osheap::{HeapAllocator, MMAP_THRESHOLD, print_alloc};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  // One allocator for the whole process. It tracks a chain of blocks that
  // live either in the program-break segment or in anonymous mappings.
  let mut heap = HeapAllocator::new();

  unsafe {
    // Initial heap state
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) First small allocation. Watch the break: it jumps by a full
    //    128 KiB even though we asked for 100 bytes. The first extension
    //    preallocates a slab so later small requests cost no syscall.
    // --------------------------------------------------------------------
    let first_block = heap.allocate(100);
    println!("\n[1] Allocate 100 bytes (cold start)");
    print_alloc(100, first_block);

    // Write something into the allocated memory to show it's usable.
    let first_ptr = first_block as *mut u32;
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", first_ptr.read());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) A second allocation lands right behind the slab.
    // --------------------------------------------------------------------
    let second_block = heap.allocate(12);
    println!("\n[2] Allocate 12 bytes");
    print_alloc(12, second_block);

    ptr::write_bytes(second_block, 0xAB, 12);
    println!("[2] Initialized second block with 0xAB");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Free the first block and allocate again: the freed slab is
    //    carved up and reused, so the break does not move.
    // --------------------------------------------------------------------
    heap.deallocate(first_block);
    println!("\n[3] Deallocated first_block at {:?}", first_block);

    let third_block = heap.allocate(64);
    println!("[3] Allocate 64 bytes (check reuse of the freed block)");
    print_alloc(64, third_block);

    println!(
      "[3] third_block == first_block? {}",
      if third_block == first_block {
        "Yes, it reused the freed block"
      } else {
        "No, it allocated somewhere else"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Grow the block in place with reallocate. The free neighbor left
    //    over from the slab is absorbed, so the pointer stays the same.
    // --------------------------------------------------------------------
    let grown_block = heap.reallocate(third_block, 50_000);
    println!("\n[4] Reallocate 64 -> 50000 bytes");
    print_alloc(50_000, grown_block);

    println!(
      "[4] grown_block == third_block? {}",
      if grown_block == third_block {
        "Yes, it grew in place"
      } else {
        "No, the payload moved"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) A large allocation bypasses the break segment entirely and gets
    //    its own anonymous mapping. sbrk(0) stays put.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");

    let big_block = heap.allocate(2 * MMAP_THRESHOLD);
    println!("\n[5] Allocate 256 KiB (dedicated mapping)");
    print_alloc(2 * MMAP_THRESHOLD, big_block);

    print_program_break("after large alloc");

    // Unlike break memory, a mapping is returned to the OS on free.
    heap.deallocate(big_block);
    println!("[5] Deallocated the mapping at {:?}", big_block);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Zero-allocate: the payload arrives cleared even when it recycles
    //    a dirty block from the break segment.
    // --------------------------------------------------------------------
    let zeroed_block = heap.allocate_zeroed(16, 4);
    println!("\n[6] Zero-allocate 16 x 4 bytes");
    print_alloc(64, zeroed_block);

    let all_zero = (0..64).all(|i| zeroed_block.add(i).read() == 0);
    println!("[6] All 64 bytes zero? {}", all_zero);

    // --------------------------------------------------------------------
    // 7) End of demo.
    //
    //    The break segment is never handed back while the process runs;
    //    the OS reclaims everything when it exits.
    // --------------------------------------------------------------------
    println!("\n[7] End of example. Process will exit and the OS will reclaim all memory.");
  }
}
