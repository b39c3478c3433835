//! # Heap Allocator
//!
//! A general-purpose heap allocator offering the classical four-function
//! interface (`allocate`, `deallocate`, `allocate_zeroed`, `reallocate`) on
//! top of two OS memory sources: the program-break segment for small blocks
//! and private anonymous mappings for large ones.
//!
//! ## Overview
//!
//! Every request is rounded to 8 bytes and prefixed with an in-band header.
//! Which memory source serves it depends on the aligned total size:
//!
//! ```text
//!                 aligned total < MMAP_THRESHOLD          otherwise
//!               ┌──────────────────────────────┐   ┌─────────────────────┐
//!               │     program-break segment    │   │  anonymous mapping  │
//!               │  (grows monotonically, FREE  │   │  (one per block,    │
//!               │   blocks recycled in place)  │   │   unmapped on free) │
//!               └──────────────────────────────┘   └─────────────────────┘
//! ```
//!
//! ### Block Structure
//!
//! ```text
//!  ┌──────────────────────┬──────────────────────────┐
//!  │     Block Header     │        User Data         │
//!  ├──────────────────────┼──────────────────────────┤
//!  │ size: usize          │                          │
//!  │ status: Free │ Alloc │   [ size - header_size   │
//!  │         │ Mapped     │         bytes ]          │
//!  │ next: *mut Block     │                          │
//!  └──────────────────────┴──────────────────────────┘
//!     │                      ▲
//!     │                      └── Pointer returned to the caller
//!     └── size counts the header too
//! ```
//!
//! ### The Block Chain
//!
//! All blocks form one singly linked chain, walked from `prefix`. Blocks in
//! the break segment tile it without gaps, so a block's address plus its
//! size is its physical neighbor; MAPPED blocks are islands that merely hang
//! in the chain:
//!
//! ```text
//!   HeapAllocator
//!   ┌────────────┐
//!   │ heap_start─┼──┐
//!   │ prefix ────┼──┤
//!   └────────────┘  ▼
//!    ┌─────────┬─────────┬─────────┐          ┌──────────┐
//!    │ ALLOC   │ FREE    │ ALLOC   │ ───────► │ MAPPED   │──► null
//!    │ 128 B   │ 256 B   │ 64 B    │  next    │ 200 KiB  │
//!    └─────────┴─────────┴─────────┘          └──────────┘
//!    ◄──── break segment (contiguous) ────►    (separate mapping)
//! ```
//!
//! ### Allocation Policy
//!
//! ```text
//!   allocate(n):
//!     chain empty        → first block: 128 KiB break prelude (small
//!                          requests) or a dedicated mapping (large ones)
//!     best-fit FREE hit  → reuse it, splitting off the excess when the
//!                          residue can host a header and a payload byte
//!     terminal FREE tail → extend the break just enough and relabel it
//!     otherwise          → append a fresh block at the end
//! ```
//!
//! A full coalescing sweep runs before every search and after every free,
//! so no two adjacent FREE blocks survive an API call.
//!
//! `reallocate` tries, in order: shrink in place (carving the tail back
//! into a FREE block), grow the terminal block by pushing the break, grow
//! in place by absorbing FREE neighbors, and finally copy-migrate, which
//! also covers every move between the break segment and mappings.
//!
//! ## Thread Safety
//!
//! This allocator is **NOT** thread-safe and keeps no locks of its own. All
//! instances share the process-wide program break, so a process should hold
//! exactly one `HeapAllocator` and multi-threaded callers must serialize
//! access externally (e.g., a `Mutex`).
//!
//! ## Safety
//!
//! This allocator uses **unsafe Rust** extensively because:
//! 1. Direct manipulation of raw pointers and in-band headers
//! 2. System calls to `sbrk`, `mmap` and `munmap`
//! 3. Manual memory management without borrow-checker guarantees
//!
//! Callers must ensure:
//! - Pointers returned from `allocate` are valid until `deallocate` is
//!   called or `reallocate` hands back a different pointer
//! - The same pointer is not deallocated twice
//! - Pointers are not used after deallocation

use std::{cmp, ptr};

use crate::{
  align,
  block::{Block, BlockStatus, HEADER_SIZE},
  os,
};

/// Size boundary between the two memory sources. Requests whose aligned
/// total size (payload plus header) is strictly below go to the break
/// segment; everything else gets its own anonymous mapping.
pub const MMAP_THRESHOLD: usize = 128 * 1024;

/// Smallest leftover that justifies carving a FREE tail off an oversized
/// block: room for a header plus at least one payload byte.
const MIN_SPLIT_RESIDUE: usize = align!(1 + HEADER_SIZE);

/// Debug helper function that prints allocation information.
///
/// Outputs the requested size, the address handed to the caller, and the
/// current program break position for debugging purposes.
///
/// # Safety
///
/// This function calls `sbrk(0)` which is always safe, but the function
/// is marked unsafe to match the allocator's API conventions.
pub unsafe fn print_alloc(
  size: usize,
  address: *mut u8,
) {
  println!(
    "Allocated {} bytes, address = {:?}, program break = {:?}",
    size,
    address,
    unsafe { libc::sbrk(0) }
  );
}

/// Address of the payload owned by the caller, just past the header.
unsafe fn user_ptr(block: *mut Block) -> *mut u8 {
  unsafe { (block as *mut u8).add(HEADER_SIZE) }
}

/// Recovers the header of the block that owns a caller-visible pointer.
unsafe fn header_of(address: *mut u8) -> *mut Block {
  (unsafe { address.sub(HEADER_SIZE) }) as *mut Block
}

/// Carves a FREE tail of `block.size - want` bytes at `block + want` and
/// links it right after `block`, which shrinks to exactly `want` bytes.
///
/// The caller must have checked `block.size >= want + MIN_SPLIT_RESIDUE`,
/// so the tail can host its own header and at least one payload byte.
unsafe fn split(
  block: *mut Block,
  want: usize,
) {
  unsafe {
    let tail = (block as *mut u8).add(want) as *mut Block;
    (*tail).size = (*block).size - want;
    (*tail).status = BlockStatus::Free;
    (*tail).next = (*block).next;
    (*block).next = tail;
    (*block).size = want;
  }
}

/// Absorbs chain-successive FREE neighbors into `start` until its size
/// reaches `cap`, the neighbor is not FREE, or the chain ends. A cap of
/// `usize::MAX` merges the whole FREE run. MAPPED blocks never take part:
/// they stop the merge like any other non-FREE block.
unsafe fn coalesce_next(
  start: *mut Block,
  cap: usize,
) {
  unsafe {
    while (*start).size < cap {
      let next = (*start).next;
      if next.is_null() || (*next).status != BlockStatus::Free {
        break;
      }
      (*start).size += (*next).size;
      (*start).next = (*next).next;
    }
  }
}

/// A heap allocator that manages blocks obtained from the program break
/// and from anonymous mappings.
///
/// # Fields
///
/// * `heap_start` - First block ever created (chain anchor)
/// * `prefix` - Current head of the traversal chain
/// * `first_brk` - Whether the program break was never extended
///
/// All three start at their empty defaults and live for the process; the
/// break segment is never returned to the OS.
pub struct HeapAllocator {
  /// First block ever created. Nulled again when that block was a mapping
  /// and has been returned to the OS.
  heap_start: *mut Block,

  /// Head of the traversal chain. Equals `heap_start` until a MAPPED head
  /// is freed, after which it advances past it.
  prefix: *mut Block,

  /// True until the first break extension. That extension requests a full
  /// `MMAP_THRESHOLD` slab, amortizing the syscall over many small
  /// allocations to come.
  first_brk: bool,
}

impl HeapAllocator {
  /// Creates a new, empty `HeapAllocator`.
  ///
  /// No memory is requested from the OS until the first allocation.
  pub fn new() -> Self {
    Self {
      heap_start: ptr::null_mut(),
      prefix: ptr::null_mut(),
      first_brk: true,
    }
  }

  /// Allocates `size` uninitialized bytes and returns an 8-aligned pointer
  /// to them, or null when `size` is zero.
  ///
  /// Small blocks live in the break segment and are recycled through the
  /// free list; blocks whose total size reaches [`MMAP_THRESHOLD`] get a
  /// dedicated anonymous mapping.
  ///
  /// # Safety
  ///
  /// The allocator's chain must not be mutated concurrently, and the
  /// returned pointer must not outlive the allocator.
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }

    unsafe { self.allocate_with_threshold(size, MMAP_THRESHOLD) }
  }

  /// Allocates `count * size` zeroed bytes, or null when either factor is
  /// zero or their product overflows.
  ///
  /// The mapping threshold drops to the page size here: moderately large
  /// zero-filled requests go straight to fresh mappings, whose pages the
  /// kernel already supplies zeroed.
  ///
  /// # Safety
  ///
  /// Same contract as [`HeapAllocator::allocate`].
  pub unsafe fn allocate_zeroed(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    if count == 0 || size == 0 {
      return ptr::null_mut();
    }
    let Some(total) = count.checked_mul(size) else {
      return ptr::null_mut();
    };

    unsafe {
      let address = self.allocate_with_threshold(total, os::page_size());
      ptr::write_bytes(address, 0, total);
      address
    }
  }

  /// Deallocates a previously allocated block of memory.
  ///
  /// A MAPPED block leaves the chain and its mapping is destroyed on the
  /// spot. A block in the break segment merely turns FREE and becomes a
  /// reuse candidate; the segment itself is never shrunk. Passing null is
  /// a no-op.
  ///
  /// # Safety
  ///
  /// `address` must be null or a pointer obtained from this allocator that
  /// has not been deallocated since. Double frees and wild pointers are
  /// not detected.
  pub unsafe fn deallocate(
    &mut self,
    address: *mut u8,
  ) {
    if address.is_null() {
      return;
    }

    unsafe {
      let block = header_of(address);

      if (*block).status == BlockStatus::Mapped {
        self.unlink(block);
        if block == self.heap_start {
          // the next allocation starts over from an empty chain
          self.heap_start = ptr::null_mut();
        }
        os::unmap(block as *mut u8, (*block).size);
      } else {
        (*block).status = BlockStatus::Free;
        self.coalesce_all();
      }
    }
  }

  /// Resizes the allocation at `address` to `size` bytes, preserving the
  /// payload up to the smaller of both sizes.
  ///
  /// In-place strategies are tried first: shrinking hands the tail back to
  /// the free list, the terminal break block grows by pushing the break,
  /// and interior blocks grow by absorbing FREE neighbors. When none fits,
  /// and on every move between the break segment and mappings, the payload
  /// is copied into a fresh block and the old one is freed.
  ///
  /// A null `address` behaves like `allocate(size)`; a zero `size` behaves
  /// like `deallocate(address)` and returns null. Reallocating a FREE
  /// block is rejected with null.
  ///
  /// # Safety
  ///
  /// Same contract as [`HeapAllocator::deallocate`]; on success the old
  /// pointer is invalidated whenever a different one is returned.
  pub unsafe fn reallocate(
    &mut self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      if address.is_null() {
        return self.allocate(size);
      }
      if size == 0 {
        self.deallocate(address);
        return ptr::null_mut();
      }

      let block = header_of(address);
      if (*block).status == BlockStatus::Free {
        // the caller no longer owns this block
        return ptr::null_mut();
      }

      let old = (*block).size;
      let want_payload = align!(size);
      // block sizes count the header, so every in-place resize targets the
      // header-inclusive total; want_payload only picks the branch
      let want_total = align!(size + HEADER_SIZE);
      let fits_on_heap = want_total < MMAP_THRESHOLD;

      if old >= want_payload {
        // shrink or equal
        let kind_still_right = match (*block).status {
          BlockStatus::Mapped => !fits_on_heap,
          _ => fits_on_heap,
        };
        if kind_still_right && old >= want_total {
          if (*block).status == BlockStatus::Alloc
            && old - want_total >= MIN_SPLIT_RESIDUE
          {
            split(block, want_total);
            coalesce_next((*block).next, usize::MAX);
          }
          return address;
        }
        return self.migrate(address, old, size, want_payload);
      }

      // grow
      if (*block).status == BlockStatus::Alloc {
        if (*block).next.is_null() && fits_on_heap {
          // terminal break block: push the break instead of moving data
          self.grow_break(want_total - old);
          (*block).size = want_total;
          return address;
        }

        coalesce_next(block, want_total);
        if (*block).size >= want_total && fits_on_heap {
          if (*block).size - want_total >= MIN_SPLIT_RESIDUE {
            split(block, want_total);
            coalesce_next((*block).next, usize::MAX);
          }
          return address;
        }
      }

      self.migrate(address, old, size, want_payload)
    }
  }

  /// The shared allocation policy behind `allocate` and `allocate_zeroed`;
  /// `threshold` decides when a request leaves the break segment for a
  /// dedicated mapping.
  unsafe fn allocate_with_threshold(
    &mut self,
    size: usize,
    threshold: usize,
  ) -> *mut u8 {
    unsafe {
      let mut want = align!(size + HEADER_SIZE);
      if want < HEADER_SIZE {
        // every block must be able to host its own header once freed
        want = HEADER_SIZE;
      }

      if self.prefix.is_null() {
        // cold start: the very first block anchors the chain
        let block = self.append_block(ptr::null_mut(), want, threshold);
        self.heap_start = block;
        self.prefix = block;
        return user_ptr(block);
      }

      let mut last = self.prefix;
      let fit = self.find_fit(want, &mut last);

      if !fit.is_null() {
        if (*fit).size - want >= MIN_SPLIT_RESIDUE {
          split(fit, want);
        }
        (*fit).status = BlockStatus::Alloc;
        return user_ptr(fit);
      }

      if (*last).status == BlockStatus::Free {
        // the terminal block sits right at the break: grow it in place
        self.grow_break(want - (*last).size);
        (*last).size = want;
        (*last).status = BlockStatus::Alloc;
        return user_ptr(last);
      }

      let block = self.append_block(last, want, threshold);
      user_ptr(block)
    }
  }

  /// Installs a fresh block past the end of the chain: in the break
  /// segment when `want` is below `threshold`, as a standalone mapping
  /// otherwise. The first break extension requests a full
  /// [`MMAP_THRESHOLD`] slab regardless of `want`.
  unsafe fn append_block(
    &mut self,
    last: *mut Block,
    want: usize,
    threshold: usize,
  ) -> *mut Block {
    unsafe {
      let block;

      if want < threshold {
        let size = if self.first_brk { MMAP_THRESHOLD } else { want };
        block = self.grow_break(size) as *mut Block;
        (*block).size = size;
        (*block).status = BlockStatus::Alloc;
      } else {
        block = os::map(want) as *mut Block;
        (*block).size = want;
        (*block).status = BlockStatus::Mapped;
      }
      (*block).next = ptr::null_mut();

      if !last.is_null() {
        (*last).next = block;
      }

      block
    }
  }

  /// Extends the program break, consuming the one-shot prelude flag.
  unsafe fn grow_break(
    &mut self,
    delta: usize,
  ) -> *mut u8 {
    self.first_brk = false;
    unsafe { os::extend_break(delta) }
  }

  /// Best-fit search: after a full coalescing sweep, selects the smallest
  /// FREE block that holds `want` bytes. `last` is left on the last block
  /// visited, so callers can extend or append at the end of the chain.
  unsafe fn find_fit(
    &mut self,
    want: usize,
    last: &mut *mut Block,
  ) -> *mut Block {
    unsafe {
      self.coalesce_all();

      let mut fit: *mut Block = ptr::null_mut();
      let mut current = self.prefix;

      while !current.is_null() {
        if (*current).status == BlockStatus::Free
          && (*current).size >= want
          && (fit.is_null() || (*current).size < (*fit).size)
        {
          fit = current;
        }
        *last = current;
        current = (*current).next;
      }

      fit
    }
  }

  /// Merges every run of chained FREE neighbors into one block. Afterwards
  /// no two FREE blocks are adjacent anywhere in the chain.
  unsafe fn coalesce_all(&mut self) {
    unsafe {
      let mut current = self.prefix;
      while !current.is_null() {
        if (*current).status == BlockStatus::Free {
          coalesce_next(current, usize::MAX);
        }
        current = (*current).next;
      }
    }
  }

  /// Removes a block from the traversal chain, advancing `prefix` when the
  /// block is the chain head. The predecessor is found by linear scan; the
  /// chain is singly linked and keeps no back-pointers.
  unsafe fn unlink(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      if block == self.prefix {
        self.prefix = (*block).next;
        return;
      }

      let mut current = self.prefix;
      while !current.is_null() && (*current).next != block {
        current = (*current).next;
      }
      if !current.is_null() {
        (*current).next = (*block).next;
      }
    }
  }

  /// Copy-migrates a payload into a freshly allocated block and releases
  /// the original. The fallback for every resize that cannot happen in
  /// place, including moves between the break segment and mappings.
  unsafe fn migrate(
    &mut self,
    address: *mut u8,
    old_total: usize,
    size: usize,
    want_payload: usize,
  ) -> *mut u8 {
    unsafe {
      let new_address = self.allocate(size);

      let preserved = cmp::min(old_total - HEADER_SIZE, want_payload);
      ptr::copy_nonoverlapping(address, new_address, preserved);

      self.deallocate(address);
      new_address
    }
  }
}
