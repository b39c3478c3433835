//! OS memory provider.
//!
//! Two primitives back the allocator: extending the program break (`sbrk`)
//! for the contiguous heap segment, and private anonymous mappings
//! (`mmap`/`munmap`) for large standalone blocks.
//!
//! A failure of either primitive is fatal. A half-completed segment
//! extension or mapping would leave the block chain describing memory that
//! does not exist, so the process prints a diagnostic and aborts instead of
//! propagating an error the allocator could not honor anyway.

use std::{io, process, ptr};

use libc::{c_void, intptr_t, size_t};

/// Cached result of the page-size query. `sysconf` never changes its answer
/// for a running process, so one syscall is enough.
static mut PAGE_SIZE: usize = 0;

/// Reports a failed OS primitive on stderr and terminates the process.
fn die(primitive: &str) -> ! {
  eprintln!("osheap: {} failed: {}", primitive, io::Error::last_os_error());
  process::abort()
}

/// Moves the program break `delta` bytes forward and returns the base of the
/// newly added range (the old break).
pub unsafe fn extend_break(delta: usize) -> *mut u8 {
  let old_break = unsafe { libc::sbrk(delta as intptr_t) };
  if old_break == usize::MAX as *mut c_void {
    die("sbrk");
  }

  old_break as *mut u8
}

/// Creates a private anonymous mapping of `size` bytes. The kernel supplies
/// the pages already zeroed.
pub unsafe fn map(size: usize) -> *mut u8 {
  let address = unsafe {
    libc::mmap(
      ptr::null_mut(),
      size as size_t,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
      -1,
      0,
    )
  };
  if address == libc::MAP_FAILED {
    die("mmap");
  }

  address as *mut u8
}

/// Destroys a mapping previously created by [`map`]. `size` must be the size
/// the mapping was created with.
pub unsafe fn unmap(
  base: *mut u8,
  size: usize,
) {
  if unsafe { libc::munmap(base as *mut c_void, size as size_t) } == -1 {
    die("munmap");
  }
}

/// The system page size, queried once and cached.
pub fn page_size() -> usize {
  unsafe {
    if PAGE_SIZE == 0 {
      let size = libc::sysconf(libc::_SC_PAGE_SIZE);
      if size == -1 {
        die("sysconf");
      }
      PAGE_SIZE = size as usize;
    }

    PAGE_SIZE
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn page_size_is_a_positive_power_of_two() {
    let size = page_size();
    assert!(size > 0);
    assert_eq!(0, size & (size - 1));
  }

  #[test]
  fn mapping_round_trip() {
    let size = 2 * page_size();

    unsafe {
      let base = map(size);
      assert!(!base.is_null());

      // Fresh anonymous pages arrive zeroed.
      assert_eq!(0, base.read());
      assert_eq!(0, base.add(size - 1).read());

      ptr::write_bytes(base, 0x5A, size);
      assert_eq!(0x5A, base.add(size / 2).read());

      unmap(base, size);
    }
  }
}
