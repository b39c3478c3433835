//! # osheap - A Custom Memory Allocator Library
//!
//! This crate provides a general-purpose **heap allocator** in Rust that
//! manages memory with the `sbrk` and `mmap` system calls, offering the
//! classical four-function interface: allocate, deallocate, zero-allocate
//! and reallocate.
//!
//! ## Overview
//!
//! Small blocks live in the program-break segment and are recycled through
//! best-fit search with coalescing and splitting; large blocks each get a
//! private anonymous mapping of their own:
//!
//! ```text
//!   Program Memory Layout:
//!
//!   High Address ┌─────────────────────┐
//!                │       Stack         │ ↓ grows down
//!                │         │           │
//!                │         ▼           │      ┌──────────────────┐
//!                │                     │      │ anonymous mapping│ ← blocks of
//!                │         ▲           │      │   (per block)    │   128 KiB+
//!                │         │           │      └──────────────────┘
//!                │       Heap          │ ↑ grows up (sbrk)
//!                ├─────────────────────┤ ← Program Break
//!                │   Uninitialized     │
//!                │       Data          │
//!                ├─────────────────────┤
//!                │   Initialized       │
//!                │       Data          │
//!                ├─────────────────────┤
//!                │       Text          │
//!   Low Address  └─────────────────────┘
//! ```
//!
//! Each allocation is a block with in-band metadata:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────────┬────────────────────────────────┐
//!   │       Block Header        │         User Data              │
//!   │  ┌─────────────────────┐  │                                │
//!   │  │ size: N             │  │  ┌──────────────────────────┐  │
//!   │  │ status: Free        │  │  │                          │  │
//!   │  │       │ Alloc       │  │  │  N - header_size bytes   │  │
//!   │  │       │ Mapped      │  │  │                          │  │
//!   │  │ next: null/ptr      │  │  └──────────────────────────┘  │
//!   │  └─────────────────────┘  │                                │
//!   └───────────────────────────┴────────────────────────────────┘
//!                               ▲
//!                               └── Pointer returned to user (8-aligned)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   osheap
//!   ├── align      - Alignment macro and boundary constant
//!   ├── block      - Block metadata structure (internal)
//!   ├── os         - OS memory provider: sbrk, mmap, munmap (internal)
//!   └── heap       - HeapAllocator implementation
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use osheap::HeapAllocator;
//!
//! fn main() {
//!     let mut heap = HeapAllocator::new();
//!
//!     unsafe {
//!         // Allocate memory for a u64
//!         let ptr = heap.allocate(8) as *mut u64;
//!
//!         // Use the memory
//!         *ptr = 42;
//!         println!("Value: {}", *ptr);
//!
//!         // Grow it, then free it
//!         let ptr = heap.reallocate(ptr as *mut u8, 64);
//!         heap.deallocate(ptr);
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - **Two memory sources**: `sbrk` for small blocks, `mmap` beyond the
//!   128 KiB threshold
//! - **Block recycling**: best-fit reuse with coalescing and splitting
//! - **In-place reallocation**: shrink, absorb free neighbors, or push the
//!   program break before falling back to copying
//! - **Fixed natural alignment**: every pointer is 8-byte aligned
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives; callers must
//!   serialize access externally
//! - **One allocator per process**: all instances would share the same
//!   program break
//! - **Monotonic heap segment**: break memory is recycled but never
//!   returned to the OS (mappings are)
//! - **Unix-only**: requires `libc`, `sbrk` and `mmap` (POSIX systems)
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! All allocation and deallocation operations require `unsafe` blocks.

pub mod align;
mod block;
mod heap;
mod os;

pub use heap::{HeapAllocator, MMAP_THRESHOLD, print_alloc};
