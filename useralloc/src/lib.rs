//! A free-list `malloc`/`free`/`calloc`/`realloc` allocator for processes
//! running under the kernel, built directly over its `sbrk` system call.
//!
//! A single doubly-linked, address-ordered free list; best-fit search on
//! `malloc`; coalesce-next-then-previous on `free`; a capped,
//! descending-size-sorted snapshot for `heap_info`; a repeated-pass
//! `defrag`. Pointer bookkeeping is all raw pointers, since there is no
//! heap yet for this crate to allocate `Box`/`Vec` out of.
//!
//! Single-threaded per process (no in-process concurrency exists in this
//! system), so the free list is plain `static mut` state guarded only by
//! the fact that a process's own code runs to completion between its own
//! calls.

#![no_std]

mod syscalls;

use core::mem::size_of;
use core::ptr;

pub use syscalls::{brk, exit, fork, getpid, mapping, mem_tog, page_alloc, panic_msg, proc_yield, sbrk};

const ALIGN: usize = 8;
const MIN_SPLIT_PAYLOAD: usize = 8;
const HEAP_INFO_CAPACITY: usize = 256;

#[repr(C)]
struct FreeBlock {
    /// Total size of the block, header included, a multiple of `ALIGN`.
    size: usize,
    next: *mut FreeBlock,
    prev: *mut FreeBlock,
    freed: bool,
}

const HEADER_SIZE: usize = size_of::<FreeBlock>();

static mut HEAD: *mut FreeBlock = ptr::null_mut();
static mut LIVE_ALLOCATIONS: usize = 0;

#[inline]
fn align_up(n: usize) -> usize {
    (n + (ALIGN - 1)) & !(ALIGN - 1)
}

unsafe fn block_from_payload(ptr: *mut u8) -> *mut FreeBlock {
    ptr.sub(HEADER_SIZE) as *mut FreeBlock
}

unsafe fn payload_of(block: *mut FreeBlock) -> *mut u8 {
    (block as *mut u8).add(HEADER_SIZE)
}

/// `malloc(0)` returns null; otherwise best-fit search the free list, split
/// the chosen block if the remainder can hold a header plus
/// [`MIN_SPLIT_PAYLOAD`] bytes, else grow the heap via `sbrk`.
pub unsafe fn malloc(sz: usize) -> *mut u8 {
    if sz == 0 {
        return ptr::null_mut();
    }

    let total_size = align_up(sz) + HEADER_SIZE;

    let mut best_fit: *mut FreeBlock = ptr::null_mut();
    let mut best_diff = usize::MAX;
    let mut current = HEAD;
    while !current.is_null() {
        let block = &*current;
        if block.freed && block.size >= total_size {
            let diff = block.size - total_size;
            if diff < best_diff {
                best_diff = diff;
                best_fit = current;
            }
        }
        current = block.next;
    }

    if !best_fit.is_null() {
        if (*best_fit).size >= total_size + HEADER_SIZE + MIN_SPLIT_PAYLOAD {
            let new_block = (best_fit as *mut u8).add(total_size) as *mut FreeBlock;
            (*new_block).size = (*best_fit).size - total_size;
            (*new_block).freed = true;
            (*new_block).next = (*best_fit).next;
            (*new_block).prev = best_fit;

            (*best_fit).size = total_size;
            (*best_fit).next = new_block;
            if !(*new_block).next.is_null() {
                (*(*new_block).next).prev = new_block;
            }
        }

        (*best_fit).freed = false;
        LIVE_ALLOCATIONS += 1;
        return payload_of(best_fit);
    }

    let grown = sbrk(total_size as isize);
    if grown < 0 {
        return ptr::null_mut();
    }
    let new_block = grown as usize as *mut FreeBlock;
    (*new_block).size = total_size;
    (*new_block).freed = false;
    (*new_block).next = ptr::null_mut();
    (*new_block).prev = ptr::null_mut();

    if HEAD.is_null() {
        HEAD = new_block;
    } else {
        let mut tail = HEAD;
        while !(*tail).next.is_null() {
            tail = (*tail).next;
        }
        (*tail).next = new_block;
        (*new_block).prev = tail;
    }

    LIVE_ALLOCATIONS += 1;
    payload_of(new_block)
}

/// Null is a no-op. Marks the block freed, inserts it in address order if
/// it isn't already linked, then coalesces with the next block and then
/// the previous one.
pub unsafe fn free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }

    let block = block_from_payload(ptr);
    (*block).freed = true;
    LIVE_ALLOCATIONS -= 1;

    // Every block allocated by this crate is already linked (grown blocks
    // are appended at `malloc` time, split remainders are linked at split
    // time), so this check is defensive rather than load-bearing.
    if !(*block).next.is_null() || !(*block).prev.is_null() || block == HEAD {
        coalesce(block);
        return;
    }

    let mut prev: *mut FreeBlock = ptr::null_mut();
    let mut current = HEAD;
    while !current.is_null() && current < block {
        prev = current;
        current = (*current).next;
    }

    if !prev.is_null() {
        (*prev).next = block;
        (*block).prev = prev;
    } else {
        HEAD = block;
        (*block).prev = ptr::null_mut();
    }

    if !current.is_null() {
        (*current).prev = block;
        (*block).next = current;
    } else {
        (*block).next = ptr::null_mut();
    }

    coalesce(block);
}

unsafe fn coalesce(block: *mut FreeBlock) {
    let next = (*block).next;
    if !next.is_null()
        && (*next).freed
        && (block as *mut u8).add((*block).size) == next as *mut u8
    {
        (*block).size += (*next).size;
        (*block).next = (*next).next;
        if !(*block).next.is_null() {
            (*(*block).next).prev = block;
        }
    }

    let prev = (*block).prev;
    if !prev.is_null()
        && (*prev).freed
        && (prev as *mut u8).add((*prev).size) == block as *mut u8
    {
        (*prev).size += (*block).size;
        (*prev).next = (*block).next;
        if !(*prev).next.is_null() {
            (*(*prev).next).prev = prev;
        }
    }
}

/// Rejects `n == 0` or `sz == 0`, rejects multiplicative overflow, then
/// `malloc`s and zero-fills.
pub unsafe fn calloc(n: usize, sz: usize) -> *mut u8 {
    if n == 0 || sz == 0 {
        return ptr::null_mut();
    }
    let total = match n.checked_mul(sz) {
        Some(t) => t,
        None => return ptr::null_mut(),
    };
    let p = malloc(total);
    if !p.is_null() {
        ptr::write_bytes(p, 0, total);
    }
    p
}

/// `ptr == null` behaves as `malloc`; `sz == 0` behaves as `free` and
/// returns null; a block already large enough is returned unchanged (no
/// in-place shrink); otherwise allocates anew, copies `min(old, new)`
/// bytes, frees the old pointer.
pub unsafe fn realloc(ptr: *mut u8, sz: usize) -> *mut u8 {
    if ptr.is_null() {
        return malloc(sz);
    }
    if sz == 0 {
        free(ptr);
        return ptr::null_mut();
    }

    let block = block_from_payload(ptr);
    if (*block).size >= sz + HEADER_SIZE {
        return ptr;
    }

    let new_ptr = malloc(sz);
    if !new_ptr.is_null() {
        let old_payload = (*block).size - HEADER_SIZE;
        ptr::copy_nonoverlapping(ptr, new_ptr, old_payload.min(sz));
        free(ptr);
    }
    new_ptr
}

/// A snapshot returned by [`heap_info`]: total free bytes, the largest
/// free block, the live-allocation count, and two parallel fixed-capacity
/// arrays of each live allocation's payload size and pointer, sorted
/// largest-first.
pub struct HeapInfo {
    pub free_space: usize,
    pub largest_free_chunk: usize,
    pub num_allocs: usize,
    pub sizes: [usize; HEAP_INFO_CAPACITY],
    pub ptrs: [*mut u8; HEAP_INFO_CAPACITY],
}

impl HeapInfo {
    pub const fn new() -> Self {
        Self {
            free_space: 0,
            largest_free_chunk: 0,
            num_allocs: 0,
            sizes: [0; HEAP_INFO_CAPACITY],
            ptrs: [ptr::null_mut(); HEAP_INFO_CAPACITY],
        }
    }
}

/// Two passes over the free list: first tallies free bytes, the largest
/// free block, and the live count; second fills `out`'s parallel arrays
/// and sorts them descending by size (bubble sort — the arrays this
/// crate deals in are small enough that the choice is not a
/// performance concern). Fails if the live count exceeds
/// [`HEAP_INFO_CAPACITY`].
pub unsafe fn heap_info(out: &mut HeapInfo) -> i32 {
    out.free_space = 0;
    out.largest_free_chunk = 0;
    out.num_allocs = 0;

    let mut current = HEAD;
    while !current.is_null() {
        let block = &*current;
        if block.freed {
            out.free_space += block.size;
            if block.size > out.largest_free_chunk {
                out.largest_free_chunk = block.size;
            }
        } else {
            out.num_allocs += 1;
        }
        current = block.next;
    }

    if out.num_allocs > HEAP_INFO_CAPACITY {
        return -1;
    }
    if out.num_allocs == 0 {
        return 0;
    }

    let mut i = 0;
    current = HEAD;
    while !current.is_null() {
        if !(*current).freed {
            out.sizes[i] = (*current).size - HEADER_SIZE;
            out.ptrs[i] = payload_of(current);
            i += 1;
        }
        current = (*current).next;
    }

    for i in 0..out.num_allocs - 1 {
        for j in 0..out.num_allocs - i - 1 {
            if out.sizes[j] < out.sizes[j + 1] {
                out.sizes.swap(j, j + 1);
                out.ptrs.swap(j, j + 1);
            }
        }
    }

    0
}

/// Repeated linear scans coalescing every pair of physically adjacent
/// freed blocks until a full pass performs no merge.
pub unsafe fn defrag() {
    if HEAD.is_null() {
        return;
    }

    loop {
        let mut did_merge = false;
        let mut current = HEAD;
        while !current.is_null() && !(*current).next.is_null() {
            let next = (*current).next;
            if (*current).freed
                && (*next).freed
                && (current as *mut u8).add((*current).size) == next as *mut u8
            {
                (*current).size += (*next).size;
                (*current).next = (*next).next;
                if !(*current).next.is_null() {
                    (*(*current).next).prev = current;
                }
                did_merge = true;
            } else {
                current = next;
            }
        }
        if !did_merge {
            break;
        }
    }
}
