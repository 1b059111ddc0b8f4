// kernel/src/memory/mod.rs

use core::sync::atomic::{AtomicU64, Ordering};
use x86_64::VirtAddr;

pub mod demand_paging;
pub mod frame_table;
pub mod page_table;

static PHYSICAL_MEMORY_OFFSET: AtomicU64 = AtomicU64::new(0);

/// Records the offset at which the bootloader identity-maps all of
/// physical memory. Called once from `kernel_main`.
pub fn init(physical_memory_offset: VirtAddr) {
    PHYSICAL_MEMORY_OFFSET.store(physical_memory_offset.as_u64(), Ordering::Relaxed);
}

pub fn physical_memory_offset() -> VirtAddr {
    VirtAddr::new(PHYSICAL_MEMORY_OFFSET.load(Ordering::Relaxed))
}
