// kernel/src/config.rs
//
// Constants that the original kernel expressed as `#define`s.

/// Bytes per physical frame / virtual page.
pub const PAGE_SIZE: u64 = 4096;

/// Physical memory budget this build is sized for (matches the 256 MiB
/// QEMU is launched with). `memory::frame_table` never addresses more
/// than this many frames.
pub const MEMSIZE_PHYSICAL: u64 = 256 * 1024 * 1024;
pub const MAX_FRAMES: usize = (MEMSIZE_PHYSICAL / PAGE_SIZE) as usize;

/// Fixed-size process table. Slot 0 is permanently free and never
/// scheduled (§3's process descriptor invariant).
pub const NPROC: usize = 16;

/// User code base address. Falls in PML4 entry 0.
pub const USER_CODE_BASE: u64 = 0x0000_0000_0040_0000;

/// Top of the user half of the address space (canonical, below this the
/// CPU treats addresses as user-reachable). One page below this is where
/// the user stack is installed.
pub const USER_ADDR_TOP: u64 = 0x0000_8000_0000_0000;

/// User stack base — one page below `USER_ADDR_TOP`.
pub const USER_STACK_PAGE: u64 = USER_ADDR_TOP - PAGE_SIZE;

/// Per-process fixed physical load slot size, used by the reference
/// loader to place initial process images at known physical starts
/// (§6: "user processes occupy equally sized fixed slots at known
/// physical starts for initial load").
pub const LOAD_SLOT_SIZE: u64 = 64 * 1024;

/// PIT frequency driving the round-robin scheduler's timer ticks.
pub const HZ: u32 = 100;

/// Physical address of the fixed console MMIO cell grid (out of scope;
/// named here only so the page-table code can map it).
pub const CONSOLE_PHYS_ADDR: u64 = 0xB_8000;
pub const CONSOLE_SIZE_BYTES: u64 = PAGE_SIZE;

/// Fixed virtual address every process maps the console page at,
/// read-only, user-accessible (§5's one cross-process-shared mapping).
pub const CONSOLE_VIRT_ADDR: u64 = 0x0000_7000_0000_0000;

/// Maximum bytes `panic(msg_ptr)` will read from user space, across at
/// most two pages.
pub const PANIC_MSG_MAX: usize = 160;
