// kernel/src/memory/page_table.rs
//
// The page-table walker: Lookup / Map / Unmap over a process's own
// 4-level radix tree. PML4 allocation, the kernel-entry copy that
// skips user-owned PML4 slots so processes never share an
// intermediate table, and `map_user_page` all draw frames from
// `frame_table`; the user VA layout is narrowed to a single user stack
// page instead of a general user stack region.
//
// Permission tie-break: a walk should fail if any level lacks the
// requested permission. This module's own `map` always installs
// present|writable|user on every interior (non-leaf) entry, so a
// lookup that finds a present leaf has, by construction, present
// interior entries above it with at least as much permission as the
// leaf. Checking the leaf's flags via `Translate::translate` is
// therefore equivalent to checking every level, and is what `lookup`
// does below.
//
// Unmap is a single call into `x86_64`'s `Mapper::unmap`, which already
// clears the leaf and hands back the freed frame atomically — no
// leak-on-map-failure window between clearing a leaf and releasing its
// frame.

use x86_64::registers::control::{Cr3, Cr3Flags};
use x86_64::structures::paging::mapper::{MapToError, TranslateResult, UnmapError};
use x86_64::structures::paging::{
    FrameAllocator, Mapper, OffsetPageTable, Page, PageTable as RawPageTable, PageTableFlags,
    PhysFrame, Size4KiB, Translate,
};
use x86_64::{PhysAddr, VirtAddr};

use crate::config::{PAGE_SIZE, USER_CODE_BASE, USER_STACK_PAGE};
use crate::memory::frame_table::{self, FrameNo, Owner};

#[inline]
const fn pml4_index(va: u64) -> usize {
    ((va >> 39) & 0x1FF) as usize
}

/// PML4 slots that belong to user space and must never be copied from
/// the kernel's own table into a fresh process root.
pub const USER_PML4_ENTRIES: [usize; 2] = [pml4_index(USER_CODE_BASE), pml4_index(USER_STACK_PAGE)];

#[inline]
fn is_user_pml4_entry(index: usize) -> bool {
    USER_PML4_ENTRIES.contains(&index)
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Permissions(PageTableFlags);

impl Permissions {
    pub const READ_ONLY_USER: Permissions = Permissions(Self::bits(
        PageTableFlags::PRESENT.bits() | PageTableFlags::USER_ACCESSIBLE.bits(),
    ));
    pub const READ_WRITE_USER: Permissions = Permissions(Self::bits(
        PageTableFlags::PRESENT.bits()
            | PageTableFlags::USER_ACCESSIBLE.bits()
            | PageTableFlags::WRITABLE.bits(),
    ));
    /// Interior-table permissions: every non-leaf entry this module
    /// installs carries this, which is what makes leaf-only permission
    /// checking in `lookup` sound (see module doc comment).
    const INTERIOR: Permissions = Self::READ_WRITE_USER;

    const fn bits(raw: u64) -> PageTableFlags {
        PageTableFlags::from_bits_truncate(raw)
    }

    fn flags(self) -> PageTableFlags {
        self.0
    }

    pub fn is_writable(self) -> bool {
        self.0.contains(PageTableFlags::WRITABLE)
    }
}

/// Result of a `Lookup`: whether the page is present, and if so its
/// backing frame and the permissions recorded on the leaf.
#[derive(Clone, Copy)]
pub enum Lookup {
    Absent,
    Present { frame: PhysAddr, writable: bool, user: bool },
}

struct FrameTableAllocator(Owner);

unsafe impl FrameAllocator<Size4KiB> for FrameTableAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        frame_table::allocate_for(self.0).map(|addr| PhysFrame::containing_address(addr))
    }
}

/// A process's (or the kernel's) own root page table.
pub struct PageTable {
    pml4_frame: PhysFrame,
    owner: Owner,
}

unsafe impl Send for PageTable {}
unsafe impl Sync for PageTable {}

impl PageTable {
    /// Wrap whatever root is currently loaded in CR3 — used once at
    /// boot to stand in for "the kernel's root" before any process
    /// exists.
    pub fn from_current() -> Self {
        let (frame, _) = Cr3::read();
        Self { pml4_frame: frame, owner: Owner::Kernel }
    }

    /// Build a fresh root for `pid`: a new PML4 frame, with every
    /// kernel entry copied in except the two user-owned slots, which
    /// are left empty so `map` can build independent chains under
    /// them without colliding with another process's tables.
    pub unsafe fn new_user(pid: u32) -> Result<Self, &'static str> {
        let owner = Owner::Process(pid);
        let offset = crate::memory::physical_memory_offset();

        let new_frame_addr = frame_table::allocate_for(owner).ok_or("page_table: out of physical frames")?;
        let new_frame = PhysFrame::containing_address(new_frame_addr);

        let new_pml4_virt = offset + new_frame.start_address().as_u64();
        let new_pml4: &mut RawPageTable = &mut *new_pml4_virt.as_mut_ptr::<RawPageTable>();
        new_pml4.zero();

        let (kernel_frame, _) = Cr3::read();
        let kernel_pml4_virt = offset + kernel_frame.start_address().as_u64();
        let kernel_pml4: &RawPageTable = &*kernel_pml4_virt.as_ptr::<RawPageTable>();

        for i in 0..512 {
            if kernel_pml4[i].is_unused() || is_user_pml4_entry(i) {
                continue;
            }
            new_pml4[i] = kernel_pml4[i].clone();
        }

        Ok(Self { pml4_frame: new_frame, owner })
    }

    pub fn root_frame_no(&self) -> FrameNo {
        (self.pml4_frame.start_address().as_u64() / PAGE_SIZE) as FrameNo
    }

    pub fn root_phys(&self) -> PhysAddr {
        self.pml4_frame.start_address()
    }

    pub unsafe fn activate(&self) {
        let (current, _) = Cr3::read();
        if current == self.pml4_frame {
            return;
        }
        Cr3::write(self.pml4_frame, Cr3Flags::empty());
    }

    unsafe fn mapper(&self) -> OffsetPageTable<'static> {
        let offset = crate::memory::physical_memory_offset();
        let pml4_virt = offset + self.root_phys().as_u64();
        let pml4: &mut RawPageTable = &mut *pml4_virt.as_mut_ptr::<RawPageTable>();
        OffsetPageTable::new(pml4, offset)
    }

    /// Lookup(root, va) — walks the tree and reports the leaf's
    /// presence and permissions; never allocates.
    pub fn lookup(&self, va: VirtAddr) -> Lookup {
        let mapper = unsafe { self.mapper() };
        match mapper.translate(va) {
            TranslateResult::Mapped { frame, flags, .. } => Lookup::Present {
                frame: frame.start_address(),
                writable: flags.contains(PageTableFlags::WRITABLE),
                user: flags.contains(PageTableFlags::USER_ACCESSIBLE),
            },
            TranslateResult::NotMapped | TranslateResult::InvalidFrameAddress(_) => Lookup::Absent,
        }
    }

    /// Map(root, va, pa, size, perm) — `size` is rounded up to whole
    /// pages; every intermediate table created along the way gets
    /// `perm` ORed with `Permissions::INTERIOR` bits so a later
    /// `lookup` only needs to check the leaf (see module doc comment).
    /// A zero physical address with empty permissions clears instead
    /// of mapping, so callers have a single primitive for both.
    pub unsafe fn map(&self, va: VirtAddr, pa: PhysAddr, size: u64, perm: Permissions) -> Result<(), &'static str> {
        if pa.as_u64() == 0 && perm.flags().is_empty() {
            let pages = size.div_ceil(PAGE_SIZE).max(1);
            for i in 0..pages {
                let _ = self.unmap(va + i * PAGE_SIZE);
            }
            return Ok(());
        }

        let mut mapper = self.mapper();
        let mut allocator = FrameTableAllocator(self.owner);
        let pages = size.div_ceil(PAGE_SIZE).max(1);
        let flags = perm.flags() | Permissions::INTERIOR.flags();

        for i in 0..pages {
            let page: Page<Size4KiB> = Page::containing_address(va + i * PAGE_SIZE);
            let frame = PhysFrame::containing_address(pa + i * PAGE_SIZE);
            mapper
                .map_to(page, frame, flags, &mut allocator)
                .map_err(map_to_error_str)?
                .flush();
        }
        Ok(())
    }

    /// Unmap(root, va) — clears the single leaf at `va` and
    /// returns the frame number that was backing it, or `None` if
    /// nothing was mapped there. Atomic: there is no window where the
    /// entry is cleared but the frame is unaccounted for.
    pub unsafe fn unmap(&self, va: VirtAddr) -> Option<FrameNo> {
        let mut mapper = self.mapper();
        let page: Page<Size4KiB> = Page::containing_address(va);
        match mapper.unmap(page) {
            Ok((frame, flush)) => {
                flush.flush();
                Some((frame.start_address().as_u64() / PAGE_SIZE) as FrameNo)
            }
            Err(UnmapError::PageNotMapped) => None,
            Err(_) => None,
        }
    }

    /// Write raw bytes into a physical frame through the direct map,
    /// used by the loader and `fork` to populate a freshly allocated
    /// page without mapping it first.
    pub unsafe fn write_frame(frame: PhysAddr, offset: usize, data: &[u8]) {
        let phys_offset = crate::memory::physical_memory_offset();
        let dst = (phys_offset + frame.as_u64()).as_mut_ptr::<u8>().add(offset);
        core::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
    }

    pub unsafe fn zero_frame(frame: PhysAddr) {
        let phys_offset = crate::memory::physical_memory_offset();
        let virt = phys_offset + frame.as_u64();
        core::ptr::write_bytes(virt.as_mut_ptr::<u8>(), 0, PAGE_SIZE as usize);
    }
}

fn map_to_error_str(err: MapToError<Size4KiB>) -> &'static str {
    match err {
        MapToError::FrameAllocationFailed => "page_table: out of physical frames",
        MapToError::ParentEntryHugePage => "page_table: parent entry is a huge page",
        MapToError::PageAlreadyMapped(_) => "page_table: page already mapped",
    }
}
