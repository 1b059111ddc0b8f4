// kernel/src/loader.rs
//
// A real ELF/flat-binary loader is out of scope here: this kernel only
// needs the contract a loader fulfills — given a process slot and a
// program number, assign physical frames and install user mappings for
// text/data/bss with appropriate permissions, or fail — expressed as a
// trait so `process::lifecycle::load` doesn't hardcode a specific
// program.
//
// `EmbeddedLoader` is the reference implementation this repo ships so
// the trait can actually be exercised end to end: it treats each
// `demos/` program as a flat byte blob loaded at a known fixed
// physical slot, embedding each program's bytes directly rather than
// parsing an image format.

use x86_64::{PhysAddr, VirtAddr};

use crate::config::{LOAD_SLOT_SIZE, PAGE_SIZE, USER_CODE_BASE};
use crate::memory::frame_table::{self, Owner};
use crate::memory::page_table::{PageTable, Permissions};

/// Result of a successful load: the program-break window just above the
/// loaded image.
pub struct LoadedImage {
    pub original_break: u64,
    pub program_break: u64,
}

pub trait ProgramLoader {
    /// Assign physical frames and install user mappings for `program`
    /// into `pid`'s root page table. Returns the initial break window on
    /// success, -1-equivalent `Err` on failure.
    fn load(&self, pid: u32, root: &PageTable, program: u32) -> Result<LoadedImage, &'static str>;
}

/// One flat byte image per program number, placed at a fixed physical
/// slot keyed by pid — equally-sized fixed slots, one per process.
pub struct EmbeddedLoader {
    pub programs: &'static [&'static [u8]],
}

impl ProgramLoader for EmbeddedLoader {
    fn load(&self, pid: u32, root: &PageTable, program: u32) -> Result<LoadedImage, &'static str> {
        let image = *self
            .programs
            .get(program as usize)
            .ok_or("loader: unknown program number")?;
        if image.len() as u64 > LOAD_SLOT_SIZE {
            return Err("loader: program exceeds fixed load slot size");
        }

        let slot_phys = PhysAddr::new(pid as u64 * LOAD_SLOT_SIZE);
        let num_pages = (image.len() as u64).div_ceil(PAGE_SIZE).max(1);

        for i in 0..num_pages {
            let frame_addr = slot_phys + i * PAGE_SIZE;
            frame_table::assign(frame_addr, Owner::Process(pid))?;

            let offset = memory_offset();
            let dst = (offset + frame_addr.as_u64()).as_mut_ptr::<u8>();
            unsafe { core::ptr::write_bytes(dst, 0, PAGE_SIZE as usize) };

            let start = (i * PAGE_SIZE) as usize;
            let end = (start + PAGE_SIZE as usize).min(image.len());
            if start < image.len() {
                unsafe { core::ptr::copy_nonoverlapping(image[start..end].as_ptr(), dst, end - start) };
            }
        }

        unsafe {
            root.map(
                VirtAddr::new(USER_CODE_BASE),
                slot_phys,
                num_pages * PAGE_SIZE,
                Permissions::READ_WRITE_USER,
            )?;
        }

        let break_start = USER_CODE_BASE + num_pages * PAGE_SIZE;
        Ok(LoadedImage {
            original_break: break_start,
            program_break: break_start,
        })
    }
}

fn memory_offset() -> VirtAddr {
    crate::memory::physical_memory_offset()
}
