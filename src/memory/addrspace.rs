//! Address-space collaborator. The
//! scheduler treats a process's address space as an opaque `u64` handle
//! (the level-4 table's physical frame address); everything about what
//! that handle means lives here, never in `scheduler::`.
//!
//! The kernel currently runs with the bootloader's identity mapping of the
//! first gigabyte (`phys_mem_offset = 0`, see `memory::init`), so a physical
//! frame address doubles as a valid virtual address for reading or writing
//! its contents directly - exactly the trick `active_level_4_table` already
//! relies on in `paging.rs`.

use x86_64::{
    structures::paging::{
        FrameAllocator, Mapper, Page, PageTable, PageTableFlags, PhysFrame, Size4KiB,
    },
    PhysAddr, VirtAddr,
};

use super::FRAME_ALLOCATOR;

/// Builds a fresh level-4 table that starts as a byte-for-byte copy of the
/// currently active one, so a freshly forked child inherits every kernel
/// mapping (and, for now, every user mapping too - see module docs) until
/// `clone_user_space` narrows that down. Returns the new table's physical
/// frame address, the handle stored on the child's PCB.
pub fn new_kernel_space() -> Option<u64> {
    let mut allocator = FRAME_ALLOCATOR.lock();
    let frame = allocator.allocate_frame()?;

    let (current_frame, _) = x86_64::registers::control::Cr3::read();
    unsafe {
        let src = current_frame.start_address().as_u64() as *const PageTable;
        let dst = frame.start_address().as_u64() as *mut PageTable;
        core::ptr::copy_nonoverlapping(src, dst, 1);
    }

    Some(frame.start_address().as_u64())
}

/// Copies every `(vaddr, size)` user region from the calling process's
/// current address space into `child_p4`'s, allocating fresh backing frames
/// for the child rather than sharing them with the parent. Returns `false` on allocation failure.
pub fn clone_user_space(child_p4: u64, allocations: &[(u64, u64)]) -> bool {
    for &(vaddr, size) in allocations {
        if !allocate_in(child_p4, VirtAddr::new(vaddr), size) {
            return false;
        }
        let page_count = (size + 4095) / 4096;
        for i in 0..page_count {
            let src = (vaddr + i * 4096) as *const u8;
            let dst_frame = match translate_page(child_p4, VirtAddr::new(vaddr + i * 4096)) {
                Some(f) => f,
                None => return false,
            };
            unsafe {
                core::ptr::copy_nonoverlapping(src, dst_frame.start_address().as_u64() as *mut u8, 4096);
            }
        }
    }
    true
}

/// Maps `size` bytes starting at `vaddr` into the *currently active*
/// address space.
pub fn allocate_user_memory(vaddr: VirtAddr, size: u64) -> bool {
    let (current_frame, _) = x86_64::registers::control::Cr3::read();
    allocate_in(current_frame.start_address().as_u64(), vaddr, size)
}

/// Unmaps `size` bytes starting at `vaddr` in the currently active address
/// space. Frames are not returned to the allocator: `BumpFrameAllocator`
/// never reclaims.
pub fn free_user_space(vaddr: VirtAddr, size: u64) {
    let (current_frame, _) = x86_64::registers::control::Cr3::read();
    let page_count = (size + 4095) / 4096;
    let mut mapper = unsafe { mapper_for(current_frame.start_address().as_u64()) };
    for i in 0..page_count {
        let page: Page<Size4KiB> = Page::containing_address(vaddr + i * 4096);
        if let Ok((_, flush)) = mapper.unmap(page) {
            flush.flush();
        }
    }
}

fn allocate_in(p4_phys: u64, vaddr: VirtAddr, size: u64) -> bool {
    let mut allocator = FRAME_ALLOCATOR.lock();
    let mut mapper = unsafe { mapper_for(p4_phys) };

    let page_count = (size + 4095) / 4096;
    for i in 0..page_count {
        let page: Page<Size4KiB> = Page::containing_address(vaddr + i * 4096);
        let frame = match allocator.allocate_frame() {
            Some(f) => f,
            None => return false,
        };
        let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
        let result = unsafe { mapper.map_to(page, frame, flags, &mut *allocator) };
        match result {
            Ok(flush) => flush.flush(),
            Err(_) => return false,
        }
    }
    true
}

fn translate_page(p4_phys: u64, vaddr: VirtAddr) -> Option<PhysFrame> {
    use x86_64::structures::paging::Translate;
    let mapper = unsafe { mapper_for(p4_phys) };
    mapper.translate_page(Page::<Size4KiB>::containing_address(vaddr)).ok()
}

/// Builds a throwaway `OffsetPageTable` over an arbitrary level-4 table,
/// relying on the same zero-offset identity mapping `paging::init_paging`
/// uses for the currently active one.
unsafe fn mapper_for(p4_phys: u64) -> x86_64::structures::paging::OffsetPageTable<'static> {
    let table_ptr = p4_phys as *mut PageTable;
    x86_64::structures::paging::OffsetPageTable::new(&mut *table_ptr, VirtAddr::new(0))
}
