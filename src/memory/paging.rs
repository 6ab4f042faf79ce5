use x86_64::{
    structures::paging::{OffsetPageTable, PageTable, PhysFrame},
    PhysAddr, VirtAddr,
};

/// Initializes the Paging module and returns an `OffsetPageTable` wrapping
/// the active level-4 table, the mapper the heap allocator and the
/// address-space collaborator (`clone_user_space`, `new_kernel_space`) build
/// on top of.
pub unsafe fn init_paging(physical_memory_offset: VirtAddr) -> OffsetPageTable<'static> {
    let level_4_table = active_level_4_table(physical_memory_offset);
    OffsetPageTable::new(level_4_table, physical_memory_offset)
}

/// Loads `address_space` (a level-4 page table's physical frame, as stored
/// on the process's PCB) into CR3, switching the currently active user
/// address space. A no-op when `address_space` already matches CR3 (the
/// dispatcher calls this on every process switch, including back into the
/// same process after a sleep/wakeup cycle).
pub fn switch_user_space(address_space: u64) {
    use x86_64::registers::control::{Cr3, Cr3Flags};

    let (current_frame, flags) = Cr3::read();
    if current_frame.start_address().as_u64() == address_space {
        return;
    }
    let frame = PhysFrame::containing_address(PhysAddr::new(address_space));
    unsafe {
        Cr3::write(frame, flags);
    }
}

unsafe fn active_level_4_table(physical_memory_offset: VirtAddr) -> &'static mut PageTable {
    use x86_64::registers::control::Cr3;
    
    let (level_4_table_frame, _) = Cr3::read();
    let phys = level_4_table_frame.start_address();
    let virt = physical_memory_offset + phys.as_u64();
    let page_table_ptr: *mut PageTable = virt.as_mut_ptr();
    
    &mut *page_table_ptr
}
