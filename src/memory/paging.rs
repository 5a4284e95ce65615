//! Virtual memory mapping. The assembly boot stub identity-maps the first
//! gigabyte of physical memory before handing off to Rust, so
//! `physical_memory_offset` is always zero in this build and every
//! physical frame this kernel ever touches already has a matching virtual
//! address — `phys_to_virt` is the identity function, not an offset add,
//! as a direct consequence.
//!
//! This build keeps a single page table shared by every thread rather
//! than a per-process address space: `create_new_page_table` hands back
//! the one CR3 already in use, and the `owner` parameter threaded
//! through the per-page helpers below exists only so the call sites in
//! `vm::frame`/`vm::fault` read the way a multi-address-space version
//! would, without this build having to implement CR3 switching, TLB
//! shootdown, or address-space teardown on exit.

use spin::Mutex;
use x86_64::registers::control::Cr3;
use x86_64::structures::paging::{
    FrameAllocator, Mapper, OffsetPageTable, Page, PageTable, PageTableFlags, PhysFrame, Size4KiB,
};
use x86_64::{PhysAddr, VirtAddr};

use crate::scheduler::thread::ThreadId;

/// Lowest address considered part of user space. Anything below this a
/// process thread may legally fault on or pass as a syscall buffer.
pub const USER_BASE: u64 = 0x0040_0000;
/// One past the highest address considered user space; matches the
/// canonical split `original_source/src/threads/vaddr.h` calls `PHYS_BASE`.
pub const USER_TOP: u64 = 0x0000_7fff_ffff_f000;

static PAGING: Mutex<Option<VirtAddr>> = Mutex::new(None);

/// Builds the kernel's [`OffsetPageTable`] over the currently active
/// level-4 table and records the physical-memory offset for later
/// lookups (`phys_to_virt`, `map_range`, per-page helpers). Must run
/// once, before the frame allocator or heap are used.
pub unsafe fn init_paging(physical_memory_offset: VirtAddr) -> OffsetPageTable<'static> {
    *PAGING.lock() = Some(physical_memory_offset);
    let level_4_table = active_level_4_table(physical_memory_offset);
    OffsetPageTable::new(level_4_table, physical_memory_offset)
}

unsafe fn active_level_4_table(physical_memory_offset: VirtAddr) -> &'static mut PageTable {
    let (level_4_table_frame, _) = Cr3::read();
    let phys = level_4_table_frame.start_address();
    let virt = physical_memory_offset + phys.as_u64();
    let page_table_ptr: *mut PageTable = virt.as_mut_ptr();
    &mut *page_table_ptr
}

fn mem_offset() -> VirtAddr {
    PAGING.lock().expect("paging not initialized")
}

unsafe fn current_mapper() -> OffsetPageTable<'static> {
    let offset = mem_offset();
    OffsetPageTable::new(active_level_4_table(offset), offset)
}

pub fn phys_to_virt(paddr: PhysAddr) -> VirtAddr {
    mem_offset() + paddr.as_u64()
}

pub fn is_user_address(addr: u64) -> bool {
    (USER_BASE..USER_TOP).contains(&addr)
}

/// Top of the single user stack region this build hands every process
/// thread — one page below the canonical user/kernel split.
pub fn user_stack_top() -> u64 {
    USER_TOP
}

/// Maps `size` bytes starting at `virt_start` to freshly allocated
/// physical frames, used once at boot to back the kernel heap.
/// Grounded on `examples/valibali-cluu/kernel/src/memory/heap.rs`'s
/// `paging::map_range` call, generalized to take its flags as a
/// parameter instead of hardcoding writable-heap flags.
pub fn map_range(virt_start: VirtAddr, size: u64, flags: PageTableFlags) -> Result<(), &'static str> {
    let page_count = (size + 4095) / 4096;
    let mut mapper = unsafe { current_mapper() };
    let mut allocator = crate::memory::FRAME_ALLOCATOR.lock();
    for i in 0..page_count {
        let page = Page::<Size4KiB>::containing_address(virt_start + i * 4096);
        let frame = allocator.allocate_frame().ok_or("out of physical frames")?;
        unsafe {
            mapper
                .map_to(page, frame, flags, &mut *allocator)
                .map_err(|_| "heap page already mapped")?
                .flush();
        }
    }
    Ok(())
}

/// Maps a single user page to `paddr`, creating missing intermediate
/// page table levels as needed. `owner` is unused in this build's
/// single-address-space design; see the module doc comment.
pub fn map_user_page(_owner: ThreadId, vaddr: u64, paddr: PhysAddr, writable: bool) {
    let mut flags = PageTableFlags::PRESENT | PageTableFlags::USER_ACCESSIBLE;
    if writable {
        flags |= PageTableFlags::WRITABLE;
    }
    let page = Page::<Size4KiB>::containing_address(VirtAddr::new(vaddr));
    let frame = PhysFrame::containing_address(paddr);
    let mut mapper = unsafe { current_mapper() };
    let mut allocator = crate::memory::FRAME_ALLOCATOR.lock();
    unsafe {
        match mapper.map_to(page, frame, flags, &mut *allocator) {
            Ok(flush) => flush.flush(),
            Err(x86_64::structures::paging::mapper::MapToError::PageAlreadyMapped(_)) => {
                let _ = mapper.unmap(page);
                let _ = mapper.map_to(page, frame, flags, &mut *allocator).map(|f| f.flush());
            }
            Err(e) => panic!("map_user_page failed: {:?}", e),
        }
    }
}

/// Unmaps a single user page, dropping it from the page table without
/// freeing the backing frame (the caller, `vm::frame::FrameTable`, owns
/// that decision).
pub fn unmap_user_page(_owner: ThreadId, vaddr: u64) {
    let page = Page::<Size4KiB>::containing_address(VirtAddr::new(vaddr));
    let mut mapper = unsafe { current_mapper() };
    if let Ok((_, flush)) = mapper.unmap(page) {
        flush.flush();
    }
}

/// Whether `vaddr`'s page currently has a present mapping, independent
/// of the supplemental page table's own bookkeeping. Used by the page
/// fault handler to short-circuit a fault that raced an already-
/// completed `load_page` (or landed on a stale TLB entry) instead of
/// paging the same address in twice.
pub fn is_mapped(vaddr: u64) -> bool {
    use x86_64::structures::paging::mapper::Translate;
    let mapper = unsafe { current_mapper() };
    matches!(
        mapper.translate(VirtAddr::new(vaddr)),
        x86_64::structures::paging::mapper::TranslateResult::Mapped { .. }
    )
}

pub fn is_accessed(_owner: ThreadId, vaddr: u64) -> bool {
    page_flag(vaddr, PageTableFlags::ACCESSED)
}

pub fn clear_accessed(_owner: ThreadId, vaddr: u64) {
    set_page_flag(vaddr, PageTableFlags::ACCESSED, false);
}

pub fn is_dirty(_owner: ThreadId, vaddr: u64) -> bool {
    page_flag(vaddr, PageTableFlags::DIRTY)
}

fn page_flag(vaddr: u64, flag: PageTableFlags) -> bool {
    use x86_64::structures::paging::mapper::Translate;
    let mapper = unsafe { current_mapper() };
    match mapper.translate(VirtAddr::new(vaddr)) {
        x86_64::structures::paging::mapper::TranslateResult::Mapped { flags, .. } => flags.contains(flag),
        _ => false,
    }
}

fn set_page_flag(vaddr: u64, flag: PageTableFlags, value: bool) {
    use x86_64::structures::paging::mapper::Translate;
    let page = Page::<Size4KiB>::containing_address(VirtAddr::new(vaddr));
    let mut mapper = unsafe { current_mapper() };
    let mut flags = match mapper.translate(VirtAddr::new(vaddr)) {
        x86_64::structures::paging::mapper::TranslateResult::Mapped { flags, .. } => flags,
        _ => return,
    };
    flags.set(flag, value);
    unsafe {
        let _ = mapper.update_flags(page, flags);
    }
}

/// Returns the page table this build's single shared address space
/// already runs under. A real per-process implementation would build
/// and return a fresh level-4 table's physical frame here instead.
pub unsafe fn create_new_page_table() -> u64 {
    Cr3::read().0.start_address().as_u64()
}
