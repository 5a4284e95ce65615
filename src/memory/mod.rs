pub mod allocator;
pub mod frame_allocator;
pub mod paging;

use frame_allocator::BumpFrameAllocator;
use lazy_static::lazy_static;
use spin::Mutex;

lazy_static! {
    pub static ref FRAME_ALLOCATOR: Mutex<BumpFrameAllocator> = Mutex::new(BumpFrameAllocator::new());
}

/// Brings up physical frame allocation, paging, and the kernel heap, in
/// that order — each one depends on the last. `multiboot_info_addr`
/// comes straight from the bootloader's handoff register, still raw at
/// this point since nothing has parsed it yet.
#[cfg(not(test))]
pub fn init(multiboot_info_addr: usize) {
    let boot_info =
        unsafe { multiboot2::BootInformation::load(multiboot_info_addr as *const _).expect("Failed to load Multiboot2 info!") };
    let memory_map_tag = boot_info.memory_map_tag().expect("Memory map tag required");

    let areas = memory_map_tag.memory_areas();
    // Multiboot2 tag memory is part of the bootloader's static handoff
    // region, not anything this kernel will ever reclaim, so a
    // `'static` slice over it is sound for the allocator's lifetime.
    let static_areas: &'static [multiboot2::MemoryArea] =
        unsafe { core::slice::from_raw_parts(areas.as_ptr(), areas.len()) };

    unsafe { FRAME_ALLOCATOR.lock().init(static_areas) };
    crate::log_info!("Physical memory frame allocator initialized from the Multiboot2 map.");

    // The first gigabyte is identity-mapped by `boot.asm`, so physical
    // address 0 doubles as the offset for the whole virtual->physical
    // translation paging builds on top of.
    let phys_mem_offset = x86_64::VirtAddr::new(0);
    unsafe { paging::init_paging(phys_mem_offset) };
    crate::log_info!("Virtual memory paging initialized.");

    allocator::init_heap().expect("heap initialization failed");
    crate::log_info!("Kernel heap initialized.");
}
