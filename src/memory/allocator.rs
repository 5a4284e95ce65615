//! Kernel heap, grounded on `examples/valibali-cluu/kernel/src/memory/
//! heap.rs`: a fixed high-canonical virtual range mapped to physical
//! frames at boot and handed to `linked_list_allocator`, registered as
//! `#[global_allocator]` so `alloc::{boxed,vec,collections}` work.

use x86_64::structures::paging::PageTableFlags;
use x86_64::VirtAddr;

use linked_list_allocator::LockedHeap;

/// High canonical address, well clear of both the identity-mapped low
/// gigabyte and the user address range in `memory::paging`.
pub const HEAP_START: u64 = 0xffff_ffff_c000_0000;
pub const HEAP_SIZE: u64 = 8 * 1024 * 1024;

#[cfg(not(test))]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Maps the heap range and hands it to the global allocator. Must run
/// once, after `memory::paging::init_paging` and before any `alloc::`
/// collection is touched.
#[cfg(not(test))]
pub fn init_heap() -> Result<(), &'static str> {
    let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE;
    crate::memory::paging::map_range(VirtAddr::new(HEAP_START), HEAP_SIZE, flags)?;

    unsafe {
        ALLOCATOR.lock().init(HEAP_START as *mut u8, HEAP_SIZE as usize);
    }
    Ok(())
}

#[cfg(not(test))]
#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap allocation failed: {:?}", layout);
}
