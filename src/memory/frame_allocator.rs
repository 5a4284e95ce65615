use multiboot2::{MemoryArea, MemoryAreaType};
use x86_64::{
    structures::paging::{FrameAllocator, PhysFrame, Size4KiB},
    PhysAddr,
};

/// A simple bump allocator for physical memory frames. Never frees —
/// frames the VM subsystem gives back go straight to `vm::frame::FrameTable`'s
/// own free list instead of back here, matching `original_source/src/
/// threads/palloc.c`'s split between a one-way bump pool and a bitmap
/// the page allocator itself recycles.
pub struct BumpFrameAllocator {
    next_free_frame: PhysFrame,
    current_limit: PhysFrame,
}

impl BumpFrameAllocator {
    pub fn new() -> Self {
        BumpFrameAllocator {
            next_free_frame: PhysFrame::containing_address(PhysAddr::new(0)),
            current_limit: PhysFrame::containing_address(PhysAddr::new(0)),
        }
    }

    /// Picks the largest `Available` region out of the Multiboot2 memory
    /// map and bump-allocates out of it. Anything below 1 MiB is skipped
    /// even if marked available, since the kernel image and boot
    /// structures live there.
    pub unsafe fn init(&mut self, areas: &'static [MemoryArea]) {
        const LOW_MEM_RESERVED: u64 = 0x10_0000;

        let best = areas
            .iter()
            .filter(|a| a.typ() == MemoryAreaType::Available)
            .map(|a| {
                let start = a.start_address().max(LOW_MEM_RESERVED);
                let end = a.end_address();
                (start, end)
            })
            .filter(|(start, end)| end > start)
            .max_by_key(|(start, end)| end - start);

        let (start, end) = best.expect("no usable memory region in multiboot2 map");
        self.next_free_frame = PhysFrame::containing_address(PhysAddr::new(start));
        self.current_limit = PhysFrame::containing_address(PhysAddr::new(end));
    }
}

unsafe impl FrameAllocator<Size4KiB> for BumpFrameAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame> {
        if self.next_free_frame <= self.current_limit {
            let frame = self.next_free_frame;
            self.next_free_frame += 1;
            Some(frame)
        } else {
            None
        }
    }
}
