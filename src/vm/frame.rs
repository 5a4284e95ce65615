//! Frame table: the inventory of user-owned physical
//! frames, with clock-algorithm eviction when physical memory is
//! exhausted. Grounded on `original_source/src/vm/frame.c`: interrupts
//! stay disabled across victim selection and SPTE updates, then the
//! (possibly slow) swap write happens with interrupts back on, exactly
//! as the original's `frame_alloc` does.

use alloc::vec::Vec;
use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::structures::paging::FrameAllocator;
use x86_64::PhysAddr;

use super::clist::ClockList;
use super::clock;
use super::page::Backing;
use crate::scheduler::thread::ThreadId;
use crate::sync::intr;

/// One physical frame currently on loan to one or more virtual pages.
/// Plural references exist only for pages shared read-only between
/// processes (e.g. a single executable's code segment reused by
/// multiple `exec`s of the same binary); the common case is exactly one.
struct FrameEntry {
    paddr: PhysAddr,
    references: Vec<FrameReference>,
}

struct FrameReference {
    owner: ThreadId,
    vaddr: u64,
}

pub struct FrameTable {
    slots: Vec<Option<FrameEntry>>,
    free_slots: Vec<usize>,
    ring: ClockList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameId(pub usize);

#[derive(Debug)]
pub enum FrameError {
    /// Physical memory and the swap area are both exhausted.
    OutOfMemory,
}

lazy_static! {
    pub static ref FRAME_TABLE: Mutex<FrameTable> = Mutex::new(FrameTable::new());
}

impl FrameTable {
    fn new() -> Self {
        FrameTable {
            slots: Vec::new(),
            free_slots: Vec::new(),
            ring: ClockList::new(),
        }
    }

    /// Allocates a frame for `vaddr` in `owner`'s address space, evicting
    /// a victim via the clock algorithm if physical memory is exhausted.
    /// The returned frame is zeroed.
    pub fn alloc(&mut self, owner: ThreadId, vaddr: u64) -> Result<FrameId, FrameError> {
        let paddr = match crate::memory::FRAME_ALLOCATOR.lock().allocate_frame() {
            Some(frame) => frame.start_address(),
            None => self.evict_one()?,
        };

        zero_frame(paddr);

        let entry = FrameEntry {
            paddr,
            references: alloc::vec![FrameReference { owner, vaddr }],
        };
        let id = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.ring.push_back(id);
        Ok(FrameId(id))
    }

    /// Drops `owner`'s reference to `frame`. When the last reference is
    /// gone the physical frame is returned to the allocator and the slot
    /// is recycled.
    pub fn free(&mut self, frame: FrameId, owner: ThreadId) {
        let Some(Some(entry)) = self.slots.get_mut(frame.0) else {
            return;
        };
        entry.references.retain(|r| r.owner != owner);
        if entry.references.is_empty() {
            self.ring.remove(frame.0);
            self.slots[frame.0] = None;
            self.free_slots.push(frame.0);
            // The allocator this crate uses is a bump allocator with no
            // free path yet; returning physical frames to it is future
            // work tracked alongside the rest of memory::frame_allocator.
        }
    }

    pub fn paddr_of(&self, frame: FrameId) -> Option<PhysAddr> {
        self.slots.get(frame.0)?.as_ref().map(|e| e.paddr)
    }

    /// Runs the clock algorithm to free up exactly one frame, writing it
    /// to swap first if any of its references needs to survive. Returns
    /// the now-free frame's physical address for immediate reuse.
    ///
    /// Interrupts are disabled for victim selection and every SPTE /
    /// page-table update; the swap write itself runs with interrupts
    /// restored, matching `original_source/src/vm/frame.c`.
    fn evict_one(&mut self) -> Result<PhysAddr, FrameError> {
        let (victim_id, paddr, swap_targets) = intr::without_interrupts(|| {
            let victim_id = clock::select_victim(&mut self.ring, |id| {
                accessed_and_clear(&self.slots[id].as_ref().unwrap().references)
            })
            .ok_or(FrameError::OutOfMemory)?;

            let entry = self.slots[victim_id].take().unwrap();
            self.free_slots.push(victim_id);

            let mut swap_targets = Vec::new();
            for reference in &entry.references {
                let needs_swap = crate::scheduler::with_process_spt(reference.owner, |spt| {
                    match spt.lookup(reference.vaddr).map(|s| &s.segment) {
                        Some(crate::vm::page::SegmentKind::Code) => false,
                        Some(crate::vm::page::SegmentKind::Data) => {
                            crate::memory::paging::is_dirty(reference.owner, reference.vaddr)
                        }
                        Some(crate::vm::page::SegmentKind::Stack) => true,
                        None => false,
                    }
                })
                .unwrap_or(false);
                crate::memory::paging::unmap_user_page(reference.owner, reference.vaddr);
                if needs_swap {
                    swap_targets.push(*reference);
                }
            }
            Ok::<_, FrameError>((victim_id, entry.paddr, swap_targets))
        })?;

        if !swap_targets.is_empty() {
            let slot = super::swap::SWAP_TABLE.lock().alloc_slot()?;
            super::swap::store(slot, paddr);
            for reference in &swap_targets {
                crate::scheduler::with_process_spt(reference.owner, |spt| {
                    spt.mark_swapped_out(reference.vaddr, slot);
                });
            }
        }

        let _ = victim_id;
        Ok(paddr)
    }
}

impl Clone for FrameReference {
    fn clone(&self) -> Self {
        FrameReference {
            owner: self.owner,
            vaddr: self.vaddr,
        }
    }
}
impl Copy for FrameReference {}

fn accessed_and_clear(references: &[FrameReference]) -> bool {
    let mut any = false;
    for reference in references {
        if crate::memory::paging::is_accessed(reference.owner, reference.vaddr) {
            any = true;
            crate::memory::paging::clear_accessed(reference.owner, reference.vaddr);
        }
    }
    any
}

fn zero_frame(paddr: PhysAddr) {
    let ptr = crate::memory::paging::phys_to_virt(paddr).as_mut_ptr::<u8>();
    unsafe {
        core::ptr::write_bytes(ptr, 0, super::page::PAGE_SIZE as usize);
    }
}

impl From<crate::vm::swap::SwapError> for FrameError {
    fn from(_: crate::vm::swap::SwapError) -> Self {
        FrameError::OutOfMemory
    }
}
