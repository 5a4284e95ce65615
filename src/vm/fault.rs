//! Page fault handling / demand paging. Called from
//! `interrupts::idt`'s `#[page_fault_handler]` with the faulting address
//! and the current thread's user stack pointer (needed to distinguish a
//! legitimate stack-growth fault from a wild pointer).

use x86_64::structures::idt::PageFaultErrorCode;

use super::page::{Backing, SegmentKind};
use crate::scheduler::thread::ThreadId;

/// Highest address the stack is allowed to grow down to below its
/// initial top — 8 MiB, matching the default Pintos/most-OS user stack
/// ulimit.
const STACK_MAX_SIZE: u64 = 8 * 1024 * 1024;

/// Faults at or above this many bytes below the current stack pointer
/// are never treated as legitimate growth; real CPUs only probe a few
/// words ahead of `rsp` (`push`, `pusha`-style prologues).
const STACK_GROWTH_SLOP: u64 = 32;

pub enum Outcome {
    /// The page was faulted in (or the stack grown) and the faulting
    /// instruction should be retried.
    Resolved,
    /// Not a page this kernel can service: kernel-space access, a
    /// protection violation against a read-only page, or a wild pointer
    /// with no supplemental entry and no plausible stack growth. The
    /// caller kills the faulting thread (or, if `in_syscall`, unwinds to
    /// `exit(-1)` instead).
    Unhandled,
}

/// Services a page fault for `owner` at `fault_vaddr`. `rsp` is the
/// interrupted thread's stack pointer at the time of the fault, used
/// only to evaluate the stack-growth heuristic.
pub fn handle(owner: ThreadId, fault_vaddr: u64, error_code: PageFaultErrorCode, rsp: u64) -> Outcome {
    if !crate::memory::paging::is_user_address(fault_vaddr) {
        return Outcome::Unhandled;
    }

    let page = fault_vaddr & !(super::page::PAGE_SIZE - 1);

    // Already mapped and this isn't a permission violation: a stale TLB
    // entry or a second thread racing the same fault in. Nothing left to
    // load; a genuine protection violation (write to a read-only page)
    // still falls through to the writable check below.
    if !error_code.contains(PageFaultErrorCode::PROTECTION_VIOLATION)
        && crate::memory::paging::is_mapped(page)
    {
        return Outcome::Resolved;
    }

    let existing = crate::scheduler::with_process_spt(owner, |spt| spt.lookup(page).is_some())
        .unwrap_or(false);

    if existing {
        let is_write = error_code.contains(PageFaultErrorCode::CAUSED_BY_WRITE);
        let writable = crate::scheduler::with_process_spt(owner, |spt| {
            spt.lookup(page).map(|s| s.writable).unwrap_or(false)
        })
        .unwrap_or(false);
        if is_write && !writable {
            return Outcome::Unhandled;
        }
        return load_page(owner, page);
    }

    if is_stack_growth_candidate(fault_vaddr, rsp) {
        let inserted = crate::scheduler::with_process_spt(owner, |spt| {
            spt.insert_zero(page, true, SegmentKind::Stack)
        })
        .unwrap_or(false);
        if inserted {
            return load_page(owner, page);
        }
    }

    Outcome::Unhandled
}

fn is_stack_growth_candidate(fault_vaddr: u64, rsp: u64) -> bool {
    let phys_base = crate::memory::paging::user_stack_top();
    if fault_vaddr >= phys_base {
        return false;
    }
    if fault_vaddr + STACK_GROWTH_SLOP < rsp {
        return false;
    }
    phys_base - fault_vaddr <= STACK_MAX_SIZE
}

/// Allocates a frame, populates it from the SPTE's backing, and maps it
/// into `owner`'s page table.
fn load_page(owner: ThreadId, page: u64) -> Outcome {
    let frame = match super::frame::FRAME_TABLE.lock().alloc(owner, page) {
        Ok(frame) => frame,
        Err(_) => return Outcome::Unhandled,
    };
    let paddr = super::frame::FRAME_TABLE.lock().paddr_of(frame).unwrap();

    let backing_ok = crate::scheduler::with_process_spt(owner, |spt| {
        let Some(spte) = spt.lookup_mut(page) else {
            return false;
        };
        match &spte.backing {
            Backing::Zero => true,
            Backing::File {
                file,
                offset,
                read_bytes,
                ..
            } => {
                let dst = crate::memory::paging::phys_to_virt(paddr).as_mut_ptr::<u8>();
                let buf = unsafe { core::slice::from_raw_parts_mut(dst, *read_bytes as usize) };
                file.lock().read_at(*offset, buf).is_ok()
            }
            Backing::Swap { slot } => {
                super::swap::load(*slot, paddr);
                super::swap::SWAP_TABLE.lock().free_slot(*slot);
                true
            }
        }
    })
    .unwrap_or(false);

    if !backing_ok {
        super::frame::FRAME_TABLE.lock().free(frame, owner);
        return Outcome::Unhandled;
    }

    crate::scheduler::with_process_spt(owner, |spt| spt.mark_resident(page, frame.0));
    let writable = crate::scheduler::with_process_spt(owner, |spt| {
        spt.lookup(page).map(|s| s.writable).unwrap_or(false)
    })
    .unwrap_or(false);
    crate::memory::paging::map_user_page(owner, page, paddr, writable);

    Outcome::Resolved
}
