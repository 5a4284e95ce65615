//! Supplemental page table: per-process record of what
//! backs each user virtual page, consulted by the page-fault handler to
//! decide how to satisfy a fault. Grounded on
//! `original_source/src/vm/page.h`/`.c`, whose hash table keyed on
//! `vaddr` becomes a `BTreeMap` keyed on the same value.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use spin::Mutex;

use crate::fs::fd::File;

pub const PAGE_SIZE: u64 = 4096;

/// What a page's contents come from when it isn't currently resident.
pub enum Backing {
    /// Backed by a region of an open file (the executable's own segments;
    /// this build loads no other file-backed mappings).
    File {
        file: Arc<Mutex<File>>,
        offset: u64,
        read_bytes: u32,
        zero_bytes: u32,
    },
    /// Backed by a slot in the swap area.
    Swap { slot: usize },
    /// Pure zero-fill, never yet written to disk.
    Zero,
}

/// Which segment a page belongs to, carried through for statistics and
/// for deciding eviction write-back behavior (only `File`-backed,
/// writable segments need a dirty write-back path; `Code` is always
/// read-only and reloads from the binary instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    Data,
    Stack,
}

/// A single supplemental page table entry: everything needed to bring a
/// page back into memory, plus whether it currently is.
pub struct Spte {
    pub vaddr: u64,
    pub writable: bool,
    pub segment: SegmentKind,
    pub backing: Backing,
    /// Set while the page is resident, to the frame table index backing it.
    pub frame: Option<usize>,
}

/// Per-process supplemental page table, keyed by page-aligned user
/// virtual address.
pub struct SupplementalPageTable {
    entries: BTreeMap<u64, Spte>,
}

impl SupplementalPageTable {
    pub fn new() -> Self {
        SupplementalPageTable {
            entries: BTreeMap::new(),
        }
    }

    /// Registers a page backed by `file` at `offset`, with `read_bytes`
    /// copied from the file and the remainder of the page zero-filled.
    /// `read_bytes + zero_bytes` must equal [`PAGE_SIZE`] and `upage`
    /// must be page-aligned; both are caller invariants from the loader.
    pub fn insert_file_backed(
        &mut self,
        upage: u64,
        file: Arc<Mutex<File>>,
        offset: u64,
        read_bytes: u32,
        zero_bytes: u32,
        writable: bool,
        segment: SegmentKind,
    ) -> bool {
        debug_assert_eq!(upage % PAGE_SIZE, 0);
        debug_assert_eq!(read_bytes as u64 + zero_bytes as u64, PAGE_SIZE);
        self.insert(
            upage,
            Spte {
                vaddr: upage,
                writable,
                segment,
                backing: Backing::File {
                    file,
                    offset,
                    read_bytes,
                    zero_bytes,
                },
                frame: None,
            },
        )
    }

    /// Registers an all-zero page (the common case for stack growth and
    /// BSS), not yet backed by anything until first touched.
    pub fn insert_zero(&mut self, upage: u64, writable: bool, segment: SegmentKind) -> bool {
        debug_assert_eq!(upage % PAGE_SIZE, 0);
        self.insert(
            upage,
            Spte {
                vaddr: upage,
                writable,
                segment,
                backing: Backing::Zero,
                frame: None,
            },
        )
    }

    fn insert(&mut self, upage: u64, spte: Spte) -> bool {
        if self.entries.contains_key(&upage) {
            false
        } else {
            self.entries.insert(upage, spte);
            true
        }
    }

    pub fn lookup(&self, upage: u64) -> Option<&Spte> {
        self.entries.get(&(upage & !(PAGE_SIZE - 1)))
    }

    pub fn lookup_mut(&mut self, upage: u64) -> Option<&mut Spte> {
        self.entries.get_mut(&(upage & !(PAGE_SIZE - 1)))
    }

    pub fn remove(&mut self, upage: u64) -> Option<Spte> {
        self.entries.remove(&upage)
    }

    /// Marks `upage` as swapped out to `slot`, dropping whatever backing
    /// it previously had (a page is only ever resident in exactly one
    /// place at a time).
    pub fn mark_swapped_out(&mut self, upage: u64, slot: usize) {
        if let Some(spte) = self.lookup_mut(upage) {
            spte.backing = Backing::Swap { slot };
            spte.frame = None;
        }
    }

    /// Marks `upage` as resident in `frame`.
    pub fn mark_resident(&mut self, upage: u64, frame: usize) {
        if let Some(spte) = self.lookup_mut(upage) {
            spte.frame = Some(frame);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &Spte)> {
        self.entries.iter()
    }
}

impl Default for SupplementalPageTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut spt = SupplementalPageTable::new();
        assert!(spt.insert_zero(0x1000, true, SegmentKind::Stack));
        assert!(!spt.insert_zero(0x1000, true, SegmentKind::Stack));
    }

    #[test]
    fn lookup_masks_to_page_boundary() {
        let mut spt = SupplementalPageTable::new();
        spt.insert_zero(0x2000, true, SegmentKind::Data);
        assert!(spt.lookup(0x2123).is_some());
        assert!(spt.lookup(0x3000).is_none());
    }

    #[test]
    fn mark_swapped_out_clears_residency() {
        let mut spt = SupplementalPageTable::new();
        spt.insert_zero(0x4000, true, SegmentKind::Stack);
        spt.mark_resident(0x4000, 7);
        assert_eq!(spt.lookup(0x4000).unwrap().frame, Some(7));
        spt.mark_swapped_out(0x4000, 3);
        let entry = spt.lookup(0x4000).unwrap();
        assert!(entry.frame.is_none());
        assert!(matches!(entry.backing, Backing::Swap { slot: 3 }));
    }
}
