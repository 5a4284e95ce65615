//! Swap area: free-slot bookkeeping over a block device,
//! grounded on `original_source/src/vm/swap.c`. The original keeps two
//! separate locks — one for the slot bitmap, one for the device itself —
//! so that scanning for a free slot never blocks an in-flight read or
//! write; this keeps the same split.

use alloc::vec::Vec;
use lazy_static::lazy_static;
use spin::Mutex;

use super::page::PAGE_SIZE;
use crate::drivers::ata::pio::AtaDevice;

const SECTOR_SIZE: u64 = 512;
const SECTORS_PER_SLOT: u64 = PAGE_SIZE / SECTOR_SIZE;

#[derive(Debug)]
pub enum SwapError {
    SwapFull,
    Io,
}

/// A flat bitset over swap slots, one bit per [`PAGE_SIZE`]-sized slot.
struct SlotBitmap {
    words: Vec<u64>,
    slot_count: usize,
}

impl SlotBitmap {
    fn new(slot_count: usize) -> Self {
        SlotBitmap {
            words: alloc::vec![0u64; (slot_count + 63) / 64],
            slot_count,
        }
    }

    fn test(&self, slot: usize) -> bool {
        self.words[slot / 64] & (1 << (slot % 64)) != 0
    }

    fn set(&mut self, slot: usize) {
        self.words[slot / 64] |= 1 << (slot % 64);
    }

    fn clear(&mut self, slot: usize) {
        self.words[slot / 64] &= !(1 << (slot % 64));
    }

    /// First unset bit, scanning low to high. `None` if every slot is in use.
    fn scan_and_flip(&mut self) -> Option<usize> {
        for slot in 0..self.slot_count {
            if !self.test(slot) {
                self.set(slot);
                return Some(slot);
            }
        }
        None
    }
}

pub struct SwapTable {
    bitmap: Mutex<SlotBitmap>,
    device: Mutex<AtaDevice>,
}

lazy_static! {
    pub static ref SWAP_TABLE: Mutex<SwapTable> = Mutex::new(SwapTable::uninitialized());
}

impl SwapTable {
    fn uninitialized() -> Self {
        SwapTable {
            bitmap: Mutex::new(SlotBitmap::new(0)),
            device: Mutex::new(AtaDevice::new(0x170, 0x376, true)),
        }
    }

    /// Probes the secondary ATA device and sizes the slot bitmap to the
    /// number of whole [`PAGE_SIZE`] slots it holds. Must run once,
    /// before the first fault that might need to evict a page.
    pub fn init(&self, sector_count: u64) {
        let mut device = self.device.lock();
        let _ = device.identify();
        let slot_count = (sector_count / SECTORS_PER_SLOT) as usize;
        *self.bitmap.lock() = SlotBitmap::new(slot_count);
    }

    pub fn alloc_slot(&self) -> Result<usize, SwapError> {
        self.bitmap.lock().scan_and_flip().ok_or(SwapError::SwapFull)
    }

    pub fn free_slot(&self, slot: usize) {
        let mut bitmap = self.bitmap.lock();
        debug_assert!(bitmap.test(slot), "freeing an already-free swap slot");
        bitmap.clear(slot);
    }

    fn store_at(&self, slot: usize, page: &[u8]) -> Result<(), SwapError> {
        debug_assert_eq!(page.len() as u64, PAGE_SIZE);
        let device = self.device.lock();
        let base_lba = slot as u32 * SECTORS_PER_SLOT as u32;
        for i in 0..SECTORS_PER_SLOT as usize {
            let mut sector = [0u8; 512];
            sector.copy_from_slice(&page[i * 512..(i + 1) * 512]);
            device
                .write_sector(base_lba + i as u32, &sector)
                .map_err(|_| SwapError::Io)?;
        }
        Ok(())
    }

    fn load_at(&self, slot: usize, page: &mut [u8]) -> Result<(), SwapError> {
        debug_assert_eq!(page.len() as u64, PAGE_SIZE);
        let device = self.device.lock();
        let base_lba = slot as u32 * SECTORS_PER_SLOT as u32;
        for i in 0..SECTORS_PER_SLOT as usize {
            let mut sector = [0u8; 512];
            device
                .read_sector(base_lba + i as u32, &mut sector)
                .map_err(|_| SwapError::Io)?;
            page[i * 512..(i + 1) * 512].copy_from_slice(&sector);
        }
        Ok(())
    }
}

/// Writes the frame at `paddr` (one full page) out to swap slot `slot`.
pub fn store(slot: usize, paddr: x86_64::PhysAddr) {
    let ptr = crate::memory::paging::phys_to_virt(paddr).as_ptr::<u8>();
    let page = unsafe { core::slice::from_raw_parts(ptr, PAGE_SIZE as usize) };
    let _ = SWAP_TABLE.lock().store_at(slot, page);
}

/// Reads swap slot `slot` back into the frame at `paddr`.
pub fn load(slot: usize, paddr: x86_64::PhysAddr) {
    let ptr = crate::memory::paging::phys_to_virt(paddr).as_mut_ptr::<u8>();
    let page = unsafe { core::slice::from_raw_parts_mut(ptr, PAGE_SIZE as usize) };
    let _ = SWAP_TABLE.lock().load_at(slot, page);
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    #[test]
    fn scan_and_flip_returns_lowest_free_slot() {
        let mut bitmap = SlotBitmap::new(8);
        assert_eq!(bitmap.scan_and_flip(), Some(0));
        assert_eq!(bitmap.scan_and_flip(), Some(1));
        bitmap.clear(0);
        assert_eq!(bitmap.scan_and_flip(), Some(0));
    }

    #[test]
    fn scan_and_flip_fails_when_full() {
        let mut bitmap = SlotBitmap::new(2);
        bitmap.scan_and_flip();
        bitmap.scan_and_flip();
        assert!(bitmap.scan_and_flip().is_none());
    }

    #[test]
    fn bitmap_spans_multiple_words() {
        let mut bitmap = SlotBitmap::new(130);
        for expected in 0..130 {
            assert_eq!(bitmap.scan_and_flip(), Some(expected));
        }
        assert!(bitmap.scan_and_flip().is_none());
    }
}
