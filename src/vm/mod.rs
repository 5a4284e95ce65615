//! Virtual memory subsystem: demand paging over a
//! supplemental page table, a clock-replacement frame table, and a
//! block-device-backed swap area.

pub mod clist;
pub mod clock;
pub mod fault;
pub mod frame;
pub mod page;
pub mod swap;

pub fn init(swap_sector_count: u64) {
    swap::SWAP_TABLE.lock().init(swap_sector_count);
    crate::log_info!("Virtual memory subsystem initialized (demand paging, clock eviction).");
}
