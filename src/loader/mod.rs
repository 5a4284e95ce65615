//! Process image loading.

pub mod elf;
