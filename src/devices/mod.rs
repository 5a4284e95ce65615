//! Device-facing collaborators for the scheduler/VM core: the timer
//! lives here; block storage for swap lives under
//! `crate::drivers::ata`.

pub mod timer;
