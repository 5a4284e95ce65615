//! ELF64 loader.
//! Parses just enough of the format to find `PT_LOAD` segments, then
//! builds a process thread whose supplemental page table demand-pages
//! each segment from the executable file instead of copying it in
//! eagerly — grounded on `original_source/src/userprog/process.c`'s
//! `load`/`setup_stack`, reworked onto `vm::page::SupplementalPageTable`.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;

use crate::fs::fd::File;
use crate::vm::page::{SegmentKind, SupplementalPageTable};

// ══════════════════════════════════════════════════════════════
//  ELF64 constants
// ══════════════════════════════════════════════════════════════

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_X86_64: u16 = 62;
const PT_LOAD: u32 = 1;
const PF_X: u32 = 1;
const PF_W: u32 = 2;

const PAGE_SIZE: u64 = crate::vm::page::PAGE_SIZE;

// ══════════════════════════════════════════════════════════════
//  ELF64 structures
// ══════════════════════════════════════════════════════════════

struct Elf64Ehdr {
    e_entry: u64,
    e_phoff: u64,
    e_phentsize: u16,
    e_phnum: u16,
}

impl Elf64Ehdr {
    fn parse(data: &[u8]) -> Result<Self, ExecError> {
        if data.len() < 64 {
            return Err(ExecError::InvalidFormat);
        }
        if data[0..4] != ELF_MAGIC {
            return Err(ExecError::InvalidFormat);
        }
        if data[4] != ELFCLASS64 {
            return Err(ExecError::UnsupportedArch);
        }
        if data[5] != ELFDATA2LSB {
            return Err(ExecError::UnsupportedArch);
        }

        let e_type = u16::from_le_bytes([data[16], data[17]]);
        let e_machine = u16::from_le_bytes([data[18], data[19]]);
        if e_type != ET_EXEC {
            return Err(ExecError::UnsupportedType);
        }
        if e_machine != EM_X86_64 {
            return Err(ExecError::UnsupportedArch);
        }

        Ok(Elf64Ehdr {
            e_entry: u64::from_le_bytes(data[24..32].try_into().unwrap()),
            e_phoff: u64::from_le_bytes(data[32..40].try_into().unwrap()),
            e_phentsize: u16::from_le_bytes([data[54], data[55]]),
            e_phnum: u16::from_le_bytes([data[56], data[57]]),
        })
    }
}

struct Elf64Phdr {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_filesz: u64,
    p_memsz: u64,
}

impl Elf64Phdr {
    fn parse(data: &[u8]) -> Result<Self, ExecError> {
        if data.len() < 56 {
            return Err(ExecError::InvalidFormat);
        }
        Ok(Elf64Phdr {
            p_type: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            p_flags: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            p_offset: u64::from_le_bytes(data[8..16].try_into().unwrap()),
            p_vaddr: u64::from_le_bytes(data[16..24].try_into().unwrap()),
            p_filesz: u64::from_le_bytes(data[32..40].try_into().unwrap()),
            p_memsz: u64::from_le_bytes(data[40..48].try_into().unwrap()),
        })
    }
}

// ══════════════════════════════════════════════════════════════
//  ExecError
// ══════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum ExecError {
    FileNotFound,
    InvalidFormat,
    UnsupportedArch,
    UnsupportedType,
    MemoryError,
    ReadError,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecError::FileNotFound => write!(f, "File not found"),
            ExecError::InvalidFormat => write!(f, "Invalid ELF format"),
            ExecError::UnsupportedArch => write!(f, "Unsupported architecture"),
            ExecError::UnsupportedType => write!(f, "Unsupported ELF type (need ET_EXEC)"),
            ExecError::MemoryError => write!(f, "Memory allocation error"),
            ExecError::ReadError => write!(f, "File read error"),
        }
    }
}

// ══════════════════════════════════════════════════════════════
//  User-mode task info — stored globally so the trampoline can access it
// ══════════════════════════════════════════════════════════════

/// Info needed by the usermode trampoline, handed off one task at a
/// time: the trampoline reads it back out as the very first thing it
/// does on its own freshly allocated kernel stack.
struct UserTaskInfo {
    entry: u64,
    user_stack_top: u64,
}

static PENDING_USER_TASK: Mutex<Option<UserTaskInfo>> = Mutex::new(None);

/// Runs as a freshly spawned process thread, then drops to Ring 3. Never
/// returns: `jump_to_usermode` only comes back via a later page fault or
/// syscall trap, not a normal `ret`.
extern "C" fn usermode_trampoline() -> ! {
    let info = {
        let mut pending = PENDING_USER_TASK.lock();
        pending.take().expect("no pending user task info")
    };

    let user_cs = crate::interrupts::gdt::user_code_selector().0;
    let user_ss = crate::interrupts::gdt::user_data_selector().0;

    crate::log_info!(
        "ELF: jumping to Ring 3 — entry={:#x} stack={:#x} cs={:#x} ss={:#x}",
        info.entry,
        info.user_stack_top,
        user_cs,
        user_ss
    );

    crate::interrupts::usermode::jump_to_usermode(info.entry, info.user_stack_top, user_cs, user_ss);
}

// ══════════════════════════════════════════════════════════════
//  ELF Loader
// ══════════════════════════════════════════════════════════════

/// Loads an ELF64 executable and spawns a Ring 3 process thread for it.
/// Segments are not copied into memory here; each `PT_LOAD` segment
/// becomes a run of file-backed supplemental page table entries that
/// `vm::fault::handle` populates lazily on first touch, and the user
/// stack's top page is inserted as a single zero-backed entry so the
/// first push after entry takes a fault too.
pub fn load(path: &str) -> Result<u64, ExecError> {
    let file_data = read_file_all(path)?;
    let ehdr = Elf64Ehdr::parse(&file_data)?;

    crate::log_info!(
        "ELF: entry={:#x} phoff={} phnum={}",
        ehdr.e_entry,
        ehdr.e_phoff,
        ehdr.e_phnum
    );

    let file_handle = File::new_regular(path, true, false);
    let mut spt = SupplementalPageTable::new();
    let mut load_end: u64 = 0;

    for i in 0..ehdr.e_phnum as usize {
        let off = ehdr.e_phoff as usize + i * ehdr.e_phentsize as usize;
        let phdr = Elf64Phdr::parse(&file_data[off..])?;
        if phdr.p_type != PT_LOAD {
            continue;
        }

        let writable = phdr.p_flags & PF_W != 0;
        let kind = if phdr.p_flags & PF_X != 0 {
            SegmentKind::Code
        } else {
            SegmentKind::Data
        };

        let seg_start = phdr.p_vaddr & !(PAGE_SIZE - 1);
        let seg_end = (phdr.p_vaddr + phdr.p_memsz + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        if seg_end > load_end {
            load_end = seg_end;
        }

        let mut page = seg_start;
        while page < seg_end {
            let page_off_in_segment = page.saturating_sub(phdr.p_vaddr);
            let file_off = phdr.p_offset + page_off_in_segment;
            let bytes_left_in_file = phdr.p_filesz.saturating_sub(page_off_in_segment);
            let read_bytes = bytes_left_in_file.min(PAGE_SIZE) as u32;
            let zero_bytes = (PAGE_SIZE as u32).saturating_sub(read_bytes);

            let inserted = if read_bytes > 0 {
                spt.insert_file_backed(page, file_handle.clone(), file_off, read_bytes, zero_bytes, writable, kind)
            } else {
                spt.insert_zero(page, writable, kind)
            };
            if !inserted {
                return Err(ExecError::MemoryError);
            }
            page += PAGE_SIZE;
        }
    }

    if load_end == 0 {
        return Err(ExecError::InvalidFormat);
    }

    let user_stack_top = crate::memory::paging::user_stack_top();
    let top_stack_page = (user_stack_top - 1) & !(PAGE_SIZE - 1);
    if !spt.insert_zero(top_stack_page, true, SegmentKind::Stack) {
        return Err(ExecError::MemoryError);
    }

    let real_entry = ehdr.e_entry;
    crate::log_info!(
        "ELF: spt built through {:#x}, entry={:#x} stack_top={:#x}",
        load_end,
        real_entry,
        user_stack_top
    );

    {
        let mut pending = PENDING_USER_TASK.lock();
        *pending = Some(UserTaskInfo {
            entry: real_entry,
            user_stack_top,
        });
    }

    let page_table = unsafe { crate::memory::paging::create_new_page_table() };

    let process = crate::scheduler::thread::ProcessState {
        page_table,
        exit_wait: Arc::new(crate::sync::semaphore::Semaphore::new(0)),
        fd_table: vec![Some(File::new_console())],
        binary: Some(String::from(path)),
        spt,
        user_allocations: Vec::new(),
        parent: Some(crate::scheduler::current_thread_id()),
        children: Vec::new(),
    };

    let task_name = extract_filename(path);
    let tid = crate::scheduler::spawn_process_thread(
        &task_name,
        usermode_trampoline,
        crate::scheduler::thread::PRI_DEFAULT,
        process,
    );

    crate::log_info!("ELF: spawned process '{}' (tid {})", task_name, tid.0);
    Ok(tid.0)
}

fn read_file_all(path: &str) -> Result<Vec<u8>, ExecError> {
    let vfs = crate::fs::VFS.lock();
    let inode = vfs.lookup(path).map_err(|_| ExecError::FileNotFound)?;
    if inode.size == 0 {
        return Err(ExecError::InvalidFormat);
    }
    let mut buf = vec![0u8; inode.size];
    let bytes_read = vfs.read_file(path, 0, &mut buf).map_err(|_| ExecError::ReadError)?;
    buf.truncate(bytes_read);
    Ok(buf)
}

fn extract_filename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).into()
}
