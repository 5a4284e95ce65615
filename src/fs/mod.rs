pub mod vfs;
pub mod inode;
pub mod dentry;
pub mod mount;
pub mod error;
pub mod pipe;
pub mod fd;
pub mod ramfs;

use spin::Mutex;
use lazy_static::lazy_static;
use vfs::Vfs;

lazy_static! {
    pub static ref VFS: Mutex<Vfs> = Mutex::new(Vfs::new());
}

/// Initializes the VFS with a RAM-backed root, enough for the loader to
/// read ELF executables and for processes to open regular files. A real
/// on-disk filesystem is out of scope; the swap area bypasses the VFS
/// entirely and talks to its block device directly (`crate::vm::swap`).
pub fn init() {
    let mut vfs = VFS.lock();
    let ramfs: &'static ramfs::RamFs = &ramfs::RAMFS_INSTANCE;
    vfs.mount("/", ramfs);
    drop(vfs);

    seed_default_files();
    crate::log_info!("VFS initialized: ramfs at /.");
}

fn seed_default_files() {
    let mut vfs = VFS.lock();
    let _ = vfs.mkdir("/bin");
    let _ = vfs.create("/etc_hostname");
    let _ = vfs.write_file("/etc_hostname", 0, b"kestrel\n");
}
