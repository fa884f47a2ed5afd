use bankhammer_core::memory::{Memory, MemoryError};
use bankhammer_core::util::Size::{self, MB};
use lazy_static::lazy_static;
use libc::{MAP_POPULATE, MAP_SHARED, O_CREAT, O_RDWR};
use log::{info, warn};
use std::ffi::CString;
use std::fs::File;
use std::io::{self, Read};
// https://www.kernel.org/doc/Documentation/vm/hugetlbpage.txt
//
// The output of "cat /proc/meminfo" will include lines like:
// ...
// HugePages_Total: uuu
// HugePages_Free:  vvv
// Hugepagesize:    yyy kB

const MEMINFO_PATH: &str = "/proc/meminfo";
const TOKEN: &str = "Hugepagesize:";
const HUGEPAGE_FILE: &str = "/dev/hugepages/bankhammer_huge";

lazy_static! {
    static ref HUGEPAGE_SIZE: isize = {
        let buf = File::open(MEMINFO_PATH).map_or("".to_owned(), |mut f| {
            let mut s = String::new();
            let _ = f.read_to_string(&mut s);
            s
        });
        parse_hugepage_size(&buf)
    };
}

fn parse_hugepage_size(s: &str) -> isize {
    for line in s.lines() {
        let Some(rest) = line.strip_prefix(TOKEN) else {
            continue;
        };
        let mut parts = rest.split_whitespace();
        let mut hugepage_size = parts
            .next()
            .and_then(|p| p.parse::<isize>().ok())
            .unwrap_or(-1);
        hugepage_size *= parts.next().map_or(1, |x| match x {
            "kB" => 1024,
            _ => 1,
        });
        return hugepage_size;
    }
    -1
}

/// The default hugepage size reported by the kernel, if any.
pub fn hugepage_size() -> Option<Size> {
    usize::try_from(*HUGEPAGE_SIZE).ok().map(Size::B)
}

/// Allocates buffers inside a single 1 GiB hugepage.
///
/// The buffer is mapped from a file on the hugetlbfs mounted at `/dev/hugepages` and
/// zeroed before it is returned.
#[derive(Debug, Default, Copy, Clone)]
pub struct HugepageAllocator {}

impl HugepageAllocator {
    /// Maps one hugepage and returns its first `size` bytes.
    ///
    /// # Errors
    ///
    /// Fails if `size` is 0, if the system default hugepage is not 1 GiB, if `size` does
    /// not fit into it, or if the hugetlbfs file cannot be mapped.
    pub fn alloc(&self, size: Size) -> Result<Memory, MemoryError> {
        if size.bytes() == 0 {
            return Err(MemoryError::ZeroSizeLayout);
        }
        let hp_size = MB(1024).bytes();
        if hugepage_size().map(|s| s.bytes()) != Some(hp_size) {
            warn!("Hugepage size is {:?}, need 1 GB pages", hugepage_size());
            return Err(invalid_input("system hugepage size is not 1 GB").into());
        }
        if size.bytes() > hp_size {
            return Err(invalid_input("buffer does not fit into one hugepage").into());
        }
        let block = map_hugepage(hp_size)?;
        unsafe { std::ptr::write_bytes(block.ptr, 0x00, hp_size) };
        info!("Allocated {} in a 1 GB hugepage at {:p}", size, block.ptr);
        Ok(Memory::new(block.ptr, size.bytes()))
    }
}

fn invalid_input(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

fn map_hugepage(hp_size: usize) -> Result<Memory, MemoryError> {
    const ADDR: usize = 0x2000000000;
    let path = CString::new(HUGEPAGE_FILE).map_err(|e| invalid_input(&e.to_string()))?;
    let fd = unsafe { libc::open(path.as_ptr(), O_RDWR | O_CREAT, 0o666) };
    if fd == -1 {
        return Err(io::Error::last_os_error().into());
    }
    let p = unsafe {
        libc::mmap(
            ADDR as *mut libc::c_void,
            hp_size,
            libc::PROT_READ | libc::PROT_WRITE,
            MAP_SHARED | MAP_POPULATE,
            fd,
            0,
        )
    };
    unsafe { libc::close(fd) };
    if p == libc::MAP_FAILED {
        return Err(io::Error::last_os_error().into());
    }
    Ok(Memory::new(p as *mut u8, hp_size))
}
