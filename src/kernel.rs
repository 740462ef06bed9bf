use std::{io, ptr::NonNull, slice, sync::OnceLock};

use log::debug;

use crate::{arena::PageSupplier, error::HeapError, utils::align};

/// Virtual memory page size of the computer. This is usually 4096.
/// It can't be a constant since we don't know the value at compile time.
static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// Marker type for the platform-dependant memory operations.
struct Kernel;

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. As the allocator, our top level view of this, has nothing
/// to do with the concrete implementations / APIs offered by each kernel.
trait PlatformMemory {
    /// Request a memory region of size `len`. It returns a Pointer to the
    /// given location or None if the underlying syscall fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the kernel.
    unsafe fn return_memory(addr: *mut u8, len: usize);

    /// Returns the virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;
}

/// Wrapper to calculate the computer's page size only once.
#[inline]
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| unsafe { Kernel::page_size() })
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                match addr {
                    libc::MAP_FAILED => None,
                    addr => NonNull::new(addr.cast::<u8>()),
                }
            }
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) {
            unsafe {
                munmap(addr as *mut c_void, len as size_t);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use super::{Kernel, PlatformMemory};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: *mut u8, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}

/// Page supplier backed by memory obtained straight from the kernel.
///
/// The whole `max_size` is reserved up front (rounded to the page size), so
/// the base address never changes and pointers derived from it stay valid for
/// the supplier's lifetime. Growing only moves the break inside that mapping;
/// the kernel commits pages lazily as they are first touched.
///
/// ```text
/// base                   brk                          base + reserved
///  +----------------------+-------------------------------+
///  |     heap (in use)    |      reserved, untouched      |
///  +----------------------+-------------------------------+
/// ```
pub struct MmapSupplier {
    base: NonNull<u8>,
    reserved: usize,
    brk: usize,
    max_size: usize,
}

// The mapping is owned exclusively by this value.
unsafe impl Send for MmapSupplier {}

impl MmapSupplier {
    /// Reserves `max_size` bytes of address space.
    pub fn new(max_size: usize) -> Result<Self, HeapError> {
        let reserved = align(max_size.max(1), page_size());

        // SAFETY: a fresh anonymous mapping has no aliasing requirements.
        let base = unsafe { Kernel::request_memory(reserved) }.ok_or_else(|| {
            HeapError::Reserve {
                size: reserved,
                source: io::Error::last_os_error(),
            }
        })?;

        debug!("reserved {reserved} bytes of address space at {base:p}");

        Ok(Self {
            base,
            reserved,
            brk: 0,
            max_size,
        })
    }

    /// Address of offset `0`. Useful to turn offsets into real addresses.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }
}

impl PageSupplier for MmapSupplier {
    fn sbrk(&mut self, incr: usize) -> Result<usize, HeapError> {
        let available = self.max_size - self.brk;

        if incr > available {
            return Err(HeapError::Exhausted {
                requested: incr,
                available,
            });
        }

        let old_brk = self.brk;
        self.brk += incr;

        Ok(old_brk)
    }

    fn len(&self) -> usize {
        self.brk
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: `brk <= reserved` and anonymous mappings are zero filled.
        unsafe { slice::from_raw_parts(self.base.as_ptr(), self.brk) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: same as `bytes`, `&mut self` guarantees exclusivity.
        unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.brk) }
    }
}

impl Drop for MmapSupplier {
    fn drop(&mut self) {
        unsafe { Kernel::return_memory(self.base.as_ptr(), self.reserved) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        assert!(page_size().is_power_of_two());
    }

    #[test]
    fn mmap_supplier_keeps_base_while_growing() {
        let mut supplier = MmapSupplier::new(1 << 16).unwrap();
        let base = supplier.base();

        assert_eq!(base.as_ptr() as usize % page_size(), 0);
        assert_eq!(supplier.sbrk(4096).unwrap(), 0);
        supplier.bytes_mut()[4095] = 7;
        assert_eq!(supplier.sbrk(4096).unwrap(), 4096);

        assert_eq!(supplier.base(), base);
        assert_eq!(supplier.bytes()[4095], 7);
        assert_eq!(supplier.bytes()[4096], 0);
    }

    #[test]
    fn mmap_supplier_refuses_past_max() {
        let mut supplier = MmapSupplier::new(8192).unwrap();
        supplier.sbrk(8000).unwrap();

        assert!(matches!(
            supplier.sbrk(200),
            Err(HeapError::Exhausted { requested: 200, available: 192 })
        ));
    }
}
