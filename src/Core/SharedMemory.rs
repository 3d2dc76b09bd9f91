// Shared memory backends the ABI can be laid over.
// Heap-backed regions for in-process use, /dev/shm + mmap on Linux for cross-process use.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt::Debug;
use std::io;
use std::ptr::NonNull;

/// Shared memory backend trait for the region underneath a SharedMemoryAbi
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Get a pointer to the mapped memory region
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the mapped region in bytes
    fn size(&self) -> usize;

    /// Get the underlying OS handle, if any
    fn raw_handle(&self) -> RawHandle;
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy)]
pub enum RawHandle {
    /// Unix file descriptor (Linux)
    Fd(i32),
    /// Process-private heap allocation, nothing to share
    Heap,
}

/// A zero-filled, aligned heap allocation.
///
/// Writers and the reader must live in the same process. Used for tests and
/// for in-process tracing where no other process needs the buffer.
#[derive(Debug)]
pub struct HeapSharedMemory {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for HeapSharedMemory {}
unsafe impl Sync for HeapSharedMemory {}

impl HeapSharedMemory {
    /// Allocate `size` zeroed bytes aligned to `align` (a power of two)
    pub fn new(size: usize, align: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "HeapSharedMemory::new(): size must be greater than zero",
            ));
        }
        let layout = Layout::from_size_align(size, align).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("HeapSharedMemory::new(): bad layout (size {size}, align {align}): {e}"),
            )
        })?;

        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("Failed to allocate {size} bytes"),
            )
        })?;

        Ok(Self { ptr, layout })
    }
}

impl Drop for HeapSharedMemory {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl SharedMemoryBackend for HeapSharedMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.layout.size()
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Heap
    }
}

#[cfg(target_os = "linux")]
pub use linux::LinuxSharedMemory;

#[cfg(target_os = "linux")]
mod linux {
    use super::{RawHandle, SharedMemoryBackend};
    use std::fs::{self, OpenOptions};
    use std::io;
    use std::os::fd::{AsRawFd, IntoRawFd};
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::PathBuf;
    use std::ptr::{self, NonNull};

    /// A region backed by a file in /dev/shm, mapped MAP_SHARED.
    ///
    /// The creating side owns the file and unlinks it on drop; processes that
    /// attached only unmap.
    #[derive(Debug)]
    pub struct LinuxSharedMemory {
        ptr: NonNull<u8>,
        size: usize,
        fd: i32,
        path: PathBuf,
        owner: bool,
    }

    unsafe impl Send for LinuxSharedMemory {}
    unsafe impl Sync for LinuxSharedMemory {}

    fn shm_path(name: &str) -> PathBuf {
        PathBuf::from(format!("/dev/shm/{name}"))
    }

    /// mmap always returns page aligned addresses, which is what the ABI needs.
    unsafe fn map_shared(fd: i32, size: usize) -> io::Result<NonNull<u8>> {
        let ptr = libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        );
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(ptr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
    }

    impl LinuxSharedMemory {
        /// Create (or truncate) /dev/shm/<name> with `size` zeroed bytes
        pub fn create(name: &str, size: usize) -> io::Result<Self> {
            let path = shm_path(name);

            // Create or truncate the file in /dev/shm
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&path)
                .map_err(|e| {
                    io::Error::new(
                        e.kind(),
                        format!("Failed to create shared memory file at {}: {}", path.display(), e),
                    )
                })?;

            // A truncated file reads back as zeros: every page starts unpartitioned
            file.set_len(size as u64)?;

            let ptr = unsafe { map_shared(file.as_raw_fd(), size)? };

            Ok(Self {
                ptr,
                size,
                fd: file.into_raw_fd(),
                path,
                owner: true,
            })
        }

        /// Attach to an existing /dev/shm/<name>, mapping its whole length
        pub fn attach(name: &str) -> io::Result<Self> {
            let path = shm_path(name);
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("Failed to open shared memory at {}: {}", path.display(), e),
                    )
                })?;

            let size = file.metadata()?.len() as usize;
            if size == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Shared memory at {} is empty", path.display()),
                ));
            }

            let ptr = unsafe { map_shared(file.as_raw_fd(), size)? };

            Ok(Self {
                ptr,
                size,
                fd: file.into_raw_fd(),
                path,
                owner: false,
            })
        }
    }

    impl Drop for LinuxSharedMemory {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
                libc::close(self.fd);
            }
            if self.owner {
                let _ = fs::remove_file(&self.path);
            }
        }
    }

    impl SharedMemoryBackend for LinuxSharedMemory {
        fn as_ptr(&self) -> *mut u8 {
            self.ptr.as_ptr()
        }

        fn size(&self) -> usize {
            self.size
        }

        fn raw_handle(&self) -> RawHandle {
            RawHandle::Fd(self.fd)
        }
    }
}
