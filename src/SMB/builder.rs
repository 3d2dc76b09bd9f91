use super::region::SharedRegion;
use crate::error::{AbiError, Result};
use crate::Core::SharedMemory::{HeapSharedMemory, SharedMemoryBackend};
use crate::ABI::layout::{is_valid_page_size, MIN_PAGE_SIZE};

pub struct RegionBuilder {
    page_size: usize,
    num_pages: usize,
    name: Option<String>,
}

impl Default for RegionBuilder {
    fn default() -> Self {
        Self {
            page_size: 4096,
            num_pages: 64, // 256KB with the default page size
            name: None,
        }
    }
}

impl RegionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_num_pages(mut self, num_pages: usize) -> Self {
        self.num_pages = num_pages;
        self
    }

    /// Back the region with /dev/shm/<name> so other processes can attach
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn region_size(&self) -> usize {
        self.page_size.saturating_mul(self.num_pages)
    }

    fn validate(&self) -> Result<()> {
        if !is_valid_page_size(self.page_size) {
            return Err(AbiError::InvalidPageSize {
                page_size: self.page_size,
            });
        }
        if self.num_pages == 0 || self.num_pages.checked_mul(self.page_size).is_none() {
            return Err(AbiError::InvalidRegionSize {
                size: self.region_size(),
                page_size: self.page_size,
            });
        }
        Ok(())
    }

    /// Create a new, zeroed region. Heap-backed unless a name was given.
    pub fn build(self) -> Result<SharedRegion> {
        self.validate()?;
        let size = self.region_size();

        let backend: Box<dyn SharedMemoryBackend> = match &self.name {
            None => Box::new(
                HeapSharedMemory::new(size, MIN_PAGE_SIZE)
                    .map_err(|e| AbiError::from_io(e, "allocating heap region"))?,
            ),
            Some(name) => create_named(name, size)?,
        };

        tracing::info!(
            name = self.name.as_deref().unwrap_or("<heap>"),
            size,
            page_size = self.page_size,
            "created shared memory buffer"
        );
        SharedRegion::new(backend, self.page_size)
    }

    /// Attach to a region another process created with the same name and
    /// page size. The page count is taken from the existing region.
    pub fn attach(self) -> Result<SharedRegion> {
        if !is_valid_page_size(self.page_size) {
            return Err(AbiError::InvalidPageSize {
                page_size: self.page_size,
            });
        }
        let name = self.name.as_deref().ok_or(AbiError::MissingName)?;
        let backend = attach_named(name)?;

        tracing::info!(name, size = backend.size(), page_size = self.page_size, "attached to shared memory buffer");
        SharedRegion::new(backend, self.page_size)
    }
}

#[cfg(target_os = "linux")]
fn create_named(name: &str, size: usize) -> Result<Box<dyn SharedMemoryBackend>> {
    let shm = crate::Core::SharedMemory::LinuxSharedMemory::create(name, size)
        .map_err(|e| AbiError::from_io(e, format!("creating shared memory {name} ({size} bytes)")))?;
    Ok(Box::new(shm))
}

#[cfg(target_os = "linux")]
fn attach_named(name: &str) -> Result<Box<dyn SharedMemoryBackend>> {
    let shm = crate::Core::SharedMemory::LinuxSharedMemory::attach(name)
        .map_err(|e| AbiError::from_io(e, format!("attaching to shared memory {name}")))?;
    Ok(Box::new(shm))
}

#[cfg(not(target_os = "linux"))]
fn create_named(_name: &str, _size: usize) -> Result<Box<dyn SharedMemoryBackend>> {
    Err(AbiError::from_io(
        std::io::Error::new(std::io::ErrorKind::Unsupported, "Named shared memory only supported on Linux"),
        "creating shared memory",
    ))
}

#[cfg(not(target_os = "linux"))]
fn attach_named(_name: &str) -> Result<Box<dyn SharedMemoryBackend>> {
    Err(AbiError::from_io(
        std::io::Error::new(std::io::ErrorKind::Unsupported, "Named shared memory only supported on Linux"),
        "attaching to shared memory",
    ))
}
