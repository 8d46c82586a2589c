//! Address space management.
//!
//! An address space is passed explicitly to every operation that reads or
//! edits translations, rather than living in an ambient global; tests build
//! isolated address spaces against emulated memory the same way the kernel
//! builds the real one.

use crate::page_directory::PageDirectory;
use crate::paging::{PageEntry, PageFlags};
use crate::{PhysicalAddress, VirtualAddress};

/// A virtual address space backed by a page directory.
///
/// Address spaces can belong to the kernel, user processes, or other
/// contexts; the monitor inspects whichever one it is handed.
pub struct AddressSpace {
    /// The translation structure for this address space.
    directory: PageDirectory,
}

impl AddressSpace {
    /// Creates a new address space with no mappings.
    pub fn new() -> Self {
        Self {
            directory: PageDirectory::new(),
        }
    }

    /// Returns a reference to the page directory for this address space.
    pub fn directory(&self) -> &PageDirectory {
        &self.directory
    }

    /// Returns a mutable reference to the page directory for this address space.
    pub fn directory_mut(&mut self) -> &mut PageDirectory {
        &mut self.directory
    }

    /// Walks to the table entry governing `virt`. See [`PageDirectory::walk`].
    pub fn walk(&self, virt: VirtualAddress) -> Option<PageEntry> {
        self.directory.walk(virt)
    }

    /// Walks to the live table entry governing `virt`.
    /// See [`PageDirectory::walk_mut`].
    pub fn walk_mut(&mut self, virt: VirtualAddress) -> Option<&mut PageEntry> {
        self.directory.walk_mut(virt)
    }

    /// Maps a page. See [`PageDirectory::map`].
    pub fn map(&mut self, virt: VirtualAddress, phys: PhysicalAddress, flags: PageFlags) {
        self.directory.map(virt, phys, flags);
    }

    /// Unmaps a page. See [`PageDirectory::unmap`].
    pub fn unmap(&mut self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        self.directory.unmap(virt)
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}
