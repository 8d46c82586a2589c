//! The two-level page table walk.
//!
//! This module provides the `PageDirectory` type, which owns the root
//! (directory-level) table of an address space and implements the walk that
//! every translation query and mutation goes through.

use crate::{
    PhysicalAddress, VirtualAddress,
    address::AddressTranslator,
    paging::{self, PageEntry, PageFlags, PageTable},
};

#[cfg(not(any(test, feature = "software-emulation")))]
use alloc::boxed::Box;

/// Allocates a new page table.
///
/// In test/software-emulation mode, this allocates from the emulated memory
/// space. In production mode, this uses the standard heap allocator.
#[cfg(any(test, feature = "software-emulation"))]
fn alloc_page_table() -> *mut PageTable {
    let translator = AddressTranslator::current();
    let size = core::mem::size_of::<PageTable>();
    // Page tables must be page-aligned
    let align = paging::PAGE_SIZE;

    // Allocate from emulated memory
    let phys = translator
        .allocate(size, align)
        .expect("out of emulated memory");

    // Translate to virtual address
    let virt = translator.phys_to_virt(phys);

    // Initialize the page table in place
    unsafe {
        let ptr = virt as *mut PageTable;
        ptr.write(PageTable::new());
        ptr
    }
}

/// Allocates a new page table using the standard heap allocator.
#[cfg(not(any(test, feature = "software-emulation")))]
fn alloc_page_table() -> *mut PageTable {
    Box::into_raw(Box::new(PageTable::new()))
}

/// The translation structure of one address space.
///
/// Owns the page directory and provides the two-level walk over it. A read
/// walk distinguishes the two ways a virtual address can be unmapped:
/// `None` means the directory entry itself is absent (no page table covers
/// the 4 MiB span), while a returned entry with the present bit clear means
/// the table exists but the page does not.
pub struct PageDirectory {
    /// The root (directory-level) table for this address space.
    root: PageTable,
}

impl PageDirectory {
    /// Creates a new page directory with no mappings.
    pub fn new() -> Self {
        Self {
            root: PageTable::new(),
        }
    }

    /// Maps a virtual address to a physical address with the given flags.
    ///
    /// Walks the directory, allocating the page table if needed, and sets
    /// the table entry. The present bit is always set on the new entry.
    ///
    /// # Panics
    /// Panics if the virtual address or the physical address is not
    /// page-aligned.
    pub fn map(&mut self, virt: VirtualAddress, phys: PhysicalAddress, flags: PageFlags) {
        assert!(
            virt.is_aligned(paging::PAGE_SIZE),
            "virtual address must be page-aligned"
        );
        assert!(
            phys.is_aligned(paging::PAGE_SIZE),
            "physical address must be page-aligned"
        );

        let entry = self.walk_or_create(virt);
        let mut new_flags = flags;
        new_flags.set_present(true);
        *entry = PageEntry::new(phys, new_flags);
        log::trace!("mapped {} -> {}", virt, phys);
    }

    /// Unmaps a virtual address.
    ///
    /// Clears the table entry for the given virtual address and returns the
    /// physical address that was mapped, or None if the address was not
    /// mapped. The page table itself is left in place.
    ///
    /// # Panics
    /// Panics if the virtual address is not page-aligned.
    pub fn unmap(&mut self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        assert!(
            virt.is_aligned(paging::PAGE_SIZE),
            "virtual address must be page-aligned"
        );

        let entry = self.walk_mut(virt)?;
        let phys = entry.address()?;
        entry.clear();
        log::trace!("unmapped {}", virt);

        Some(phys)
    }

    /// Walks the directory to the table entry governing a virtual address.
    ///
    /// Returns None if the directory entry is absent. Never allocates.
    pub fn walk(&self, virt: VirtualAddress) -> Option<PageEntry> {
        let directory_entry = self.root.entry(paging::directory_index(virt.as_usize()));
        let table_phys = directory_entry.address()?;

        let translator = AddressTranslator::current();
        // SAFETY: We're trusting that the directory entry contains a valid
        // pointer to a page table. This holds as long as entries are only
        // created by walk_or_create.
        let table =
            unsafe { &*translator.phys_to_ptr::<PageTable>(table_phys.as_usize()) };

        Some(table.entry(paging::table_index(virt.as_usize())))
    }

    /// Like [`walk`](Self::walk), but returns a mutable reference to the
    /// live table entry.
    pub fn walk_mut(&mut self, virt: VirtualAddress) -> Option<&mut PageEntry> {
        let directory_entry = self.root.entry(paging::directory_index(virt.as_usize()));
        let table_phys = directory_entry.address()?;

        let translator = AddressTranslator::current();
        // SAFETY: Same reasoning as in walk.
        let table =
            unsafe { &mut *translator.phys_to_ptr::<PageTable>(table_phys.as_usize()) };

        Some(table.entry_mut(paging::table_index(virt.as_usize())))
    }

    /// Walks the directory, creating the page table if needed.
    ///
    /// Returns a mutable reference to the table entry for the given virtual
    /// address.
    fn walk_or_create(&mut self, virt: VirtualAddress) -> &mut PageEntry {
        let directory_entry = self.root.entry_mut(paging::directory_index(virt.as_usize()));

        if !directory_entry.is_present() {
            let new_table_ptr = alloc_page_table();

            let translator = AddressTranslator::current();
            let new_table_phys = PhysicalAddress::new(translator.ptr_to_phys(new_table_ptr));

            let mut flags = PageFlags::empty();
            flags.set_present(true);

            *directory_entry = PageEntry::new(new_table_phys, flags);
        }

        let table_phys = directory_entry
            .address()
            .expect("directory entry should be present");
        let translator = AddressTranslator::current();
        // SAFETY: The directory entry points to a page table we either just
        // created above or created on an earlier call.
        let table =
            unsafe { &mut *translator.phys_to_ptr::<PageTable>(table_phys.as_usize()) };

        table.entry_mut(paging::table_index(virt.as_usize()))
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() {
        AddressTranslator::set_current(AddressTranslator::emulated(256 * 1024));
    }

    fn present_flags() -> PageFlags {
        let mut flags = PageFlags::empty();
        flags.set_present(true);
        flags
    }

    #[test]
    fn map_then_walk() {
        setup();
        let mut dir = PageDirectory::new();

        let virt = VirtualAddress::new(0x1000);
        let phys = PhysicalAddress::new(0x5000);
        dir.map(virt, phys, present_flags());

        let entry = dir.walk(virt).expect("directory entry should exist");
        assert!(entry.is_present());
        assert_eq!(entry.address(), Some(phys));
    }

    #[test]
    fn walk_distinguishes_absence_levels() {
        setup();
        let mut dir = PageDirectory::new();

        dir.map(
            VirtualAddress::new(0x1000),
            PhysicalAddress::new(0x5000),
            present_flags(),
        );

        // Same directory entry, different page: table exists, entry empty.
        let neighbor = dir.walk(VirtualAddress::new(0x2000));
        assert!(matches!(neighbor, Some(entry) if !entry.is_present()));

        // Different directory entry: nothing there at all.
        assert!(dir.walk(VirtualAddress::new(paging::DIRECTORY_SPAN)).is_none());
    }

    #[test]
    fn unmap_mapped_page() {
        setup();
        let mut dir = PageDirectory::new();

        let virt = VirtualAddress::new(0x1000);
        let phys = PhysicalAddress::new(0x5000);
        dir.map(virt, phys, present_flags());

        assert_eq!(dir.unmap(virt), Some(phys));
        // The table survives, the entry is zero.
        assert!(matches!(dir.walk(virt), Some(entry) if entry.as_usize() == 0));
    }

    #[test]
    fn unmap_unmapped_page() {
        setup();
        let mut dir = PageDirectory::new();

        assert_eq!(dir.unmap(VirtualAddress::new(0x1000)), None);
    }

    #[test]
    fn map_pages_across_directories() {
        setup();
        let mut dir = PageDirectory::new();

        for i in 0..8usize {
            let virt = VirtualAddress::new(i * paging::DIRECTORY_SPAN + 0x3000);
            let phys = PhysicalAddress::new(0x0010_0000 + i * paging::PAGE_SIZE);
            dir.map(virt, phys, present_flags());
        }

        for i in 0..8usize {
            let virt = VirtualAddress::new(i * paging::DIRECTORY_SPAN + 0x3000);
            let entry = dir.walk(virt).expect("each directory should have a table");
            assert_eq!(
                entry.address(),
                Some(PhysicalAddress::new(0x0010_0000 + i * paging::PAGE_SIZE))
            );
        }
    }

    #[test]
    fn mutating_through_walk_mut_sticks() {
        setup();
        let mut dir = PageDirectory::new();

        let virt = VirtualAddress::new(0x1000);
        dir.map(virt, PhysicalAddress::new(0x5000), present_flags());

        let entry = dir.walk_mut(virt).expect("entry should exist");
        let mut flags = entry.flags();
        flags.set_writable(true);
        entry.set_flags(flags);

        let reread = dir.walk(virt).expect("entry should exist");
        assert!(reread.flags().is_writable());
        assert_eq!(reread.address(), Some(PhysicalAddress::new(0x5000)));
    }
}
