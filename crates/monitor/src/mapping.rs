//! Translation lookups and permission edits.
//!
//! `lookup` is the single-entry query the other monitor components build on;
//! `show_mapping` walks a page range with it; `set_permissions` is the only
//! operation in the monitor that mutates the inspected address space.

use core::fmt;

use avm::{AddressSpace, PageFlags, PageNumber, PhysicalAddress, VirtualAddress, paging};

/// The translation of one page-sized unit of virtual address space.
///
/// Produced fresh on every lookup; never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// Base of the physical page backing this virtual page.
    pub physical_base: PhysicalAddress,
    /// Whether the mapping is writable.
    pub writable: bool,
    /// Whether the mapping is accessible from user mode.
    pub user_accessible: bool,
}

/// Resolves the translation entry governing `virt`.
///
/// An absent directory entry and an absent table entry are both reported as
/// `None`; callers that only care about presence and permission bits cannot
/// tell them apart. Read-only: the walk never allocates.
pub fn lookup(space: &AddressSpace, virt: VirtualAddress) -> Option<Mapping> {
    let entry = space.walk(virt)?;
    let physical_base = entry.address()?;
    let flags = entry.flags();

    Some(Mapping {
        physical_base,
        writable: flags.is_writable(),
        user_accessible: flags.is_user(),
    })
}

/// Error returned when an operation needs a mapping that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotMapped(pub VirtualAddress);

impl fmt::Display for NotMapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no mapping at {}", self.0)
    }
}

/// Rewrites the permission bits of an existing mapping.
///
/// The supplied bits are masked to the permission field, the present bit is
/// re-asserted (so a caller supplying bits that omit it cannot accidentally
/// unmap the page), and the physical base is preserved. The live table entry
/// is mutated in place: the edit takes effect immediately for any code that
/// subsequently touches the address, and there is no undo.
///
/// If the address has no mapping at either level, returns `NotMapped` and
/// leaves the translation structure untouched.
pub fn set_permissions(
    space: &mut AddressSpace,
    virt: VirtualAddress,
    permissions: PageFlags,
) -> Result<(), NotMapped> {
    let entry = match space.walk_mut(virt) {
        Some(entry) if entry.is_present() => entry,
        _ => return Err(NotMapped(virt)),
    };

    let mut flags = PageFlags::from_raw(permissions.to_raw() & paging::PERMISSION_MASK);
    flags.set_present(true);
    entry.set_flags(flags);
    log::trace!("permissions at {} set to {:#x}", virt, flags.to_raw());

    Ok(())
}

/// Lazy per-page walk over a range of virtual addresses.
///
/// Yields one `(address, mapping)` pair per page. See [`show_mapping`].
pub struct MappingWalk<'a> {
    space: &'a AddressSpace,
    next: PageNumber,
    last: PageNumber,
}

impl Iterator for MappingWalk<'_> {
    type Item = (VirtualAddress, Option<Mapping>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.last {
            return None;
        }

        let virt = self.next.start();
        self.next = self.next + 1;
        Some((virt, lookup(self.space, virt)))
    }
}

/// Walks the pages from `start` to `end`, both aligned down to a page
/// boundary and both **inclusive**, reporting the mapping of each.
pub fn show_mapping(
    space: &AddressSpace,
    start: VirtualAddress,
    end: VirtualAddress,
) -> MappingWalk<'_> {
    MappingWalk {
        space,
        next: start.page_number(),
        last: end.page_number(),
    }
}
