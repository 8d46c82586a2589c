//! Two-level paging structure for the Altair target machine.
//!
//! Altair models a 32-bit machine with i386-style paging:
//! - 4 KiB pages
//! - 2 levels of translation: a page directory and page tables
//! - 10-bit indexes (1024 entries per table)
//! - 12-bit page offset
//!
//! A single directory entry therefore governs a 4 MiB span of virtual
//! addresses, while a table entry governs one page.

mod entry;
mod flags;
mod table;

pub use entry::PageEntry;
pub use flags::PageFlags;
pub use table::PageTable;

/// Maximum number of bits in a physical address.
pub const MAX_PHYSICAL_BITS: usize = 32;

/// Maximum number of bits in a virtual address.
pub const MAX_VIRTUAL_BITS: usize = 32;

/// Page size in bytes (4 KiB = 2^12).
pub const PAGE_SIZE: usize = 4096;

/// Number of page table levels (level 1 = directory, level 0 = table).
pub const PAGE_TABLE_LEVELS: usize = 2;

/// Number of entries in a page directory or page table.
pub const ENTRY_COUNT: usize = 1024;

/// Span of virtual addresses governed by one directory entry (4 MiB).
pub const DIRECTORY_SPAN: usize = ENTRY_COUNT * PAGE_SIZE;

/// One past the highest addressable byte (4 GiB).
pub const ADDRESS_SPACE_SIZE: usize = 1 << MAX_VIRTUAL_BITS;

/// Low entry bits that carry permissions rather than an address.
pub const PERMISSION_MASK: usize = 0xFFF;

/// Returns the page table index for a given virtual address at the specified level.
///
/// - Level 0: bits 12-21 (page table)
/// - Level 1: bits 22-31 (page directory)
#[inline]
pub const fn page_index(address: usize, level: usize) -> usize {
    let shift = match level {
        0 => 12,
        1 => 22,
        _ => panic!("level out of range for two-level paging (0-1)"),
    };
    (address >> shift) & (ENTRY_COUNT - 1)
}

/// Returns the page directory index (level 1) for a virtual address.
#[inline]
pub const fn directory_index(address: usize) -> usize {
    page_index(address, 1)
}

/// Returns the page table index (level 0) for a virtual address.
#[inline]
pub const fn table_index(address: usize) -> usize {
    page_index(address, 0)
}

/// Validates a physical address.
///
/// Physical addresses must fit within 32 bits.
#[inline]
pub const fn validate_physical(addr: usize) -> bool {
    addr < ADDRESS_SPACE_SIZE
}

/// Validates a virtual address.
///
/// Virtual addresses are flat 32-bit values; there is no canonical form.
#[inline]
pub const fn validate_virtual(addr: usize) -> bool {
    addr < ADDRESS_SPACE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_index_levels() {
        // Address 0x0040_3004:
        // Bits 0-11: page offset = 0x004
        // Bits 12-21: level 0 = 3
        // Bits 22-31: level 1 = 1
        let addr = 0x0040_3004;
        assert_eq!(page_index(addr, 0), 3);
        assert_eq!(page_index(addr, 1), 1);
    }

    #[test]
    fn page_index_all_bits_set() {
        let addr = 0xFFFF_FFFF;
        assert_eq!(page_index(addr, 0), ENTRY_COUNT - 1);
        assert_eq!(page_index(addr, 1), ENTRY_COUNT - 1);
    }

    #[test]
    fn directory_and_table_index_match_levels() {
        let addr = 0x1234_5678;
        assert_eq!(directory_index(addr), page_index(addr, 1));
        assert_eq!(table_index(addr), page_index(addr, 0));
    }

    #[test]
    fn directory_span_covers_one_directory_entry() {
        assert_eq!(directory_index(0), directory_index(DIRECTORY_SPAN - 1));
        assert_ne!(directory_index(0), directory_index(DIRECTORY_SPAN));
    }

    #[test]
    fn validates_32_bit_addresses() {
        assert!(validate_physical(0));
        assert!(validate_physical(0xFFFF_FFFF));
        assert!(!validate_physical(1 << 32));
        assert!(validate_virtual(0xFFFF_FFFF));
        assert!(!validate_virtual(1 << 32));
    }
}
