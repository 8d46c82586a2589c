//! Address types for physical and virtual memory management.
//!
//! This module provides wrappers around the 32-bit physical and virtual
//! addresses of the monitored machine, plus the translator capability that
//! turns a physical address into something the kernel can dereference.

use core::fmt;
use core::ops::{Add, Sub};

use crate::{FrameNumber, paging};

#[cfg(any(test, feature = "software-emulation"))]
use crate::emulated::EmulatedMemory;

/// Address translator for converting between physical and virtual addresses.
///
/// This enum supports two modes:
/// - Hardware: uses the kernel's direct map of physical memory
/// - Emulated: uses an emulated memory buffer (testing mode)
///
/// All raw memory access in the workspace goes through pointers obtained
/// from this type; nothing else dereferences a physical address.
pub enum AddressTranslator {
    /// Hardware translation through the direct map at a fixed offset.
    Hardware { direct_map_offset: usize },
    /// Emulated translation using a simulated memory region.
    #[cfg(any(test, feature = "software-emulation"))]
    Emulated(EmulatedMemory),
}

impl AddressTranslator {
    /// Creates a new hardware translator with the given direct-map offset.
    pub const fn hardware(direct_map_offset: usize) -> Self {
        Self::Hardware { direct_map_offset }
    }

    /// Creates a new emulated translator with the given memory size.
    #[cfg(any(test, feature = "software-emulation"))]
    pub fn emulated(size: usize) -> Self {
        Self::Emulated(EmulatedMemory::new(size))
    }

    /// Sets the global address translator.
    ///
    /// This function must be called exactly once during initialization.
    ///
    /// # Panics
    ///
    /// Panics if the translator has already been set.
    pub fn set_current(translator: AddressTranslator) {
        #[cfg(not(any(test, feature = "software-emulation")))]
        {
            if ADDRESS_TRANSLATOR.get().is_some() {
                panic!("address translator already set");
            }
            ADDRESS_TRANSLATOR.call_once(|| translator);
        }

        #[cfg(any(test, feature = "software-emulation"))]
        {
            ADDRESS_TRANSLATOR.with(|t| {
                if t.get().is_some() {
                    panic!("address translator already set");
                }
                t.call_once(|| translator);
            });
        }
    }

    /// Returns a reference to the current global address translator.
    ///
    /// # Panics
    ///
    /// Panics if the translator has not been set yet.
    pub fn current() -> &'static AddressTranslator {
        #[cfg(not(any(test, feature = "software-emulation")))]
        {
            ADDRESS_TRANSLATOR.get().expect(
                "address translator not set; call AddressTranslator::set_current during initialization",
            )
        }

        #[cfg(any(test, feature = "software-emulation"))]
        {
            ADDRESS_TRANSLATOR.with(|t| {
                // SAFETY: We leak the reference to make it 'static. This is safe because:
                // 1. In test mode, each thread has its own ADDRESS_TRANSLATOR
                // 2. Once set, it's never modified (spin::Once guarantees this)
                // 3. The thread-local lives for the entire duration of the thread
                unsafe { &*(t.get().expect(
                    "address translator not set; call AddressTranslator::set_current during initialization",
                ) as *const AddressTranslator) }
            })
        }
    }

    /// Translates a physical address to a virtual address.
    pub fn phys_to_virt(&self, phys: usize) -> usize {
        match self {
            Self::Hardware { direct_map_offset } => phys.wrapping_add(*direct_map_offset),
            #[cfg(any(test, feature = "software-emulation"))]
            Self::Emulated(mem) => mem.translate(phys) as usize,
        }
    }

    /// Translates a virtual address to a physical address.
    pub fn virt_to_phys(&self, virt: usize) -> usize {
        match self {
            Self::Hardware { direct_map_offset } => virt.wrapping_sub(*direct_map_offset),
            #[cfg(any(test, feature = "software-emulation"))]
            Self::Emulated(mem) => mem.ptr_to_phys(virt as *const u8),
        }
    }

    /// Translates a physical address to a typed pointer.
    pub fn phys_to_ptr<T>(&self, phys: usize) -> *mut T {
        self.phys_to_virt(phys) as *mut T
    }

    /// Translates a pointer to a physical address.
    pub fn ptr_to_phys<T>(&self, ptr: *const T) -> usize {
        self.virt_to_phys(ptr as usize)
    }

    /// Returns the number of physical bytes reachable through this translator.
    ///
    /// For the hardware translator this is the size of the direct-map window
    /// below the 4 GiB ceiling; for the emulated translator it is the size of
    /// the backing buffer.
    pub fn direct_map_span(&self) -> usize {
        match self {
            Self::Hardware { direct_map_offset } => {
                paging::ADDRESS_SPACE_SIZE - *direct_map_offset
            }
            #[cfg(any(test, feature = "software-emulation"))]
            Self::Emulated(mem) => mem.size(),
        }
    }

    /// Allocates memory from the emulated space (test mode only).
    ///
    /// Returns the physical address of the allocated block, or None if
    /// there's not enough space.
    #[cfg(any(test, feature = "software-emulation"))]
    pub fn allocate(&self, size: usize, align: usize) -> Option<usize> {
        match self {
            Self::Hardware { .. } => {
                panic!("cannot allocate from hardware translator")
            }
            Self::Emulated(mem) => mem.allocate(size, align),
        }
    }
}

/// Global address translator.
///
/// This is initialized once during kernel initialization (with Hardware variant).
/// In test/software-emulation mode, this is thread-local to allow each test to have its own
/// emulated memory space.
#[cfg(not(any(test, feature = "software-emulation")))]
static ADDRESS_TRANSLATOR: spin::Once<AddressTranslator> = spin::Once::new();

#[cfg(any(test, feature = "software-emulation"))]
std::thread_local! {
    static ADDRESS_TRANSLATOR: spin::Once<AddressTranslator> = spin::Once::new();
}

/// Macro to define common address type functionality.
///
/// This macro generates the basic structure and methods common to both physical
/// and virtual address types, reducing code duplication.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new address without validation.
            ///
            /// # Safety
            ///
            /// The caller must ensure that the address fits the 32-bit address space.
            #[inline]
            pub const unsafe fn new_unchecked(addr: usize) -> Self {
                Self(addr)
            }

            /// Returns the raw address value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Checks if the address is aligned to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                self.0 & (align - 1) == 0
            }

            /// Aligns the address down to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn align_down(self, align: usize) -> Self {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                Self(self.0 & !(align - 1))
            }

            /// Aligns the address up to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn align_up(self, align: usize) -> Self {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                Self((self.0 + align - 1) & !(align - 1))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(addr: u32) -> Self {
                Self::new(addr as usize)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(addr: usize) -> Self {
                Self::new(addr)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self::new(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self::new(self.0 - rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    "A physical memory address.\n\n\
     This is a newtype wrapper around the 32-bit physical addresses of the\n\
     monitored machine. It provides methods for address manipulation and\n\
     alignment checks."
);

impl PhysicalAddress {
    /// Creates a new physical address.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the 32-bit physical address width.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            paging::validate_physical(addr),
            "physical address exceeds maximum width"
        );
        Self(addr)
    }

    /// Returns the corresponding frame number for this physical address.
    #[inline]
    pub fn frame_number(self) -> FrameNumber {
        FrameNumber::from(self)
    }
}

impl_address_common!(
    VirtualAddress,
    "A virtual memory address.\n\n\
     This is a newtype wrapper around the 32-bit virtual addresses of the\n\
     monitored machine. It provides methods for address manipulation,\n\
     alignment checks, and extracting page table indexes."
);

impl VirtualAddress {
    /// Creates a new virtual address.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the 32-bit address space.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            paging::validate_virtual(addr),
            "virtual address exceeds the 32-bit address space"
        );
        Self(addr)
    }

    /// Converts the address to a pointer.
    #[inline]
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    /// Converts the address to a mutable pointer.
    #[inline]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Returns the offset of this address within its page (bits 0-11).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & (paging::PAGE_SIZE - 1)
    }

    /// Returns the page table index at the specified level.
    ///
    /// Level 0 is the page table, level 1 the page directory.
    ///
    /// # Panics
    ///
    /// Panics if `level` is not 0 or 1.
    #[inline]
    pub const fn page_index(self, level: usize) -> usize {
        paging::page_index(self.0, level)
    }

    /// Gets the corresponding page number for this virtual address.
    #[inline]
    pub fn page_number(self) -> crate::PageNumber {
        crate::PageNumber::from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod physical_address {
        use super::*;

        #[test]
        fn new_valid_address() {
            let addr = PhysicalAddress::new(0x0010_0000);
            assert_eq!(addr.as_usize(), 0x0010_0000);
        }

        #[test]
        fn new_max_valid_address() {
            let addr = PhysicalAddress::new(0xFFFF_FFFF);
            assert_eq!(addr.as_usize(), 0xFFFF_FFFF);
        }

        #[test]
        #[should_panic(expected = "physical address exceeds maximum width")]
        fn new_exceeds_max() {
            PhysicalAddress::new(1usize << 32);
        }

        #[test]
        fn alignment_check() {
            let addr = PhysicalAddress::new(paging::PAGE_SIZE * 4);
            assert!(addr.is_aligned(paging::PAGE_SIZE));
            assert!(addr.is_aligned(4));
            assert!(!addr.is_aligned(paging::PAGE_SIZE * 8));
        }

        #[test]
        fn align_down_and_up() {
            let addr = PhysicalAddress::new(0x1234);
            assert_eq!(
                addr.align_down(paging::PAGE_SIZE),
                PhysicalAddress::new(0x1000)
            );
            assert_eq!(
                addr.align_up(paging::PAGE_SIZE),
                PhysicalAddress::new(0x2000)
            );
            assert_eq!(addr.align_down(4), PhysicalAddress::new(0x1234));
        }

        #[test]
        fn arithmetic_operators() {
            let addr = PhysicalAddress::new(0x0100);
            assert_eq!((addr + 0x50).as_usize(), 0x0150);
            assert_eq!((addr - 0x50).as_usize(), 0x00B0);
            assert_eq!(PhysicalAddress::new(0x0150) - addr, 0x50);
        }

        #[test]
        fn formatting() {
            let addr = PhysicalAddress::new(0x5000);
            assert_eq!(format!("{}", addr), "0x5000");
            assert!(format!("{:?}", addr).contains("PhysicalAddress"));
        }

        #[test]
        fn frame_number_conversion() {
            let addr = PhysicalAddress::new(paging::PAGE_SIZE * 7 + 0x10);
            assert_eq!(addr.frame_number().as_usize(), 7);
        }
    }

    mod virtual_address {
        use super::*;

        #[test]
        fn new_valid_address() {
            let addr = VirtualAddress::new(0xF000_0000);
            assert_eq!(addr.as_usize(), 0xF000_0000);
        }

        #[test]
        #[should_panic(expected = "virtual address exceeds the 32-bit address space")]
        fn new_out_of_range() {
            VirtualAddress::new(1usize << 32);
        }

        #[test]
        fn page_offset() {
            assert_eq!(VirtualAddress::new(0x1234).page_offset(), 0x234);
            assert_eq!(VirtualAddress::new(paging::PAGE_SIZE).page_offset(), 0);
        }

        #[test]
        fn page_index_levels() {
            // Address 0x0080_5000: directory index 2, table index 5
            let addr = VirtualAddress::new(0x0080_5000);
            assert_eq!(addr.page_index(1), 2);
            assert_eq!(addr.page_index(0), 5);
        }

        #[test]
        fn pointer_conversion() {
            let addr = VirtualAddress::new(0x0100);
            assert_eq!(addr.as_ptr::<u8>() as usize, 0x0100);
            assert_eq!(addr.as_mut_ptr::<u8>() as usize, 0x0100);
        }

        #[test]
        fn comparison_operators() {
            let addr1 = VirtualAddress::new(0x0100);
            let addr2 = VirtualAddress::new(0x0200);
            assert!(addr1 < addr2);
            assert_eq!(addr1, VirtualAddress::new(0x0100));
        }
    }

    mod translator {
        use super::*;

        #[test]
        fn hardware_round_trip() {
            let translator = AddressTranslator::hardware(0xF000_0000);
            let virt = translator.phys_to_virt(0x0100);
            assert_eq!(virt, 0xF000_0100);
            assert_eq!(translator.virt_to_phys(virt), 0x0100);
        }

        #[test]
        fn hardware_direct_map_span() {
            let translator = AddressTranslator::hardware(0xF000_0000);
            assert_eq!(translator.direct_map_span(), 0x1000_0000);
        }

        #[test]
        fn emulated_allocate_and_translate() {
            let translator = AddressTranslator::emulated(64 * 1024);
            let phys = translator
                .allocate(paging::PAGE_SIZE, paging::PAGE_SIZE)
                .unwrap();
            assert_eq!(phys % paging::PAGE_SIZE, 0);

            let ptr = translator.phys_to_ptr::<u8>(phys);
            assert_eq!(translator.ptr_to_phys(ptr), phys);
        }

        #[test]
        fn emulated_direct_map_span_is_buffer_size() {
            let translator = AddressTranslator::emulated(32 * 1024);
            assert_eq!(translator.direct_map_span(), 32 * 1024);
        }

        #[test]
        #[should_panic(expected = "address translator already set")]
        fn panics_on_double_set() {
            AddressTranslator::set_current(AddressTranslator::hardware(0xF000_0000));
            AddressTranslator::set_current(AddressTranslator::hardware(0xE000_0000));
        }
    }
}
