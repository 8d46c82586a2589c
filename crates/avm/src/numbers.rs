//! Page and frame number types.
//!
//! This module provides newtypes for physical frame numbers and virtual page
//! numbers. A frame count doubles as the memory-size oracle: the number of
//! installed frames is the first frame number past physical memory.

use crate::{
    address::{PhysicalAddress, VirtualAddress},
    paging,
};
use core::{
    fmt,
    ops::{Add, Sub},
};

/// Macro to define common page/frame number functionality.
macro_rules! impl_page_number_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new page/frame number.
            #[inline]
            pub const fn new(number: usize) -> Self {
                Self(number)
            }

            /// Returns the raw page/frame number.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self(self.0 - rhs)
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

impl_page_number_common!(
    FrameNumber,
    "A physical memory frame number.\n\n\
     Represents a physical memory frame, the physical equivalent of a page.\n\
     Frame numbers are zero-indexed and correspond to PAGE_SIZE-aligned\n\
     physical addresses."
);

impl FrameNumber {
    /// Returns the physical address at the start of this frame.
    #[inline]
    pub const fn start(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 * paging::PAGE_SIZE)
    }
}

impl From<PhysicalAddress> for FrameNumber {
    #[inline]
    fn from(addr: PhysicalAddress) -> Self {
        Self::new(addr.as_usize() / paging::PAGE_SIZE)
    }
}

impl_page_number_common!(
    PageNumber,
    "A virtual memory page number.\n\n\
     Represents a virtual memory page. Page numbers are zero-indexed and\n\
     correspond to PAGE_SIZE-aligned virtual addresses."
);

impl PageNumber {
    /// Returns the virtual address at the start of this page.
    #[inline]
    pub const fn start(self) -> VirtualAddress {
        VirtualAddress::new(self.0 * paging::PAGE_SIZE)
    }
}

impl From<VirtualAddress> for PageNumber {
    #[inline]
    fn from(addr: VirtualAddress) -> Self {
        Self::new(addr.as_usize() / paging::PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod frame_number {
        use super::*;

        #[test]
        fn start_address() {
            let frame = FrameNumber::new(3);
            assert_eq!(frame.start().as_usize(), 3 * paging::PAGE_SIZE);
        }

        #[test]
        fn from_physical_address_floors() {
            let addr = PhysicalAddress::new(paging::PAGE_SIZE * 3 + 10);
            assert_eq!(FrameNumber::from(addr).as_usize(), 3);
        }

        #[test]
        fn arithmetic() {
            let frame = FrameNumber::new(10);
            assert_eq!((frame + 5).as_usize(), 15);
            assert_eq!((frame - 3).as_usize(), 7);
            assert_eq!(frame - FrameNumber::new(4), 6);
        }

        #[test]
        fn round_trip() {
            let frame = FrameNumber::new(42);
            assert_eq!(FrameNumber::from(frame.start()), frame);
        }
    }

    mod page_number {
        use super::*;

        #[test]
        fn start_address() {
            let page = PageNumber::new(1);
            assert_eq!(page.start().as_usize(), paging::PAGE_SIZE);
        }

        #[test]
        fn from_virtual_address_floors() {
            let addr = VirtualAddress::new(paging::PAGE_SIZE * 5 + 0xFF);
            assert_eq!(PageNumber::from(addr).as_usize(), 5);
        }

        #[test]
        fn last_page_of_the_address_space() {
            let page = PageNumber::new(0xF_FFFF);
            assert_eq!(page.start().as_usize(), 0xFFFF_F000);
        }

        #[test]
        fn ordering() {
            assert!(PageNumber::new(5) < PageNumber::new(10));
        }
    }
}
