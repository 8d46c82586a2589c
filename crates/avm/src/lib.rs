#![cfg_attr(not(any(test, feature = "software-emulation")), no_std)]

//! # Altair Virtual Memory (AVM)
//!
//! AVM is the address-space manager of the Altair kernel. It provides:
//!
//! - 32-bit physical and virtual address types.
//! - The two-level (directory + table) translation structure and its walk.
//! - The translator capability that maps physical memory into something
//!   dereferenceable, with an emulated backing store for host-side tests.

extern crate alloc;

mod address;
mod address_space;
#[cfg(any(test, feature = "software-emulation"))]
mod emulated;
mod human_address;
mod numbers;
mod page_directory;
pub mod paging;

pub use address::{AddressTranslator, PhysicalAddress, VirtualAddress};
pub use address_space::AddressSpace;
#[cfg(any(test, feature = "software-emulation"))]
pub use emulated::EmulatedMemory;
pub use human_address::HumanAddress;
pub use numbers::{FrameNumber, PageNumber};
pub use page_directory::PageDirectory;
pub use paging::{PAGE_SIZE, PageEntry, PageFlags, PageTable};
