#![cfg_attr(not(test), no_std)]

//! # Altair kernel monitor: memory introspection
//!
//! The logic behind the monitor's memory commands: reconstructing a
//! backtrace from a frame-pointer chain, resolving and displaying
//! virtual-to-physical mappings, dumping address ranges, and editing the
//! permission bits of a live mapping.
//!
//! Everything operates on an explicitly passed [`avm::AddressSpace`] and
//! returns lazy record sequences; reading command lines and formatting
//! reports belong to the surrounding monitor shell. The monitor assumes it
//! is the only agent touching the address space while it runs; concurrent
//! mutation by another context is undefined.

mod backtrace;
mod dump;
mod mapping;
mod range;

pub use backtrace::{
    ARG_COUNT, Backtrace, FrameSymbol, LiveStack, StackFrame, StackMemory, backtrace,
};
#[cfg(target_arch = "x86")]
pub use backtrace::current_frame_base;
pub use dump::{DumpMode, DumpRecord, MemoryDump, dump_memory, dump_range};
pub use mapping::{Mapping, MappingWalk, NotMapped, lookup, set_permissions, show_mapping};
pub use range::{AddressRange, UNIT_SIZE};
