//! Memory dumps over physical or virtual address ranges.
//!
//! A dump walks a range in 4-byte units and emits one record per unit. The
//! virtual walk batches consecutive units that share a translation: one walk
//! of the page tables covers a whole run, whether that run is a mapped page,
//! a page with an empty table entry, or the 4 MiB span of an absent
//! directory entry.

use avm::{
    AddressSpace, AddressTranslator, FrameNumber, HumanAddress, PhysicalAddress, VirtualAddress,
    paging,
};

use crate::mapping::Mapping;
use crate::range::{self, AddressRange, UNIT_SIZE};

/// Which address space a dump walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpMode {
    /// Walk physical memory through the direct map.
    Physical,
    /// Walk a virtual address range through its page tables.
    Virtual,
}

/// One 4-byte unit of dump output.
///
/// `physical` and `content` are absent exactly when the unit has no
/// translation; a physical-mode record always carries both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpRecord {
    /// The address of this unit in the dumped range.
    pub address: usize,
    /// The backing physical address, if the unit is mapped.
    pub physical: Option<PhysicalAddress>,
    /// The 4 bytes at the unit, if the unit is mapped.
    pub content: Option<u32>,
}

impl DumpRecord {
    fn absent(address: usize) -> Self {
        Self {
            address,
            physical: None,
            content: None,
        }
    }
}

/// Reads one unit of physical memory through the translator capability.
///
/// # Safety
/// `phys` and the following three bytes must lie within the memory reachable
/// through `translator` (the direct-map window or the emulated buffer).
unsafe fn read_unit(translator: &AddressTranslator, phys: usize) -> u32 {
    // The emulated backing store only guarantees byte alignment.
    unsafe { core::ptr::read_unaligned(translator.phys_to_ptr::<u32>(phys)) }
}

/// How the units at and after an address translate.
///
/// One variant per translation granularity; each knows how far it extends.
enum Run {
    /// No directory entry: nothing is mapped up to the next 4 MiB boundary.
    UnmappedDirectory,
    /// The page table exists but the entry is empty: unmapped to the next
    /// page boundary.
    UnmappedPage,
    /// A present mapping covering the rest of the page.
    Mapped(Mapping),
}

impl Run {
    fn classify(space: &AddressSpace, address: usize) -> Self {
        match space.walk(VirtualAddress::new(address)) {
            None => Run::UnmappedDirectory,
            Some(entry) => match entry.address() {
                None => Run::UnmappedPage,
                Some(physical_base) => {
                    let flags = entry.flags();
                    Run::Mapped(Mapping {
                        physical_base,
                        writable: flags.is_writable(),
                        user_accessible: flags.is_user(),
                    })
                }
            },
        }
    }

    /// First address past the run containing `address`.
    ///
    /// The boundary comes from the index granularity of the variant, not
    /// from a fixed stride: an absent directory entry spans to the next
    /// directory boundary, the other two cases to the next page boundary.
    fn span_end(&self, address: usize) -> usize {
        match self {
            Run::UnmappedDirectory => range::directory_end(address),
            Run::UnmappedPage | Run::Mapped(_) => range::page_end(address),
        }
    }
}

/// Lazy walk over a virtual address range.
struct VirtualDump<'a> {
    space: &'a AddressSpace,
    translator: &'static AddressTranslator,
    cursor: usize,
    end: usize,
    run: Run,
    run_end: usize,
}

impl<'a> VirtualDump<'a> {
    fn new(space: &'a AddressSpace, range: AddressRange) -> Self {
        let requested = range.end();
        let end = requested.min(paging::ADDRESS_SPACE_SIZE);
        if end < requested {
            log::warn!("virtual dump clamped at {}", HumanAddress(end));
        }

        Self {
            space,
            translator: AddressTranslator::current(),
            cursor: range::align_down(range.start(), UNIT_SIZE),
            end,
            // Classified lazily: run_end == 0 forces a walk on the first unit.
            run: Run::UnmappedDirectory,
            run_end: 0,
        }
    }
}

impl Iterator for VirtualDump<'_> {
    type Item = DumpRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }

        if self.cursor >= self.run_end {
            self.run = Run::classify(self.space, self.cursor);
            self.run_end = self.run.span_end(self.cursor).min(self.end);
        }

        let record = match &self.run {
            Run::Mapped(mapping) => {
                let offset = self.cursor & (paging::PAGE_SIZE - 1);
                let phys = mapping.physical_base.as_usize() | offset;
                // SAFETY: The entry is present, so the physical page is
                // backed by installed memory reachable through the direct
                // map. The monitor trusts the page tables it is inspecting.
                let content = unsafe { read_unit(self.translator, phys) };
                DumpRecord {
                    address: self.cursor,
                    physical: Some(PhysicalAddress::new(phys)),
                    content: Some(content),
                }
            }
            _ => DumpRecord::absent(self.cursor),
        };

        self.cursor += UNIT_SIZE;
        Some(record)
    }
}

/// Lazy walk over a physical address range.
struct PhysicalDump {
    translator: &'static AddressTranslator,
    cursor: usize,
    end: usize,
}

impl PhysicalDump {
    fn new(range: AddressRange, installed: FrameNumber) -> Self {
        let translator = AddressTranslator::current();

        // Two independent ceilings, both applied: the installed-memory size
        // and the span of the direct map itself.
        let installed_bytes = installed.as_usize().saturating_mul(paging::PAGE_SIZE);
        let ceiling = installed_bytes.min(translator.direct_map_span());

        let requested = range.end();
        let end = requested.min(ceiling);
        if end < requested {
            log::warn!("physical dump clamped at {}", HumanAddress(end));
        }

        Self {
            translator,
            cursor: range::align_down(range.start(), UNIT_SIZE),
            end,
        }
    }
}

impl Iterator for PhysicalDump {
    type Item = DumpRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }

        let phys = self.cursor;
        // SAFETY: The constructor clamped the range below both the installed
        // memory size and the direct-map span, so the unit is dereferenceable.
        let content = unsafe { read_unit(self.translator, phys) };

        self.cursor += UNIT_SIZE;
        Some(DumpRecord {
            address: phys,
            physical: Some(PhysicalAddress::new(phys)),
            content: Some(content),
        })
    }
}

enum DumpInner<'a> {
    Physical(PhysicalDump),
    Virtual(VirtualDump<'a>),
}

/// A lazy sequence of [`DumpRecord`]s over one address range.
///
/// Produced by [`dump_memory`] or [`dump_range`]; records materialize as the
/// iterator is driven, so dumping a large range costs nothing until it is
/// consumed.
pub struct MemoryDump<'a> {
    inner: DumpInner<'a>,
}

impl Iterator for MemoryDump<'_> {
    type Item = DumpRecord;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            DumpInner::Physical(dump) => dump.next(),
            DumpInner::Virtual(dump) => dump.next(),
        }
    }
}

/// Dumps an arbitrary byte range of memory.
///
/// `installed` is the number of physical frames present in the machine; it
/// bounds physical-mode dumps and is ignored in virtual mode.
pub fn dump_range<'a>(
    space: &'a AddressSpace,
    mode: DumpMode,
    range: AddressRange,
    installed: FrameNumber,
) -> MemoryDump<'a> {
    let inner = match mode {
        DumpMode::Physical => DumpInner::Physical(PhysicalDump::new(range, installed)),
        DumpMode::Virtual => DumpInner::Virtual(VirtualDump::new(space, range)),
    };
    MemoryDump { inner }
}

/// Dumps `units` 4-byte units starting at `start` (aligned down to a unit).
pub fn dump_memory<'a>(
    space: &'a AddressSpace,
    mode: DumpMode,
    start: usize,
    units: usize,
    installed: FrameNumber,
) -> MemoryDump<'a> {
    dump_range(space, mode, AddressRange::of_units(start, units), installed)
}
