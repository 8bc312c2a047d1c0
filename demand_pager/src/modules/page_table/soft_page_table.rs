/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::collections::HashMap;

use log::trace;

use super::{Mapping, PageTableModule};
use crate::{address::VirtAddr, modules::physical_memory::PhysAddr};

#[derive(Debug, Clone, Copy)]
struct SoftPageTableEntry {
    mapping: Mapping,
    accessed: bool,
    dirty: bool,
}

/// Page table that is maintained in software only.
///
/// Accessed and dirty bits are not set by hardware, but by whoever emulates the access.
pub struct SoftPageTableModule {
    entries: HashMap<VirtAddr, SoftPageTableEntry>,
}

impl SoftPageTableModule {
    pub fn mapped_count(&self) -> usize {
        self.entries.len()
    }
}

impl PageTableModule for SoftPageTableModule {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn map(&mut self, va: VirtAddr, frame: PhysAddr, writable: bool) -> bool {
        let va = va.page_round_down();
        if va.is_kernel() || self.entries.contains_key(&va) {
            return false;
        }

        self.entries.insert(
            va,
            SoftPageTableEntry {
                mapping: Mapping { frame, writable },
                accessed: false,
                dirty: false,
            },
        );
        true
    }

    fn unmap(&mut self, va: VirtAddr) {
        self.entries.remove(&va.page_round_down());
    }

    fn get_mapping(&self, va: VirtAddr) -> Option<Mapping> {
        self.entries.get(&va.page_round_down()).map(|x| x.mapping)
    }

    fn is_accessed(&self, va: VirtAddr) -> bool {
        self.entries
            .get(&va.page_round_down())
            .map(|x| x.accessed)
            .unwrap_or(false)
    }

    fn set_accessed(&mut self, va: VirtAddr, accessed: bool) {
        if let Some(entry) = self.entries.get_mut(&va.page_round_down()) {
            entry.accessed = accessed;
        }
    }

    fn is_dirty(&self, va: VirtAddr) -> bool {
        self.entries
            .get(&va.page_round_down())
            .map(|x| x.dirty)
            .unwrap_or(false)
    }

    fn set_dirty(&mut self, va: VirtAddr, dirty: bool) {
        if let Some(entry) = self.entries.get_mut(&va.page_round_down()) {
            entry.dirty = dirty;
        }
    }

    fn activate(&self) {
        trace!("Activate page table with {} mappings", self.entries.len());
    }
}

#[cfg(test)]
mod test {
    use super::SoftPageTableModule;
    use crate::{
        address::{VirtAddr, KERN_BASE, PAGE_SIZE},
        modules::{page_table::PageTableModule, physical_memory::PhysAddr},
    };

    #[test]
    fn test_map_and_bits() {
        let mut table = SoftPageTableModule::new();
        let va = VirtAddr::new(8 * PAGE_SIZE);
        let frame = PhysAddr::new(0x20_0000);

        assert!(table.map(va, frame, true));
        // already present
        assert!(!table.map(va, frame, false));

        let mapping = table.get_mapping(va + 100).unwrap();
        assert_eq!(mapping.frame, frame);
        assert!(mapping.writable);

        assert!(!table.is_accessed(va));
        table.set_accessed(va + 5, true);
        table.set_dirty(va, true);
        assert!(table.is_accessed(va));
        assert!(table.is_dirty(va));

        table.unmap(va);
        assert!(!table.is_resident(va));
        assert!(!table.is_dirty(va));

        // a new mapping starts with clean bits
        assert!(table.map(va, frame, true));
        assert!(!table.is_dirty(va));
    }

    #[test]
    fn test_kernel_addresses_are_not_mapped() {
        let mut table = SoftPageTableModule::new();
        assert!(!table.map(VirtAddr::new(KERN_BASE), PhysAddr::new(0x20_0000), true));
        assert_eq!(table.mapped_count(), 0);
    }
}
