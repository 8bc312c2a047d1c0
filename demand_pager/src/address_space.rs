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

use crate::{
    address::VirtAddr,
    modules::{file::FileModule, page_table::PageTableModule},
    supplemental_page_table::SupplementalPageTable,
};

/// Handle of an address space inside of a [`crate::Vm`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressSpaceId(usize);

impl AddressSpaceId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// A range of pages that was created by `mmap`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRegion {
    pub start: VirtAddr,
    pub page_count: usize,
}

pub(crate) struct AddressSpace<P: PageTableModule, F: FileModule> {
    pub(crate) spt: SupplementalPageTable<F>,
    pub(crate) page_table: P,

    /// Lowest page of the stack, `None` until the stack was set up
    pub(crate) stack_bottom: Option<VirtAddr>,

    pub(crate) mappings: Vec<MappedRegion>,
}

impl<P: PageTableModule, F: FileModule> AddressSpace<P, F> {
    pub(crate) fn new() -> Self {
        Self {
            spt: SupplementalPageTable::new(),
            page_table: P::new(),
            stack_bottom: None,
            mappings: Vec::new(),
        }
    }
}
