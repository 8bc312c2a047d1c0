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

mod soft_page_table;

pub use soft_page_table::SoftPageTableModule;

use crate::{address::VirtAddr, modules::physical_memory::PhysAddr};

/// A present translation of one virtual page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub frame: PhysAddr,
    pub writable: bool,
}

/// The hardware page table of a single address space.
///
/// It only caches the currently resident pages, everything else is
/// known to the supplemental page table only.
pub trait PageTableModule {
    /// Creates a new, empty page table
    fn new() -> Self;

    /// Maps the page `va` to `frame`.
    ///
    /// Returns `false` if `va` is already mapped or the mapping could not be created.
    fn map(&mut self, va: VirtAddr, frame: PhysAddr, writable: bool) -> bool;

    /// Removes the mapping of page `va`, if there is any
    fn unmap(&mut self, va: VirtAddr);

    /// Looks up the mapping of the page that contains `va`
    fn get_mapping(&self, va: VirtAddr) -> Option<Mapping>;

    fn is_resident(&self, va: VirtAddr) -> bool {
        self.get_mapping(va).is_some()
    }

    /// Was page `va` accessed since the bit was cleared the last time?
    ///
    /// Returns `false` for pages that are not mapped.
    fn is_accessed(&self, va: VirtAddr) -> bool;

    fn set_accessed(&mut self, va: VirtAddr, accessed: bool);

    /// Was page `va` written since it was mapped or the bit was cleared?
    ///
    /// Returns `false` for pages that are not mapped.
    fn is_dirty(&self, va: VirtAddr) -> bool;

    fn set_dirty(&mut self, va: VirtAddr, dirty: bool);

    /// Loads this page table into the MMU
    fn activate(&self) {}
}
