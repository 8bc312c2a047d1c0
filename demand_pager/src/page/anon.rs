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

use log::trace;

use crate::{
    address::VirtAddr,
    modules::{block_device::BlockDeviceModule, page_table::PageTableModule},
    swap_table::{SlotId, SwapTable},
    vm_error::VmError,
};

/// A page without a backing file (heap, stack, loaded segments).
///
/// While evicted, its content lives in `slot`.
pub(crate) struct AnonPage {
    pub(crate) slot: Option<SlotId>,

    /// This page belongs to the user stack
    pub(crate) stack: bool,
}

impl AnonPage {
    pub(crate) fn new(stack: bool) -> Self {
        Self { slot: None, stack }
    }

    pub(crate) fn swap_in<D: BlockDeviceModule>(
        &mut self,
        va: VirtAddr,
        frame: &mut [u8],
        swap: &SwapTable<D>,
    ) -> Result<(), VmError> {
        let slot = match self.slot {
            Some(slot) => slot,
            None => {
                // never written to swap yet
                frame.fill(0);
                return Ok(());
            }
        };

        trace!("Swap in {} from slot {}", va, slot.index());
        swap.read_slot(slot, frame)?;

        self.slot = None;
        swap.free_slot(slot)
    }

    pub(crate) fn swap_out<D: BlockDeviceModule, P: PageTableModule>(
        &mut self,
        va: VirtAddr,
        frame: &[u8],
        page_table: &mut P,
        swap: &SwapTable<D>,
    ) -> Result<(), VmError> {
        debug_assert!(self.slot.is_none(), "resident page {} still owns a slot", va);

        let slot = swap.allocate_slot()?;
        if let Err(err) = swap.write_slot(slot, frame) {
            swap.free_slot(slot)?;
            return Err(err);
        }

        trace!("Swap out {} to slot {}", va, slot.index());
        self.slot = Some(slot);

        page_table.set_dirty(va, false);
        page_table.unmap(va);
        Ok(())
    }

    pub(crate) fn destroy<D: BlockDeviceModule>(self, swap: &SwapTable<D>) -> Result<(), VmError> {
        match self.slot {
            Some(slot) => swap.free_slot(slot),
            None => Ok(()),
        }
    }
}
