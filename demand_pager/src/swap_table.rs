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

use log::{debug, trace};
use try_lock::TryLock;

use crate::{
    address::PAGE_SIZE, modules::block_device::BlockDeviceModule, util::bit_array::BitArray,
    util::ceil_div, vm_error::VmError,
};

/// Index of one page sized slot of the swap disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SlotId(usize);

impl SlotId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Swap disk split up into page sized slots.
///
/// The bitmap of used slots and the device are locked separately,
/// so a disk transfer never blocks slot allocation or release.
pub(crate) struct SwapTable<D: BlockDeviceModule> {
    device: TryLock<D>,

    /// Bit `i` is set iff slot `i` holds the content of some anonymous page
    used: TryLock<BitArray>,

    sector_size: usize,
    sectors_per_slot: usize,
    slot_count: usize,
}

impl<D: BlockDeviceModule> SwapTable<D> {
    pub(crate) fn new(device: D) -> Self {
        let sector_size = device.sector_size();
        assert!(sector_size > 0, "sector size has to be positive");

        // computed once, the geometry of a disk does not change
        let sectors_per_slot = ceil_div(PAGE_SIZE, sector_size);
        let slot_count = device.sector_count() / sectors_per_slot;

        debug!(
            "Swap table with {} slots ({} sectors of {} bytes per slot)",
            slot_count, sectors_per_slot, sector_size
        );

        Self {
            device: TryLock::new(device),
            used: TryLock::new(BitArray::new(slot_count)),
            sector_size,
            sectors_per_slot,
            slot_count,
        }
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Claims the first free slot
    pub(crate) fn allocate_slot(&self) -> Result<SlotId, VmError> {
        let mut used = self.used.try_lock().ok_or(VmError::Contended)?;

        let index = used.first_unset().ok_or(VmError::SwapExhausted)?;
        used.set(true, index);

        trace!("Allocate swap slot {}", index);
        Ok(SlotId(index))
    }

    /// Releases `slot`, releasing an already free slot does nothing
    pub(crate) fn free_slot(&self, slot: SlotId) -> Result<(), VmError> {
        let mut used = self.used.try_lock().ok_or(VmError::Contended)?;
        assert!(slot.0 < self.slot_count, "swap slot {} does not exist", slot.0);

        if !used.is_set(slot.0) {
            debug!("Swap slot {} is already free", slot.0);
            return Ok(());
        }

        used.set(false, slot.0);
        trace!("Free swap slot {}", slot.0);
        Ok(())
    }

    pub(crate) fn is_used(&self, slot: SlotId) -> Result<bool, VmError> {
        let used = self.used.try_lock().ok_or(VmError::Contended)?;
        Ok(slot.0 < self.slot_count && used.is_set(slot.0))
    }

    pub(crate) fn used_count(&self) -> Result<usize, VmError> {
        let used = self.used.try_lock().ok_or(VmError::Contended)?;
        Ok(used.count_set())
    }

    /// Reads the page stored in `slot` into `dest`
    pub(crate) fn read_slot(&self, slot: SlotId, dest: &mut [u8]) -> Result<(), VmError> {
        debug_assert_eq!(dest.len(), PAGE_SIZE, "swap transfers are page sized");
        assert!(self.is_used(slot)?, "read of unallocated swap slot {}", slot.0);

        let mut device = self.device.try_lock().ok_or(VmError::Contended)?;
        let mut buffer = vec![0u8; self.sector_size];

        for (i, chunk) in dest.chunks_mut(self.sector_size).enumerate() {
            device
                .read_sector(self.first_sector(slot) + i, &mut buffer)
                .map_err(|_| VmError::Io)?;
            chunk.copy_from_slice(&buffer[..chunk.len()]);
        }

        Ok(())
    }

    /// Writes the page `src` into `slot`
    pub(crate) fn write_slot(&self, slot: SlotId, src: &[u8]) -> Result<(), VmError> {
        debug_assert_eq!(src.len(), PAGE_SIZE, "swap transfers are page sized");
        assert!(self.is_used(slot)?, "write to unallocated swap slot {}", slot.0);

        let mut device = self.device.try_lock().ok_or(VmError::Contended)?;
        let mut buffer = vec![0u8; self.sector_size];

        for (i, chunk) in src.chunks(self.sector_size).enumerate() {
            // a page that does not fill the last sector is padded with zeros
            buffer[..chunk.len()].copy_from_slice(chunk);
            buffer[chunk.len()..].fill(0);

            device
                .write_sector(self.first_sector(slot) + i, &buffer)
                .map_err(|_| VmError::Io)?;
        }

        Ok(())
    }

    fn first_sector(&self, slot: SlotId) -> usize {
        slot.0 * self.sectors_per_slot
    }
}
