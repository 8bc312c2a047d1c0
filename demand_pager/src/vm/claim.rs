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

use log::{debug, trace, warn};

use super::{live_space_mut, space_mut, space_ref, Vm};
use crate::{
    address::VirtAddr,
    address_space::{AddressSpace, AddressSpaceId},
    frame_table::{FrameId, FrameOwner},
    modules::{
        block_device::BlockDeviceModule, file::FileModule, page_table::PageTableModule,
        physical_memory::PhysicalMemoryModule,
    },
    vm_error::VmError,
};

impl<D, M, P, F> Vm<D, M, P, F>
where
    D: BlockDeviceModule,
    M: PhysicalMemoryModule,
    P: PageTableModule,
    F: FileModule,
{
    /// Makes the page at `va` resident right away.
    ///
    /// Claiming a page that is resident already does nothing.
    pub fn claim(&mut self, id: AddressSpaceId, va: VirtAddr) -> Result<(), VmError> {
        let va = va.page_round_down();
        let page = space_ref(&self.spaces, id)?
            .spt
            .find(va)
            .ok_or(VmError::InvalidAccess)?;
        if page.is_resident() {
            return Ok(());
        }

        let frame = self.acquire_frame()?;
        if let Err(err) = self.fill_frame(id, va, frame) {
            self.frames.frame_mut(frame).fill(0);
            self.frames.release(frame);
            return Err(err);
        }

        trace!("Claimed {} of space {}", va, id.index());
        Ok(())
    }

    /// Maps `frame` at `va` and loads the content of the page into it
    fn fill_frame(&mut self, id: AddressSpaceId, va: VirtAddr, frame: FrameId) -> Result<(), VmError> {
        let kva = self.frames.kva(frame);
        let AddressSpace {
            spt, page_table, ..
        } = space_mut(&mut self.spaces, id)?;
        let page = spt.find_mut(va).ok_or(VmError::InvalidAccess)?;

        if !page_table.map(va, kva, page.writable) {
            warn!("Could not map {} to {:?}", va, kva);
            return Err(VmError::MapFailed);
        }

        if let Err(err) = page.swap_in(self.frames.frame_mut(frame), page_table, &self.swap) {
            page_table.unmap(va);
            return Err(err);
        }

        page.frame = Some(frame);
        self.frames.set_owner(frame, FrameOwner { space: id, va });
        Ok(())
    }

    /// Maps `frame`, which already holds the content of the page at `va`
    pub(super) fn install_frame(
        &mut self,
        id: AddressSpaceId,
        va: VirtAddr,
        frame: FrameId,
    ) -> Result<(), VmError> {
        let kva = self.frames.kva(frame);
        let AddressSpace {
            spt, page_table, ..
        } = space_mut(&mut self.spaces, id)?;
        let page = spt.find_mut(va).ok_or(VmError::InvalidAccess)?;

        if !page_table.map(va, kva, page.writable) {
            warn!("Could not map {} to {:?}", va, kva);
            return Err(VmError::MapFailed);
        }

        page.frame = Some(frame);
        self.frames.set_owner(frame, FrameOwner { space: id, va });
        Ok(())
    }

    /// Returns a frame without owner, evicting some page if the pool is empty
    pub(super) fn acquire_frame(&mut self) -> Result<FrameId, VmError> {
        match self.frames.try_allocate() {
            Some(frame) => Ok(frame),
            None => self.evict_frame(),
        }
    }

    fn evict_frame(&mut self) -> Result<FrameId, VmError> {
        let spaces = &mut self.spaces;
        let victim = self
            .frames
            .select_victim(|owner| {
                let page_table = &mut live_space_mut(spaces.as_mut_slice(), owner.space).page_table;
                let accessed = page_table.is_accessed(owner.va);
                if accessed {
                    page_table.set_accessed(owner.va, false);
                }
                accessed
            })
            .ok_or(VmError::OutOfFrames)?;

        // nobody else can choose the frame while its content is written out
        let Some(owner) = self.frames.take_owner(victim) else {
            unreachable!("victim {:?} without owner", victim)
        };

        let AddressSpace {
            spt, page_table, ..
        } = live_space_mut(&mut self.spaces, owner.space);
        let page = spt
            .find_mut(owner.va)
            .unwrap_or_else(|| panic!("frame {:?} is owned by missing page {}", victim, owner.va));

        if let Err(err) = page.swap_out(self.frames.frame(victim), page_table, &self.swap) {
            warn!("Could not evict {} of space {}: {}", owner.va, owner.space.index(), err);
            self.frames.set_owner(victim, owner);
            return Err(err);
        }

        self.frames.frame_mut(victim).fill(0);
        debug!(
            "Evicted {} of space {} from frame {:?}",
            owner.va,
            owner.space.index(),
            victim
        );
        Ok(victim)
    }
}
