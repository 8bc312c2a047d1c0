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

use super::{space_mut, space_ref, Vm};
use crate::{
    address::{VirtAddr, PAGE_SIZE},
    address_space::AddressSpaceId,
    frame_table::FrameId,
    modules::{
        block_device::BlockDeviceModule, file::FileModule, page_table::PageTableModule,
        physical_memory::PhysicalMemoryModule,
    },
    page::Page,
    vm_error::VmError,
};

impl<D, M, P, F> Vm<D, M, P, F>
where
    D: BlockDeviceModule,
    M: PhysicalMemoryModule,
    P: PageTableModule,
    F: FileModule,
{
    /// Entry point of the trap handler.
    ///
    /// Returns `false` if the fault could not be resolved, the faulting process has
    /// to be terminated in that case.
    pub fn handle_page_fault(
        &mut self,
        id: AddressSpaceId,
        addr: VirtAddr,
        user: bool,
        write: bool,
        not_present: bool,
    ) -> bool {
        match self.try_handle_fault(id, addr, user, write, not_present) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "Unresolved {} fault at {} in space {}: {}",
                    if write { "write" } else { "read" },
                    addr,
                    id.index(),
                    err
                );
                false
            }
        }
    }

    /// Same as [`Vm::handle_page_fault`], but tells why a fault could not be resolved
    pub fn try_handle_fault(
        &mut self,
        id: AddressSpaceId,
        addr: VirtAddr,
        user: bool,
        write: bool,
        not_present: bool,
    ) -> Result<(), VmError> {
        trace!(
            "Fault at {} (user: {}, write: {}, not present: {})",
            addr,
            user,
            write,
            not_present
        );

        if user && addr.is_kernel() {
            return Err(VmError::InvalidAccess);
        }

        if !not_present {
            return Err(VmError::ProtectionViolation);
        }

        let writable = space_ref(&self.spaces, id)?
            .spt
            .find(addr)
            .map(|page| page.writable);

        match writable {
            Some(false) if write => Err(VmError::ProtectionViolation),
            Some(_) => self.claim(id, addr),
            None if write && self.is_stack_growth(id, addr) => self.grow_stack(id, addr),
            None => Err(VmError::InvalidAccess),
        }
    }

    fn is_stack_growth(&self, id: AddressSpaceId, addr: VirtAddr) -> bool {
        let Some(bottom) = self.stack_bottom(id) else {
            return false;
        };

        addr.is_user() && addr < bottom && addr >= self.config.stack_limit()
    }

    /// Reserves and claims the first stack page right below the stack top.
    ///
    /// Returns the initial stack pointer.
    pub fn setup_stack(&mut self, id: AddressSpaceId) -> Result<VirtAddr, VmError> {
        let top = self.config.user_stack_top;
        let va = top - PAGE_SIZE;

        let space = space_mut(&mut self.spaces, id)?;
        if space.stack_bottom.is_some() || space.spt.contains(va) {
            return Err(VmError::InvalidArgument);
        }

        self.push_stack_page(id, va)?;
        debug!("Set up stack of space {} at {}", id.index(), va);
        Ok(top)
    }

    /// Adds zeroed stack pages until the page of `addr` is covered.
    ///
    /// The boundary moves page by page, so after a failure all pages above it are still valid.
    fn grow_stack(&mut self, id: AddressSpaceId, addr: VirtAddr) -> Result<(), VmError> {
        let target = addr.page_round_down();

        while let Some(bottom) = self.stack_bottom(id) {
            if bottom <= target {
                break;
            }

            let va = bottom - PAGE_SIZE;
            if space_ref(&self.spaces, id)?.spt.contains(va) {
                // stack ran into another region
                return Err(VmError::InvalidAccess);
            }

            self.push_stack_page(id, va)?;
        }

        debug!("Grew stack of space {} to {}", id.index(), target);
        Ok(())
    }

    fn push_stack_page(&mut self, id: AddressSpaceId, va: VirtAddr) -> Result<(), VmError> {
        space_mut(&mut self.spaces, id)?
            .spt
            .insert(Page::new_stack(va));

        if let Err(err) = self.claim(id, va) {
            // the page is not resident and holds nothing
            self.destroy_page(id, va)?;
            return Err(err);
        }

        space_mut(&mut self.spaces, id)?.stack_bottom = Some(va);
        Ok(())
    }

    /// Copies user memory at `addr` into `dest` the way a load instruction of the process would
    pub fn user_read(
        &mut self,
        id: AddressSpaceId,
        addr: VirtAddr,
        dest: &mut [u8],
    ) -> Result<(), VmError> {
        let mut done = 0;
        while done < dest.len() {
            let curr = addr.checked_add(done).ok_or(VmError::InvalidAccess)?;
            let len = (PAGE_SIZE - curr.page_offset()).min(dest.len() - done);

            let frame = self.user_access(id, curr, false)?;
            let offset = curr.page_offset();
            dest[done..done + len].copy_from_slice(&self.frames.frame(frame)[offset..offset + len]);

            done += len;
        }

        Ok(())
    }

    /// Copies `src` into user memory at `addr` the way a store instruction of the process would
    pub fn user_write(&mut self, id: AddressSpaceId, addr: VirtAddr, src: &[u8]) -> Result<(), VmError> {
        let mut done = 0;
        while done < src.len() {
            let curr = addr.checked_add(done).ok_or(VmError::InvalidAccess)?;
            let len = (PAGE_SIZE - curr.page_offset()).min(src.len() - done);

            let frame = self.user_access(id, curr, true)?;
            let offset = curr.page_offset();
            self.frames.frame_mut(frame)[offset..offset + len].copy_from_slice(&src[done..done + len]);

            done += len;
        }

        Ok(())
    }

    /// Translates `addr` like the MMU does, faulting if there is no usable mapping.
    ///
    /// Sets the accessed bit and, for writes, the dirty bit of the page.
    fn user_access(&mut self, id: AddressSpaceId, addr: VirtAddr, write: bool) -> Result<FrameId, VmError> {
        let mapping = space_ref(&self.spaces, id)?.page_table.get_mapping(addr);
        match mapping {
            Some(mapping) if write && !mapping.writable => {
                self.try_handle_fault(id, addr, true, true, false)?
            }
            Some(_) => {}
            None => self.try_handle_fault(id, addr, true, write, true)?,
        }

        let space = space_mut(&mut self.spaces, id)?;
        let frame = space
            .spt
            .find(addr)
            .and_then(|page| page.frame)
            .ok_or(VmError::InvalidAccess)?;

        space.page_table.set_accessed(addr, true);
        if write {
            space.page_table.set_dirty(addr, true);
        }
        Ok(frame)
    }
}
