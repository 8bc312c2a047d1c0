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

use log::{debug, warn};

use super::{space_mut, space_ref, Vm};
use crate::{
    address::VirtAddr,
    address_space::{AddressSpace, AddressSpaceId},
    frame_table::FrameId,
    modules::{
        block_device::BlockDeviceModule, file::FileModule, page_table::PageTableModule,
        physical_memory::PhysicalMemoryModule,
    },
    page::{anon::AnonPage, file_backed::FilePage, Page, PageState},
    vm_error::VmError,
};

/// What the child needs to rebuild one page of the parent
enum PageCopy<F: FileModule> {
    /// Inserted as is, content follows later
    Lazy(Page<F>),

    /// An anonymous page whose content has to be copied right away
    Eager { va: VirtAddr, writable: bool, stack: bool },
}

impl<D, M, P, F> Vm<D, M, P, F>
where
    D: BlockDeviceModule,
    M: PhysicalMemoryModule,
    P: PageTableModule,
    F: FileModule,
{
    /// Creates a child address space that is a copy of `parent`
    pub fn fork(&mut self, parent: AddressSpaceId) -> Result<AddressSpaceId, VmError> {
        space_ref(&self.spaces, parent)?;

        let child = self.create_address_space();
        if let Err(err) = self.copy_address_space(child, parent) {
            if let Err(destroy_err) = self.destroy_address_space(child) {
                warn!(
                    "Could not destroy failed child {}: {}",
                    child.index(),
                    destroy_err
                );
            }
            return Err(err);
        }

        Ok(child)
    }

    /// Duplicates all pages of `src` into the empty address space `dst`.
    ///
    /// Never accessed pages stay lazy, anonymous pages are copied and file backed pages
    /// read their content from the file again. If anything fails, `dst` is empty again.
    pub fn copy_address_space(
        &mut self,
        dst: AddressSpaceId,
        src: AddressSpaceId,
    ) -> Result<(), VmError> {
        if dst == src {
            return Err(VmError::InvalidArgument);
        }
        space_ref(&self.spaces, src)?;
        if space_ref(&self.spaces, dst)?.spt.len() != 0 {
            return Err(VmError::InvalidArgument);
        }

        if let Err(err) = self.copy_pages(dst, src) {
            warn!(
                "Copy of space {} into {} failed: {}",
                src.index(),
                dst.index(),
                err
            );
            if let Err(destroy_err) = self.destroy_all_pages(dst) {
                warn!(
                    "Cleanup of space {} failed: {}",
                    dst.index(),
                    destroy_err
                );
            }
            return Err(err);
        }

        let (stack_bottom, mappings) = {
            let src = space_ref(&self.spaces, src)?;
            (src.stack_bottom, src.mappings.clone())
        };
        let dst_space = space_mut(&mut self.spaces, dst)?;
        dst_space.stack_bottom = stack_bottom;
        dst_space.mappings = mappings;

        debug!(
            "Copied {} pages of space {} into {}",
            dst_space.spt.len(),
            src.index(),
            dst.index()
        );
        Ok(())
    }

    fn copy_pages(&mut self, dst: AddressSpaceId, src: AddressSpaceId) -> Result<(), VmError> {
        for va in space_ref(&self.spaces, src)?.spt.addresses() {
            match self.prepare_copy(src, va)? {
                PageCopy::Lazy(page) => space_mut(&mut self.spaces, dst)?.spt.insert(page),
                PageCopy::Eager {
                    va,
                    writable,
                    stack,
                } => {
                    let page = Page::new(va, writable, PageState::Anonymous(AnonPage::new(stack)));
                    space_mut(&mut self.spaces, dst)?.spt.insert(page);
                    self.copy_anonymous(dst, src, va)?;
                }
            }
        }

        Ok(())
    }

    fn prepare_copy(&mut self, src: AddressSpaceId, va: VirtAddr) -> Result<PageCopy<F>, VmError> {
        let AddressSpace {
            spt, page_table, ..
        } = space_mut(&mut self.spaces, src)?;
        let page = spt.find_mut(va).ok_or(VmError::InvalidAccess)?;
        let writable = page.writable;

        Ok(match &mut page.state {
            PageState::Uninit(uninit) => PageCopy::Lazy(Page::new_uninit(
                va,
                writable,
                uninit.duplicate()?,
            )),
            PageState::Anonymous(anon) => PageCopy::Eager {
                va,
                writable,
                stack: anon.stack,
            },
            PageState::FileBacked(file) => {
                // the child reads the file, so it has to be up to date
                if let Some(frame) = page.frame {
                    file.write_back(va, self.frames.frame(frame), page_table)?;
                }

                let file = FilePage::new(
                    file.file.duplicate().map_err(|_| VmError::Io)?,
                    file.offset,
                    file.length,
                );
                PageCopy::Lazy(Page::new(va, writable, PageState::FileBacked(file)))
            }
        })
    }

    /// Gives the child page at `va` its own frame holding the content of the parent page
    fn copy_anonymous(
        &mut self,
        dst: AddressSpaceId,
        src: AddressSpaceId,
        va: VirtAddr,
    ) -> Result<(), VmError> {
        // may evict the parent page, so its location is looked up afterwards
        let frame = self.acquire_frame()?;

        let result = self
            .copy_parent_content(src, va, frame)
            .and_then(|()| self.install_frame(dst, va, frame));
        if result.is_err() {
            self.frames.frame_mut(frame).fill(0);
            self.frames.release(frame);
        }
        result
    }

    fn copy_parent_content(
        &mut self,
        src: AddressSpaceId,
        va: VirtAddr,
        frame: FrameId,
    ) -> Result<(), VmError> {
        let page = space_ref(&self.spaces, src)?
            .spt
            .find(va)
            .ok_or(VmError::InvalidAccess)?;

        match (&page.state, page.frame) {
            (_, Some(parent_frame)) => {
                self.frames.copy(parent_frame, frame);
                Ok(())
            }
            (PageState::Anonymous(AnonPage { slot: Some(slot), .. }), None) => {
                // the slot stays with the parent
                self.swap.read_slot(*slot, self.frames.frame_mut(frame))
            }
            (PageState::Anonymous(AnonPage { slot: None, .. }), None) => {
                self.frames.frame_mut(frame).fill(0);
                Ok(())
            }
            _ => unreachable!("page {} is not anonymous", va),
        }
    }
}
