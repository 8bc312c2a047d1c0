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

use super::{space_mut, space_ref, Vm};
use crate::{
    address::{VirtAddr, KERN_BASE, PAGE_SIZE},
    address_space::{AddressSpaceId, MappedRegion},
    modules::{
        block_device::BlockDeviceModule, file::FileModule, page_table::PageTableModule,
        physical_memory::PhysicalMemoryModule,
    },
    page::ContentSource,
    vm_error::VmError,
};

impl<D, M, P, F> Vm<D, M, P, F>
where
    D: BlockDeviceModule,
    M: PhysicalMemoryModule,
    P: PageTableModule,
    F: FileModule,
{
    /// Registers lazy pages starting at `va` whose content is produced by `source` on first access.
    ///
    /// Nothing is read or allocated here. Fails without changes if the range is not page
    /// aligned, leaves user space or overlaps present pages.
    pub fn reserve_lazy_region(
        &mut self,
        id: AddressSpaceId,
        va: VirtAddr,
        writable: bool,
        source: ContentSource<F>,
    ) -> Result<(), VmError> {
        let page_count = source.page_count().ok_or(VmError::InvalidArgument)?;
        check_user_range(va, page_count)?;

        let space = space_mut(&mut self.spaces, id)?;
        if space.spt.overlaps(va, page_count * PAGE_SIZE) {
            return Err(VmError::InvalidArgument);
        }

        for page in source.into_pages(va, writable)? {
            space.spt.insert(page);
        }

        trace!(
            "Reserved {} lazy pages at {} in space {}",
            page_count,
            va,
            id.index()
        );
        Ok(())
    }

    /// Destroys all pages in the `page_count` pages starting at `va`.
    ///
    /// Dirty file backed pages are written back first. Pages that do not exist are skipped.
    pub fn unmap_region(
        &mut self,
        id: AddressSpaceId,
        va: VirtAddr,
        page_count: usize,
    ) -> Result<(), VmError> {
        if !va.is_page_aligned() {
            return Err(VmError::InvalidArgument);
        }
        space_ref(&self.spaces, id)?;

        let mut result = Ok(());
        for i in 0..page_count {
            let Some(page) = va.checked_add(i * PAGE_SIZE) else {
                break;
            };
            if let Err(err) = self.destroy_page(id, page) {
                result = result.and(Err(err));
            }
        }

        let end = va.as_usize().saturating_add(page_count * PAGE_SIZE);
        space_mut(&mut self.spaces, id)?
            .mappings
            .retain(|x| x.start < va || x.start.as_usize() >= end);

        result
    }

    /// Maps `length` bytes of `file` starting at `offset` to `addr`.
    ///
    /// The mapping works on its own handle of the file, so `file` can be closed
    /// afterwards. Bytes behind the end of the file read as zero and are never
    /// written back.
    pub fn mmap(
        &mut self,
        id: AddressSpaceId,
        addr: VirtAddr,
        length: usize,
        writable: bool,
        file: &F,
        offset: u64,
    ) -> Result<VirtAddr, VmError> {
        if addr.as_usize() == 0
            || length == 0
            || length > KERN_BASE
            || offset % PAGE_SIZE as u64 != 0
            || file.length() == 0
        {
            return Err(VmError::InvalidArgument);
        }

        let file = file.duplicate().map_err(|_| VmError::Io)?;
        let source = ContentSource::Mapping {
            file,
            offset,
            length,
        };
        let page_count = source.page_count().ok_or(VmError::InvalidArgument)?;

        self.reserve_lazy_region(id, addr, writable, source)?;
        space_mut(&mut self.spaces, id)?.mappings.push(MappedRegion {
            start: addr,
            page_count,
        });

        debug!(
            "Mapped {} bytes at offset {} to {} in space {}",
            length,
            offset,
            addr,
            id.index()
        );
        Ok(addr)
    }

    /// Removes the mapping that was created by `mmap` at `addr`
    pub fn munmap(&mut self, id: AddressSpaceId, addr: VirtAddr) -> Result<(), VmError> {
        let region = space_ref(&self.spaces, id)?
            .mappings
            .iter()
            .find(|x| x.start == addr)
            .copied()
            .ok_or(VmError::InvalidArgument)?;

        debug!(
            "Unmapping {} pages at {} in space {}",
            region.page_count,
            addr,
            id.index()
        );
        self.unmap_region(id, region.start, region.page_count)
    }
}

/// `page_count` pages starting at `va` have to be page aligned user memory
fn check_user_range(va: VirtAddr, page_count: usize) -> Result<(), VmError> {
    if !va.is_page_aligned() || page_count == 0 {
        return Err(VmError::InvalidArgument);
    }

    let end = page_count
        .checked_mul(PAGE_SIZE)
        .and_then(|len| va.as_usize().checked_add(len))
        .ok_or(VmError::InvalidArgument)?;
    if end > KERN_BASE {
        return Err(VmError::InvalidArgument);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::check_user_range;
    use crate::{
        address::{VirtAddr, KERN_BASE, PAGE_SIZE},
        vm_error::VmError,
    };

    #[test]
    fn test_check_user_range() {
        assert_eq!(check_user_range(VirtAddr::new(PAGE_SIZE), 1), Ok(()));
        assert_eq!(
            check_user_range(VirtAddr::new(KERN_BASE - PAGE_SIZE), 1),
            Ok(())
        );
        assert_eq!(
            check_user_range(VirtAddr::new(KERN_BASE - PAGE_SIZE), 2),
            Err(VmError::InvalidArgument)
        );
        assert_eq!(
            check_user_range(VirtAddr::new(PAGE_SIZE + 1), 1),
            Err(VmError::InvalidArgument)
        );
        assert_eq!(
            check_user_range(VirtAddr::new(PAGE_SIZE), 0),
            Err(VmError::InvalidArgument)
        );
        assert_eq!(
            check_user_range(VirtAddr::new(PAGE_SIZE), usize::MAX),
            Err(VmError::InvalidArgument)
        );
    }
}
