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

mod claim;
mod fault;
mod fork;
mod region;

use std::collections::HashSet;

use log::{debug, info};

use crate::{
    address::{VirtAddr, PAGE_SIZE},
    address_space::{AddressSpace, AddressSpaceId, MappedRegion},
    frame_table::{FrameOwner, FrameTable},
    modules::{
        block_device::BlockDeviceModule, file::FileModule, page_table::PageTableModule,
        physical_memory::PhysicalMemoryModule,
    },
    page::{PageInfo, PageState, PageType},
    swap_table::SwapTable,
    vm_config::VmConfig,
    vm_error::VmError,
};

/// The virtual memory subsystem.
///
/// Owns the swap disk, the frames of all user pages and every address space.
/// All operations take `&mut self`, so frame table and clock hand are never
/// modified concurrently.
pub struct Vm<D, M, P, F>
where
    D: BlockDeviceModule,
    M: PhysicalMemoryModule,
    P: PageTableModule,
    F: FileModule,
{
    config: VmConfig,
    swap: SwapTable<D>,
    frames: FrameTable<M>,

    /// Address spaces by `AddressSpaceId`, destroyed spaces leave a hole
    spaces: Vec<Option<AddressSpace<P, F>>>,
}

impl<D, M, P, F> Vm<D, M, P, F>
where
    D: BlockDeviceModule,
    M: PhysicalMemoryModule,
    P: PageTableModule,
    F: FileModule,
{
    /// Sets up swap table, frame table and eviction state.
    ///
    /// Has to happen before the first address space is created.
    pub fn new(config: VmConfig, swap_device: D, memory: M) -> Result<Self, VmError> {
        if !config.user_stack_top.is_page_aligned()
            || !config.user_stack_top.is_user()
            || config.max_stack_size % PAGE_SIZE != 0
            || config.max_stack_size > config.user_stack_top.as_usize()
        {
            return Err(VmError::InvalidArgument);
        }

        let swap = SwapTable::new(swap_device);
        info!(
            "Virtual memory with {} swap slots, stack limit {}",
            swap.slot_count(),
            config.stack_limit()
        );

        Ok(Self {
            config,
            swap,
            frames: FrameTable::new(memory),
            spaces: Vec::new(),
        })
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Creates a new and empty address space
    pub fn create_address_space(&mut self) -> AddressSpaceId {
        let space = Some(AddressSpace::new());

        let index = match self.spaces.iter().position(|x| x.is_none()) {
            Some(index) => {
                self.spaces[index] = space;
                index
            }
            None => {
                self.spaces.push(space);
                self.spaces.len() - 1
            }
        };

        debug!("Created address space {}", index);
        AddressSpaceId::from_index(index)
    }

    /// Tears down all pages of `id` and releases the address space.
    ///
    /// Dirty file backed pages are written back. The space is gone afterwards even if
    /// writing back some page failed, the first error is returned in that case.
    pub fn destroy_address_space(&mut self, id: AddressSpaceId) -> Result<(), VmError> {
        space_ref(&self.spaces, id)?;

        let result = self.destroy_all_pages(id);
        self.spaces[id.index()] = None;

        debug!("Destroyed address space {}", id.index());
        result
    }

    /// Loads the page table of `id` into the MMU
    pub fn activate(&self, id: AddressSpaceId) -> Result<(), VmError> {
        space_ref(&self.spaces, id)?.page_table.activate();
        Ok(())
    }

    pub fn page_info(&self, id: AddressSpaceId, va: VirtAddr) -> Option<PageInfo> {
        let space = space_ref(&self.spaces, id).ok()?;
        space.spt.find(va).map(|page| page.info())
    }

    /// Effective type of the page at `va`, also for pages that were never accessed
    pub fn page_type(&self, id: AddressSpaceId, va: VirtAddr) -> Option<PageType> {
        self.page_info(id, va).map(|info| info.page_type)
    }

    pub fn is_resident(&self, id: AddressSpaceId, va: VirtAddr) -> bool {
        self.page_info(id, va).is_some_and(|info| info.resident)
    }

    /// Number of pages `id` holds, resident or not
    pub fn page_count(&self, id: AddressSpaceId) -> usize {
        space_ref(&self.spaces, id).map_or(0, |space| space.spt.len())
    }

    /// Lowest page of the stack of `id`
    pub fn stack_bottom(&self, id: AddressSpaceId) -> Option<VirtAddr> {
        space_ref(&self.spaces, id).ok()?.stack_bottom
    }

    pub fn mappings(&self, id: AddressSpaceId) -> &[MappedRegion] {
        match space_ref(&self.spaces, id) {
            Ok(space) => &space.mappings,
            Err(_) => &[],
        }
    }

    pub fn swap_slot_count(&self) -> usize {
        self.swap.slot_count()
    }

    pub fn swap_slots_in_use(&self) -> Result<usize, VmError> {
        self.swap.used_count()
    }

    /// Frames that are currently handed out to user pages
    pub fn resident_frame_count(&self) -> usize {
        self.frames.allocated_count()
    }

    /// Checks that frames, pages, page tables and swap slots agree with each other.
    ///
    /// Panics on the first inconsistency.
    pub fn check_integrity(&self) {
        // every owned frame is referenced by exactly the page it names
        for (frame, owner) in self.frames.allocated() {
            let Some(owner) = owner else {
                panic!("frame {:?} is allocated without owner", frame);
            };
            let space = live_space_ref(&self.spaces, owner.space);
            let page = space
                .spt
                .find(owner.va)
                .unwrap_or_else(|| panic!("frame {:?} is owned by missing page {}", frame, owner.va));
            assert_eq!(page.frame, Some(frame), "page {} does not link back", owner.va);

            let mapping = space.page_table.get_mapping(owner.va);
            assert_eq!(
                mapping.map(|x| x.frame),
                Some(self.frames.kva(frame)),
                "page {} is not mapped to its frame",
                owner.va
            );
        }

        let mut slots = HashSet::new();
        for (index, space) in self.spaces.iter().enumerate() {
            let Some(space) = space else { continue };
            let id = AddressSpaceId::from_index(index);

            for page in space.spt.iter() {
                match page.frame {
                    Some(frame) => assert_eq!(
                        self.frames.owner(frame),
                        Some(FrameOwner { space: id, va: page.va }),
                        "frame of page {} names another owner",
                        page.va
                    ),
                    None => assert!(
                        !space.page_table.is_resident(page.va),
                        "non resident page {} is mapped",
                        page.va
                    ),
                }

                if let PageState::Anonymous(anon) = &page.state {
                    if let Some(slot) = anon.slot {
                        assert!(page.frame.is_none(), "resident page {} holds a slot", page.va);
                        assert!(slots.insert(slot), "slot {:?} is shared", slot);
                        assert!(
                            matches!(self.swap.is_used(slot), Ok(true)),
                            "slot {:?} of {} is not marked used",
                            slot,
                            page.va
                        );
                    }
                }
            }
        }

        assert_eq!(
            self.swap.used_count().ok(),
            Some(slots.len()),
            "swap slots are leaked"
        );
    }

    /// Destroys every page of `id`, continuing after failures
    fn destroy_all_pages(&mut self, id: AddressSpaceId) -> Result<(), VmError> {
        let addresses = space_ref(&self.spaces, id)?.spt.addresses();

        let mut result = Ok(());
        for va in addresses {
            if let Err(err) = self.destroy_page(id, va) {
                result = result.and(Err(err));
            }
        }

        let space = space_mut(&mut self.spaces, id)?;
        space.stack_bottom = None;
        space.mappings.clear();
        result
    }

    /// Removes the page at `va` and releases everything it holds
    fn destroy_page(&mut self, id: AddressSpaceId, va: VirtAddr) -> Result<(), VmError> {
        let space = space_mut(&mut self.spaces, id)?;
        let Some(page) = space.spt.remove(va) else {
            return Ok(());
        };

        let frame = page.frame;
        let frames = &self.frames;
        let result = page.destroy(
            frame.map(|x| frames.frame(x)),
            &mut space.page_table,
            &self.swap,
        );

        if let Some(frame) = frame {
            self.frames.take_owner(frame);
            self.frames.release(frame);
        }

        result
    }
}

fn space_ref<P: PageTableModule, F: FileModule>(
    spaces: &[Option<AddressSpace<P, F>>],
    id: AddressSpaceId,
) -> Result<&AddressSpace<P, F>, VmError> {
    spaces
        .get(id.index())
        .and_then(|x| x.as_ref())
        .ok_or(VmError::InvalidArgument)
}

fn space_mut<P: PageTableModule, F: FileModule>(
    spaces: &mut [Option<AddressSpace<P, F>>],
    id: AddressSpaceId,
) -> Result<&mut AddressSpace<P, F>, VmError> {
    spaces
        .get_mut(id.index())
        .and_then(|x| x.as_mut())
        .ok_or(VmError::InvalidArgument)
}

/// Address space that is referenced by a frame, which always exists
fn live_space_ref<P: PageTableModule, F: FileModule>(
    spaces: &[Option<AddressSpace<P, F>>],
    id: AddressSpaceId,
) -> &AddressSpace<P, F> {
    space_ref(spaces, id)
        .unwrap_or_else(|_| panic!("frame references dead address space {}", id.index()))
}

fn live_space_mut<P: PageTableModule, F: FileModule>(
    spaces: &mut [Option<AddressSpace<P, F>>],
    id: AddressSpaceId,
) -> &mut AddressSpace<P, F> {
    space_mut(spaces, id)
        .unwrap_or_else(|_| panic!("frame references dead address space {}", id.index()))
}
