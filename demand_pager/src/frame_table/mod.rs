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

mod clock;

use log::trace;

use crate::{
    address::VirtAddr,
    address_space::AddressSpaceId,
    modules::physical_memory::{PhysAddr, PhysicalMemoryModule},
};
use clock::ClockHand;

/// Index of a frame inside of the frame table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct FrameId(usize);

/// The page that is resident in a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameOwner {
    pub(crate) space: AddressSpaceId,
    pub(crate) va: VirtAddr,
}

struct FrameEntry {
    kva: PhysAddr,

    /// `None` while the frame is being filled or evicted
    owner: Option<FrameOwner>,
}

/// All frames that are currently handed out to user pages
pub(crate) struct FrameTable<M: PhysicalMemoryModule> {
    memory: M,

    /// Entries in allocation order, released entries are reused by the next allocation
    entries: Vec<Option<FrameEntry>>,

    clock: ClockHand,
}

impl<M: PhysicalMemoryModule> FrameTable<M> {
    pub(crate) fn new(memory: M) -> Self {
        Self {
            memory,
            entries: Vec::new(),
            clock: ClockHand::new(),
        }
    }

    /// Takes a frame from the physical pool without evicting anything
    pub(crate) fn try_allocate(&mut self) -> Option<FrameId> {
        let kva = self.memory.alloc_user_page()?;
        let entry = FrameEntry { kva, owner: None };

        let index = match self.entries.iter().position(|x| x.is_none()) {
            Some(index) => {
                self.entries[index] = Some(entry);
                index
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        };

        trace!("Allocate frame {} at {:?}", index, kva);
        Some(FrameId(index))
    }

    /// Gives the frame back to the physical pool
    pub(crate) fn release(&mut self, id: FrameId) {
        let entry = self.entries[id.0]
            .take()
            .unwrap_or_else(|| panic!("release of free frame {}", id.0));
        self.memory.free_user_page(entry.kva);

        trace!("Release frame {} at {:?}", id.0, entry.kva);
    }

    /// Chooses a frame whose page should be evicted.
    ///
    /// `test_and_clear_accessed` returns and clears the accessed bit of the page of a frame.
    /// Frames without owner are skipped.
    pub(crate) fn select_victim<T: FnMut(FrameOwner) -> bool>(
        &mut self,
        mut test_and_clear_accessed: T,
    ) -> Option<FrameId> {
        let entries = &self.entries;
        self.clock
            .select_victim(entries.len(), |i| {
                let owner = entries[i].as_ref()?.owner?;
                Some(test_and_clear_accessed(owner))
            })
            .map(FrameId)
    }

    fn entry(&self, id: FrameId) -> &FrameEntry {
        self.entries[id.0]
            .as_ref()
            .unwrap_or_else(|| panic!("frame {} is not allocated", id.0))
    }

    fn entry_mut(&mut self, id: FrameId) -> &mut FrameEntry {
        self.entries[id.0]
            .as_mut()
            .unwrap_or_else(|| panic!("frame {} is not allocated", id.0))
    }

    pub(crate) fn kva(&self, id: FrameId) -> PhysAddr {
        self.entry(id).kva
    }

    pub(crate) fn owner(&self, id: FrameId) -> Option<FrameOwner> {
        self.entry(id).owner
    }

    pub(crate) fn set_owner(&mut self, id: FrameId, owner: FrameOwner) {
        let entry = self.entry_mut(id);
        assert!(
            entry.owner.is_none(),
            "frame {} already holds {:?}",
            id.0,
            entry.owner
        );
        entry.owner = Some(owner);
    }

    pub(crate) fn take_owner(&mut self, id: FrameId) -> Option<FrameOwner> {
        self.entry_mut(id).owner.take()
    }

    pub(crate) fn frame(&self, id: FrameId) -> &[u8] {
        self.memory.frame(self.entry(id).kva)
    }

    pub(crate) fn frame_mut(&mut self, id: FrameId) -> &mut [u8] {
        let kva = self.entry(id).kva;
        self.memory.frame_mut(kva)
    }

    pub(crate) fn copy(&mut self, src: FrameId, dest: FrameId) {
        let src = self.entry(src).kva;
        let dest = self.entry(dest).kva;
        self.memory.copy_frame(src, dest);
    }

    /// Frames that are currently allocated
    pub(crate) fn allocated(&self) -> impl Iterator<Item = (FrameId, Option<FrameOwner>)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, x)| x.as_ref().map(|entry| (FrameId(i), entry.owner)))
    }

    pub(crate) fn allocated_count(&self) -> usize {
        self.entries.iter().filter(|x| x.is_some()).count()
    }
}

#[cfg(test)]
mod test {
    use super::{FrameOwner, FrameTable};
    use crate::{
        address::{VirtAddr, PAGE_SIZE},
        address_space::AddressSpaceId,
        modules::physical_memory::HeapPhysicalMemoryModule,
    };

    fn owner(i: usize) -> FrameOwner {
        FrameOwner {
            space: AddressSpaceId::from_index(0),
            va: VirtAddr::new(i * PAGE_SIZE),
        }
    }

    #[test]
    fn test_allocate_and_reuse_entries() {
        let mut frames = FrameTable::new(HeapPhysicalMemoryModule::new(2));
        let a = frames.try_allocate().unwrap();
        let b = frames.try_allocate().unwrap();
        assert!(frames.try_allocate().is_none());
        assert_eq!(frames.allocated_count(), 2);

        frames.release(a);
        assert_eq!(frames.allocated_count(), 1);

        // the released entry and its frame are handed out again
        let c = frames.try_allocate().unwrap();
        assert_eq!(c, a);
        assert_ne!(frames.kva(c), frames.kva(b));
    }

    #[test]
    fn test_victim_skips_frames_without_owner() {
        let mut frames = FrameTable::new(HeapPhysicalMemoryModule::new(3));
        let a = frames.try_allocate().unwrap();
        let b = frames.try_allocate().unwrap();
        let _c = frames.try_allocate().unwrap();

        frames.set_owner(a, owner(1));
        frames.set_owner(b, owner(2));

        // both lost their chance on the first sweep, c is never considered
        let mut accessed = vec![true, true];
        let victim = frames.select_victim(|owner| {
            let index = owner.va.as_usize() / PAGE_SIZE - 1;
            let prev = accessed[index];
            accessed[index] = false;
            prev
        });
        assert_eq!(victim, Some(a));

        assert_eq!(frames.take_owner(a), Some(owner(1)));
        assert_eq!(frames.owner(a), None);
    }

    #[test]
    #[should_panic]
    fn test_double_owner_panics() {
        let mut frames = FrameTable::new(HeapPhysicalMemoryModule::new(1));
        let a = frames.try_allocate().unwrap();
        frames.set_owner(a, owner(1));
        frames.set_owner(a, owner(2));
    }
}
