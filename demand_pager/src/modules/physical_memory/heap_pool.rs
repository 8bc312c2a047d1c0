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

use super::{PhysAddr, PhysicalMemoryModule};
use crate::{address::PAGE_SIZE, util::bit_array::BitArray};

/// Base address of the first frame, so that no frame is located at `0`
const POOL_BASE: usize = 0x10_0000;

/// A user pool with a fixed amount of frames, all allocated on the host heap
pub struct HeapPhysicalMemoryModule {
    frames: Vec<Box<[u8; PAGE_SIZE]>>,
    used: BitArray,
}

impl HeapPhysicalMemoryModule {
    pub fn new(frame_count: usize) -> Self {
        Self {
            frames: (0..frame_count).map(|_| Box::new([0u8; PAGE_SIZE])).collect(),
            used: BitArray::new(frame_count),
        }
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn free_count(&self) -> usize {
        self.capacity() - self.used.count_set()
    }

    fn index_of(&self, addr: PhysAddr) -> usize {
        let raw = addr.as_usize();
        assert!(
            raw >= POOL_BASE && (raw - POOL_BASE) % PAGE_SIZE == 0,
            "{:?} is not a frame of this pool",
            addr
        );

        let index = (raw - POOL_BASE) / PAGE_SIZE;
        assert!(index < self.frames.len(), "{:?} is not a frame of this pool", addr);
        index
    }
}

impl PhysicalMemoryModule for HeapPhysicalMemoryModule {
    fn alloc_user_page(&mut self) -> Option<PhysAddr> {
        let index = self.used.first_unset()?;
        self.used.set(true, index);

        Some(PhysAddr::new(POOL_BASE + index * PAGE_SIZE))
    }

    fn free_user_page(&mut self, addr: PhysAddr) {
        let index = self.index_of(addr);
        assert!(self.used.is_set(index), "double free of {:?}", addr);
        self.used.set(false, index);
    }

    fn frame(&self, addr: PhysAddr) -> &[u8] {
        &self.frames[self.index_of(addr)][..]
    }

    fn frame_mut(&mut self, addr: PhysAddr) -> &mut [u8] {
        let index = self.index_of(addr);
        &mut self.frames[index][..]
    }

    fn copy_frame(&mut self, src: PhysAddr, dest: PhysAddr) {
        let src = self.index_of(src);
        let dest = self.index_of(dest);
        if src == dest {
            return;
        }

        let data = *self.frames[src];
        self.frames[dest].copy_from_slice(&data);
    }
}

#[cfg(test)]
mod test {
    use super::HeapPhysicalMemoryModule;
    use crate::modules::physical_memory::PhysicalMemoryModule;

    #[test]
    fn test_pool_exhaustion() {
        let mut pool = HeapPhysicalMemoryModule::new(3);
        let a = pool.alloc_user_page().unwrap();
        let b = pool.alloc_user_page().unwrap();
        let c = pool.alloc_user_page().unwrap();
        assert!(pool.alloc_user_page().is_none());
        assert_ne!(a, b);
        assert_ne!(b, c);

        pool.free_user_page(b);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.alloc_user_page(), Some(b));
    }

    #[test]
    fn test_copy_frame() {
        let mut pool = HeapPhysicalMemoryModule::new(2);
        let a = pool.alloc_user_page().unwrap();
        let b = pool.alloc_user_page().unwrap();

        pool.frame_mut(a).fill(0x5a);
        pool.copy_frame(a, b);
        assert!(pool.frame(b).iter().all(|x| *x == 0x5a));

        // frames stay independent after the copy
        pool.frame_mut(b)[0] = 1;
        assert_eq!(pool.frame(a)[0], 0x5a);
    }

    #[test]
    #[should_panic]
    fn test_double_free() {
        let mut pool = HeapPhysicalMemoryModule::new(1);
        let a = pool.alloc_user_page().unwrap();
        pool.free_user_page(a);
        pool.free_user_page(a);
    }
}
