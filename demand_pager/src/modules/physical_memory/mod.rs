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

mod heap_pool;

use core::fmt;

pub use heap_pool::HeapPhysicalMemoryModule;

use crate::address::PAGE_SIZE;

/// Physical base address of a frame
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(usize);

impl PhysAddr {
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{:#x}", self.0)
    }
}

/// The pool of physical pages that can be handed out to user processes
pub trait PhysicalMemoryModule {
    /// Returns a new page sized frame or `None` if the pool is exhausted.
    ///
    /// The content of the returned frame is unspecified.
    fn alloc_user_page(&mut self) -> Option<PhysAddr>;

    /// Returns a frame that was handed out by `alloc_user_page` to the pool
    fn free_user_page(&mut self, addr: PhysAddr);

    /// Memory of the frame at `addr`, always `PAGE_SIZE` bytes
    fn frame(&self, addr: PhysAddr) -> &[u8];

    /// Mutable memory of the frame at `addr`, always `PAGE_SIZE` bytes
    fn frame_mut(&mut self, addr: PhysAddr) -> &mut [u8];

    /// Copies the content of frame `src` into frame `dest`
    fn copy_frame(&mut self, src: PhysAddr, dest: PhysAddr) {
        let mut buffer = [0u8; PAGE_SIZE];
        buffer.copy_from_slice(self.frame(src));
        self.frame_mut(dest).copy_from_slice(&buffer);
    }
}
