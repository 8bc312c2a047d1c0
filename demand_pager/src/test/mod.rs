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

use std::{cell::Cell, rc::Rc};

use rand::{rngs::SmallRng, RngCore};

use crate::{
    address::PAGE_SIZE,
    modules::{
        block_device::{BlockDeviceModule, MemoryBlockDeviceModule, DEFAULT_SECTOR_SIZE},
        file::MemoryFileModule,
        page_table::SoftPageTableModule,
        physical_memory::HeapPhysicalMemoryModule,
    },
    Vm, VmConfig,
};

mod mmap;
mod swap;

pub(crate) type TestVm<D = MemoryBlockDeviceModule> =
    Vm<D, HeapPhysicalMemoryModule, SoftPageTableModule, MemoryFileModule>;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Virtual memory with `frame_count` frames and room for `swap_slots` evicted pages
pub(crate) fn get_test_vm(frame_count: usize, swap_slots: usize) -> TestVm {
    init_logger();

    let device = MemoryBlockDeviceModule::new(swap_slots * PAGE_SIZE / DEFAULT_SECTOR_SIZE);
    Vm::new(
        VmConfig::default(),
        device,
        HeapPhysicalMemoryModule::new(frame_count),
    )
    .unwrap()
}

pub(crate) fn rand_page(rand: &mut SmallRng) -> Vec<u8> {
    let mut data = vec![0u8; PAGE_SIZE];
    rand.fill_bytes(&mut data);
    data
}

/// Block device whose transfers fail while the shared switch is on
pub(crate) struct FaultyBlockDevice {
    inner: MemoryBlockDeviceModule,
    failing: Rc<Cell<bool>>,
}

impl FaultyBlockDevice {
    pub(crate) fn new(sector_count: usize) -> (Self, Rc<Cell<bool>>) {
        let failing = Rc::new(Cell::new(false));
        let device = Self {
            inner: MemoryBlockDeviceModule::new(sector_count),
            failing: failing.clone(),
        };
        (device, failing)
    }
}

impl BlockDeviceModule for FaultyBlockDevice {
    fn sector_size(&self) -> usize {
        self.inner.sector_size()
    }

    fn sector_count(&self) -> usize {
        self.inner.sector_count()
    }

    fn read_sector(&mut self, sector: usize, dest: &mut [u8]) -> Result<(), ()> {
        if self.failing.get() {
            return Err(());
        }
        self.inner.read_sector(sector, dest)
    }

    fn write_sector(&mut self, sector: usize, src: &[u8]) -> Result<(), ()> {
        if self.failing.get() {
            return Err(());
        }
        self.inner.write_sector(sector, src)
    }
}
