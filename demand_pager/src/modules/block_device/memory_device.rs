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

use super::{BlockDeviceModule, DEFAULT_SECTOR_SIZE};

/// Block device that keeps all sectors in RAM
pub struct MemoryBlockDeviceModule {
    data: Vec<u8>,
    sector_size: usize,
}

impl MemoryBlockDeviceModule {
    pub fn new(sector_count: usize) -> Self {
        Self::with_sector_size(sector_count, DEFAULT_SECTOR_SIZE)
    }

    pub fn with_sector_size(sector_count: usize, sector_size: usize) -> Self {
        assert!(sector_size > 0, "sector size has to be positive");
        Self {
            data: vec![0u8; sector_count * sector_size],
            sector_size,
        }
    }

    fn range(&self, sector: usize) -> core::ops::Range<usize> {
        let start = sector * self.sector_size;
        start..start + self.sector_size
    }
}

impl BlockDeviceModule for MemoryBlockDeviceModule {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> usize {
        self.data.len() / self.sector_size
    }

    fn read_sector(&mut self, sector: usize, dest: &mut [u8]) -> Result<(), ()> {
        if sector >= self.sector_count() || dest.len() != self.sector_size {
            return Err(());
        }

        dest.copy_from_slice(&self.data[self.range(sector)]);
        Ok(())
    }

    fn write_sector(&mut self, sector: usize, src: &[u8]) -> Result<(), ()> {
        if sector >= self.sector_count() || src.len() != self.sector_size {
            return Err(());
        }

        let range = self.range(sector);
        self.data[range].copy_from_slice(src);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::modules::block_device::{test::test_block_device_normal, BlockDeviceModule};

    use super::MemoryBlockDeviceModule;

    #[test]
    fn test_memory_block_device_normal() {
        test_block_device_normal(MemoryBlockDeviceModule::new(16));
    }

    #[test]
    fn test_memory_block_device_out_of_range() {
        let mut device = MemoryBlockDeviceModule::with_sector_size(2, 64);
        let mut buffer = [0u8; 64];
        assert!(device.read_sector(2, &mut buffer).is_err());
        assert!(device.write_sector(2, &buffer).is_err());

        // wrong buffer size
        assert!(device.read_sector(0, &mut buffer[..32]).is_err());
    }
}
