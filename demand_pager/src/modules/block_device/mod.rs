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

mod file_device;
mod memory_device;

pub use file_device::FileBlockDeviceModule;
pub use memory_device::MemoryBlockDeviceModule;

/// Sector size of the disks the swap store is usually placed on
pub const DEFAULT_SECTOR_SIZE: usize = 512;

/// A disk that can only be accessed in whole sectors
pub trait BlockDeviceModule {
    /// Size of one sector in bytes.
    ///
    /// This should be the same value on every call or things might break.
    fn sector_size(&self) -> usize {
        DEFAULT_SECTOR_SIZE
    }

    /// Returns the number of sectors of this device
    fn sector_count(&self) -> usize;

    /// Reads sector `sector` into `dest` which is exactly `sector_size()` bytes big.
    ///
    /// If this call fails, it could be that already some data was written to `dest`.
    fn read_sector(&mut self, sector: usize, dest: &mut [u8]) -> Result<(), ()>;

    /// Writes `src` which is exactly `sector_size()` bytes big to sector `sector`
    fn write_sector(&mut self, sector: usize, src: &[u8]) -> Result<(), ()>;
}

#[cfg(test)]
pub(crate) mod test {
    use super::BlockDeviceModule;

    fn gen_number(i: usize) -> u8 {
        (i * 3 + (i % 3) * 7 + (i % 11) * 51) as u8
    }

    /// test if write saves all sectors and read restores all of them
    pub(crate) fn test_block_device_normal<T: BlockDeviceModule>(mut device: T) {
        let sector_size = device.sector_size();
        let sector_count = device.sector_count();

        let mut buffer = vec![0u8; sector_size];
        for sector in 0..sector_count {
            for (i, x) in buffer.iter_mut().enumerate() {
                *x = gen_number(sector * sector_size + i);
            }
            device.write_sector(sector, &buffer).unwrap();
        }

        // read in reverse order, so that a device that only remembers
        // the last write would fail
        for sector in (0..sector_count).rev() {
            device.read_sector(sector, &mut buffer).unwrap();
            for (i, x) in buffer.iter().enumerate() {
                assert_eq!(*x, gen_number(sector * sector_size + i), "sector {} byte {}", sector, i);
            }
        }
    }
}
