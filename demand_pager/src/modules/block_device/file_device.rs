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

use std::{
    fs::{remove_file, File},
    io::{Read, Seek, SeekFrom, Write},
    mem::ManuallyDrop,
    path::{Path, PathBuf},
};

use super::{BlockDeviceModule, DEFAULT_SECTOR_SIZE};

/// Block device that stores its sectors inside of a host file.
///
/// The file is created (and truncated) on construction and removed again on drop.
pub struct FileBlockDeviceModule {
    /// underlying file that holds all sectors
    file: ManuallyDrop<File>,

    /// path of file, save for deleting file later
    file_path: PathBuf,

    /// cached sector count, so no `metadata` call necessary
    sector_count: usize,
}

impl FileBlockDeviceModule {
    pub fn new<P: AsRef<Path>>(file_path: P, sector_count: usize) -> std::io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .truncate(true)
            .create(true)
            .open(file_path.as_ref())?;

        file.set_len((sector_count * DEFAULT_SECTOR_SIZE) as u64)?;

        Ok(Self {
            file: ManuallyDrop::new(file),
            file_path: file_path.as_ref().to_path_buf(),
            sector_count,
        })
    }

    fn seek_to(&mut self, sector: usize) -> Result<(), ()> {
        if sector >= self.sector_count {
            return Err(());
        }

        self.file
            .seek(SeekFrom::Start((sector * DEFAULT_SECTOR_SIZE) as u64))
            .map_err(|_| ())?;
        Ok(())
    }
}

impl BlockDeviceModule for FileBlockDeviceModule {
    fn sector_count(&self) -> usize {
        self.sector_count
    }

    fn read_sector(&mut self, sector: usize, dest: &mut [u8]) -> Result<(), ()> {
        debug_assert_eq!(dest.len(), DEFAULT_SECTOR_SIZE, "illegal read size");

        self.seek_to(sector)?;
        self.file.read_exact(dest).map_err(|_| ())?;

        Ok(())
    }

    fn write_sector(&mut self, sector: usize, src: &[u8]) -> Result<(), ()> {
        debug_assert_eq!(src.len(), DEFAULT_SECTOR_SIZE, "illegal write size");

        self.seek_to(sector)?;
        self.file.write_all(src).map_err(|_| ())?;

        Ok(())
    }
}

impl Drop for FileBlockDeviceModule {
    fn drop(&mut self) {
        // drop and close file before removing
        // note that after this call, file should never be accessed again...
        unsafe {
            ManuallyDrop::drop(&mut self.file);
        }

        if self.file_path.exists() {
            let _ = remove_file(&self.file_path);
        }
    }
}
