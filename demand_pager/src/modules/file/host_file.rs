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
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use super::FileModule;

/// Handle of a regular file of the host file system
pub struct HostFileModule {
    file: File,

    /// path of file, to open independent handles later
    file_path: PathBuf,

    position: u64,
}

impl HostFileModule {
    /// Opens an existing file for reading and writing
    pub fn open<P: AsRef<Path>>(file_path: P) -> std::io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(file_path.as_ref())?;

        Ok(Self {
            file,
            file_path: file_path.as_ref().to_path_buf(),
            position: 0,
        })
    }

    /// Creates (or truncates) a file with the given content
    pub fn create<P: AsRef<Path>>(file_path: P, content: &[u8]) -> std::io::Result<Self> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .truncate(true)
            .create(true)
            .open(file_path.as_ref())?;
        file.write_all(content)?;

        Ok(Self {
            file,
            file_path: file_path.as_ref().to_path_buf(),
            position: 0,
        })
    }
}

impl FileModule for HostFileModule {
    fn read(&mut self, dest: &mut [u8]) -> Result<usize, ()> {
        self.file
            .seek(SeekFrom::Start(self.position))
            .map_err(|_| ())?;

        // read until dest is full or the end of file is reached
        let mut total = 0;
        while total < dest.len() {
            match self.file.read(&mut dest[total..]) {
                Ok(0) => break,
                Ok(count) => total += count,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return Err(()),
            }
        }

        self.position += total as u64;
        Ok(total)
    }

    fn write(&mut self, src: &[u8]) -> Result<usize, ()> {
        self.file
            .seek(SeekFrom::Start(self.position))
            .map_err(|_| ())?;
        self.file.write_all(src).map_err(|_| ())?;

        self.position += src.len() as u64;
        Ok(src.len())
    }

    fn seek(&mut self, position: u64) {
        self.position = position;
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn length(&self) -> u64 {
        self.file.metadata().map(|x| x.len()).unwrap_or(0)
    }

    fn duplicate(&self) -> Result<Self, ()> {
        Self::open(&self.file_path).map_err(|_| ())
    }
}

#[cfg(test)]
mod test {
    use super::HostFileModule;
    use crate::modules::file::test::test_file_module_normal;

    #[test]
    fn test_host_file_normal() {
        let path = std::env::temp_dir().join("test_host_file_normal.tmp");
        let file = HostFileModule::create(&path, &[]).unwrap();
        test_file_module_normal(file);

        let _ = std::fs::remove_file(&path);
    }
}
