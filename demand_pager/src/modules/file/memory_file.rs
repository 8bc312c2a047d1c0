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

use std::sync::{Arc, Mutex};

use super::FileModule;

/// Handle of a file that only exists in memory.
///
/// All duplicated handles share the same content, but each of them has its own position.
pub struct MemoryFileModule {
    inode: Arc<Mutex<Vec<u8>>>,
    position: u64,
}

impl MemoryFileModule {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            inode: Arc::new(Mutex::new(content)),
            position: 0,
        }
    }

    /// Returns a copy of the whole file content
    pub fn content(&self) -> Vec<u8> {
        match self.inode.lock() {
            Ok(data) => data.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// How many handles of this file are open right now
    pub fn open_count(&self) -> usize {
        Arc::strong_count(&self.inode)
    }
}

impl FileModule for MemoryFileModule {
    fn read(&mut self, dest: &mut [u8]) -> Result<usize, ()> {
        let data = self.inode.lock().map_err(|_| ())?;

        let start = (self.position as usize).min(data.len());
        let count = dest.len().min(data.len() - start);
        dest[..count].copy_from_slice(&data[start..start + count]);

        self.position += count as u64;
        Ok(count)
    }

    fn write(&mut self, src: &[u8]) -> Result<usize, ()> {
        let mut data = self.inode.lock().map_err(|_| ())?;

        let start = self.position as usize;
        if data.len() < start + src.len() {
            data.resize(start + src.len(), 0);
        }
        data[start..start + src.len()].copy_from_slice(src);

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
        match self.inode.lock() {
            Ok(data) => data.len() as u64,
            Err(poisoned) => poisoned.into_inner().len() as u64,
        }
    }

    fn duplicate(&self) -> Result<Self, ()> {
        Ok(Self {
            inode: self.inode.clone(),
            position: 0,
        })
    }
}

#[cfg(test)]
mod test {
    use super::MemoryFileModule;
    use crate::modules::file::{test::test_file_module_normal, FileModule};

    #[test]
    fn test_memory_file_normal() {
        test_file_module_normal(MemoryFileModule::new(Vec::new()));
    }

    #[test]
    fn test_memory_file_handles_are_counted() {
        let file = MemoryFileModule::new(vec![1, 2, 3]);
        let other = file.duplicate().unwrap();
        assert_eq!(file.open_count(), 2);

        drop(other);
        assert_eq!(file.open_count(), 1);
    }
}
