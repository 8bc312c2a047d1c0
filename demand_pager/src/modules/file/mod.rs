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

mod host_file;
mod memory_file;

pub use host_file::HostFileModule;
pub use memory_file::MemoryFileModule;

/// An open file handle with its own position.
///
/// Dropping the handle closes it.
pub trait FileModule: Sized {
    /// Reads up to `dest.len()` bytes from the current position and advances it.
    ///
    /// Returns the amount of bytes read, which is smaller than `dest.len()` at the end of file.
    fn read(&mut self, dest: &mut [u8]) -> Result<usize, ()>;

    /// Writes `src` at the current position and advances it.
    ///
    /// Returns the amount of bytes written.
    fn write(&mut self, src: &[u8]) -> Result<usize, ()>;

    fn seek(&mut self, position: u64);

    fn tell(&self) -> u64;

    /// Current length of the underlying file in bytes
    fn length(&self) -> u64;

    /// Opens a new handle of the same underlying file that has an independent position
    fn duplicate(&self) -> Result<Self, ()>;

    fn read_at(&mut self, dest: &mut [u8], offset: u64) -> Result<usize, ()> {
        self.seek(offset);
        self.read(dest)
    }

    fn write_at(&mut self, src: &[u8], offset: u64) -> Result<usize, ()> {
        self.seek(offset);
        self.write(src)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::FileModule;

    /// checks reads, writes and that duplicated handles do not share their position
    pub(crate) fn test_file_module_normal<F: FileModule>(mut file: F) {
        assert_eq!(file.write(&[1, 2, 3, 4, 5, 6]).unwrap(), 6);
        assert_eq!(file.tell(), 6);
        assert_eq!(file.length(), 6);

        let mut other = file.duplicate().unwrap();
        assert_eq!(other.tell(), 0);

        let mut buffer = [0u8; 4];
        assert_eq!(other.read(&mut buffer).unwrap(), 4);
        assert_eq!(buffer, [1, 2, 3, 4]);

        // reading at the end only returns the rest
        assert_eq!(other.read(&mut buffer).unwrap(), 2);
        assert_eq!(&buffer[..2], &[5, 6]);
        assert_eq!(other.read(&mut buffer).unwrap(), 0);

        // writes through one handle are visible through the other
        assert_eq!(other.write_at(&[9, 9], 1).unwrap(), 2);
        assert_eq!(file.read_at(&mut buffer, 0).unwrap(), 4);
        assert_eq!(buffer, [1, 9, 9, 4]);
        assert_eq!(file.tell(), 4);
    }
}
