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

use log::{trace, warn};

use crate::{
    address::{VirtAddr, PAGE_SIZE},
    modules::{file::FileModule, page_table::PageTableModule},
    vm_error::VmError,
};

/// A page that mirrors a byte range of a file (memory mapped files).
///
/// Eviction does not need any swap space, the content is written back
/// to the file if it was modified and read again on the next fault.
pub(crate) struct FilePage<F: FileModule> {
    pub(crate) file: F,
    pub(crate) offset: u64,

    /// Bytes of the mapping inside of this page, the rest is always zero
    pub(crate) length: usize,

    /// Bytes that were read from the file the last time, only these are written back
    pub(crate) read_bytes: usize,
}

impl<F: FileModule> FilePage<F> {
    pub(crate) fn new(file: F, offset: u64, length: usize) -> Self {
        debug_assert!(length <= PAGE_SIZE);
        Self {
            file,
            offset,
            length,
            read_bytes: 0,
        }
    }

    pub(crate) fn swap_in<P: PageTableModule>(
        &mut self,
        va: VirtAddr,
        frame: &mut [u8],
        page_table: &mut P,
    ) -> Result<(), VmError> {
        let read = self
            .file
            .read_at(&mut frame[..self.length], self.offset)
            .map_err(|_| VmError::Io)?;
        frame[read..].fill(0);

        trace!(
            "Read {} bytes of {} into {} (offset {})",
            read,
            self.length,
            va,
            self.offset
        );
        self.read_bytes = read;

        // content equals the file now
        page_table.set_dirty(va, false);
        Ok(())
    }

    pub(crate) fn swap_out<P: PageTableModule>(
        &mut self,
        va: VirtAddr,
        frame: &[u8],
        page_table: &mut P,
    ) -> Result<(), VmError> {
        self.write_back(va, frame, page_table)?;
        page_table.unmap(va);
        Ok(())
    }

    /// Writes the page back to its file if it was modified
    pub(crate) fn write_back<P: PageTableModule>(
        &mut self,
        va: VirtAddr,
        frame: &[u8],
        page_table: &mut P,
    ) -> Result<(), VmError> {
        if !page_table.is_dirty(va) {
            return Ok(());
        }

        // the page lies behind the end of the file
        if self.read_bytes == 0 {
            page_table.set_dirty(va, false);
            return Ok(());
        }

        let written = self
            .file
            .write_at(&frame[..self.read_bytes], self.offset)
            .map_err(|_| VmError::Io)?;
        if written != self.read_bytes {
            warn!(
                "Short write back of {}: {} of {} bytes",
                va, written, self.read_bytes
            );
            return Err(VmError::Io);
        }

        trace!("Wrote back {} bytes of {}", written, va);
        page_table.set_dirty(va, false);
        Ok(())
    }

    /// Final write back, the file handle is closed afterwards
    pub(crate) fn destroy<P: PageTableModule>(
        mut self,
        va: VirtAddr,
        frame: Option<&[u8]>,
        page_table: &mut P,
    ) -> Result<(), VmError> {
        match frame {
            Some(frame) => self.write_back(va, frame, page_table),
            None => Ok(()),
        }
    }
}
