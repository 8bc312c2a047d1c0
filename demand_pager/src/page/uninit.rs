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

use crate::{modules::file::FileModule, vm_error::VmError};

use super::{anon::AnonPage, file_backed::FilePage, PageState, PageType};

/// Where the first content of a lazy page comes from
pub(crate) struct FileSlice<F: FileModule> {
    pub(crate) file: F,
    pub(crate) offset: u64,

    /// Bytes to read, everything behind this is zeroed
    pub(crate) read_bytes: usize,
}

impl<F: FileModule> FileSlice<F> {
    pub(crate) fn duplicate(&self) -> Result<Self, VmError> {
        Ok(Self {
            file: self.file.duplicate().map_err(|_| VmError::Io)?,
            offset: self.offset,
            read_bytes: self.read_bytes,
        })
    }

    /// Reads exactly `read_bytes` into `frame` and zeroes the remainder
    pub(crate) fn load(&mut self, frame: &mut [u8]) -> Result<(), VmError> {
        debug_assert!(self.read_bytes <= frame.len());
        let read = self
            .file
            .read_at(&mut frame[..self.read_bytes], self.offset)
            .map_err(|_| VmError::Io)?;
        if read != self.read_bytes {
            return Err(VmError::Io);
        }

        frame[read..].fill(0);
        Ok(())
    }
}

/// A page that was reserved but never accessed.
///
/// Each variant captures all data its deferred initializer needs.
pub(crate) enum UninitPage<F: FileModule> {
    /// Zero filled anonymous memory
    Anonymous { stack: bool },

    /// Part of an executable segment, anonymous once loaded
    Segment(FileSlice<F>),

    /// Part of a memory mapped file
    FileBacked(FileSlice<F>),
}

/// The work that is left after a page was transmuted
pub(crate) enum Initializer<F: FileModule> {
    Zero,
    Read(FileSlice<F>),

    /// The new `FilePage` reads its own content
    Backing,
}

impl<F: FileModule> UninitPage<F> {
    /// Type the page will have after its first fault
    pub(crate) fn target_type(&self) -> PageType {
        match self {
            UninitPage::Anonymous { stack } => PageType::Anonymous { stack: *stack },
            UninitPage::Segment(_) => PageType::Anonymous { stack: false },
            UninitPage::FileBacked(_) => PageType::FileBacked,
        }
    }

    /// Turns this page into its target variant.
    ///
    /// Returns the new state and the initializer that still has to run on the frame.
    pub(crate) fn transmute(self) -> (PageState<F>, Initializer<F>) {
        match self {
            UninitPage::Anonymous { stack } => {
                (PageState::Anonymous(AnonPage::new(stack)), Initializer::Zero)
            }
            UninitPage::Segment(slice) => (
                PageState::Anonymous(AnonPage::new(false)),
                Initializer::Read(slice),
            ),
            UninitPage::FileBacked(slice) => (
                PageState::FileBacked(FilePage::new(slice.file, slice.offset, slice.read_bytes)),
                Initializer::Backing,
            ),
        }
    }

    /// Copy for another address space, file handles are reopened
    pub(crate) fn duplicate(&self) -> Result<Self, VmError> {
        Ok(match self {
            UninitPage::Anonymous { stack } => UninitPage::Anonymous { stack: *stack },
            UninitPage::Segment(slice) => UninitPage::Segment(slice.duplicate()?),
            UninitPage::FileBacked(slice) => UninitPage::FileBacked(slice.duplicate()?),
        })
    }
}
