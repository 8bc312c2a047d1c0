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

use core::mem;

use log::trace;

use crate::{
    address::{VirtAddr, PAGE_SIZE},
    frame_table::FrameId,
    modules::{block_device::BlockDeviceModule, file::FileModule, page_table::PageTableModule},
    swap_table::SwapTable,
    util::ceil_div,
    vm_error::VmError,
};

pub(crate) mod anon;
pub(crate) mod file_backed;
pub(crate) mod uninit;

use anon::AnonPage;
use file_backed::FilePage;
use uninit::{FileSlice, Initializer, UninitPage};

/// Effective type of a page, for uninitialized pages the type they will become
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Anonymous { stack: bool },
    FileBacked,
}

/// Snapshot of the metadata of one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub page_type: PageType,
    pub writable: bool,

    /// The page holds a frame
    pub resident: bool,

    /// The page was faulted in at least once
    pub initialized: bool,

    /// The content of this page is on the swap disk right now
    pub swapped: bool,
}

/// How the content of a freshly reserved region is produced on first access
pub enum ContentSource<F: FileModule> {
    /// Zero filled memory
    Anonymous { page_count: usize },

    /// A segment of an executable: `read_bytes` from `file` at `offset`, followed by `zero_bytes` zeros.
    ///
    /// Pages of segments are anonymous after they were loaded.
    Segment {
        file: F,
        offset: u64,
        read_bytes: usize,
        zero_bytes: usize,
    },

    /// `length` bytes of `file` starting at `offset`, modifications are written back to the file
    Mapping { file: F, offset: u64, length: usize },
}

impl<F: FileModule> ContentSource<F> {
    /// Number of pages this source covers, `None` if its size does not fit into `usize`
    pub fn page_count(&self) -> Option<usize> {
        match self {
            ContentSource::Anonymous { page_count } => Some(*page_count),
            ContentSource::Segment {
                read_bytes,
                zero_bytes,
                ..
            } => Some(ceil_div(read_bytes.checked_add(*zero_bytes)?, PAGE_SIZE)),
            ContentSource::Mapping { length, .. } => Some(ceil_div(*length, PAGE_SIZE)),
        }
    }

    /// Splits this source into one lazy page per virtual page, starting at `va`
    pub(crate) fn into_pages(self, va: VirtAddr, writable: bool) -> Result<Vec<Page<F>>, VmError> {
        let page_count = self.page_count().ok_or(VmError::InvalidArgument)?;
        let mut pages = Vec::new();
        pages
            .try_reserve_exact(page_count)
            .map_err(|_| VmError::OutOfMemory)?;

        match self {
            ContentSource::Anonymous { page_count } => {
                for i in 0..page_count {
                    pages.push(Page::new_uninit(
                        va + i * PAGE_SIZE,
                        writable,
                        UninitPage::Anonymous { stack: false },
                    ));
                }
            }
            ContentSource::Segment {
                file,
                mut offset,
                mut read_bytes,
                mut zero_bytes,
            } => {
                if (read_bytes + zero_bytes) % PAGE_SIZE != 0
                    || offset.checked_add(read_bytes as u64).is_none()
                {
                    return Err(VmError::InvalidArgument);
                }

                let mut upage = va;
                while read_bytes > 0 || zero_bytes > 0 {
                    let page_read_bytes = read_bytes.min(PAGE_SIZE);
                    let page_zero_bytes = PAGE_SIZE - page_read_bytes;

                    let slice = FileSlice {
                        file: file.duplicate().map_err(|_| VmError::Io)?,
                        offset,
                        read_bytes: page_read_bytes,
                    };
                    pages.push(Page::new_uninit(upage, writable, UninitPage::Segment(slice)));

                    read_bytes -= page_read_bytes;
                    zero_bytes -= page_zero_bytes;
                    upage = upage + PAGE_SIZE;
                    offset += page_read_bytes as u64;
                }
            }
            ContentSource::Mapping {
                file,
                offset,
                length,
            } => {
                if offset.checked_add(length as u64).is_none() {
                    return Err(VmError::InvalidArgument);
                }

                for i in 0..page_count {
                    let slice = FileSlice {
                        file: file.duplicate().map_err(|_| VmError::Io)?,
                        offset: offset + (i * PAGE_SIZE) as u64,
                        read_bytes: (length - i * PAGE_SIZE).min(PAGE_SIZE),
                    };
                    pages.push(Page::new_uninit(
                        va + i * PAGE_SIZE,
                        writable,
                        UninitPage::FileBacked(slice),
                    ));
                }
            }
        }

        Ok(pages)
    }
}

pub(crate) enum PageState<F: FileModule> {
    Uninit(UninitPage<F>),
    Anonymous(AnonPage),
    FileBacked(FilePage<F>),
}

/// One page of an address space
pub(crate) struct Page<F: FileModule> {
    pub(crate) va: VirtAddr,
    pub(crate) writable: bool,

    /// Frame this page is resident in
    pub(crate) frame: Option<FrameId>,

    pub(crate) state: PageState<F>,
}

impl<F: FileModule> Page<F> {
    pub(crate) fn new(va: VirtAddr, writable: bool, state: PageState<F>) -> Self {
        debug_assert!(va.is_page_aligned(), "page address {} is not aligned", va);
        Self {
            va,
            writable,
            frame: None,
            state,
        }
    }

    pub(crate) fn new_uninit(va: VirtAddr, writable: bool, uninit: UninitPage<F>) -> Self {
        Self::new(va, writable, PageState::Uninit(uninit))
    }

    /// A zero filled stack page
    pub(crate) fn new_stack(va: VirtAddr) -> Self {
        Self::new_uninit(va, true, UninitPage::Anonymous { stack: true })
    }

    pub(crate) fn page_type(&self) -> PageType {
        match &self.state {
            PageState::Uninit(uninit) => uninit.target_type(),
            PageState::Anonymous(anon) => PageType::Anonymous { stack: anon.stack },
            PageState::FileBacked(_) => PageType::FileBacked,
        }
    }

    pub(crate) fn info(&self) -> PageInfo {
        PageInfo {
            page_type: self.page_type(),
            writable: self.writable,
            resident: self.frame.is_some(),
            initialized: !matches!(self.state, PageState::Uninit(_)),
            swapped: matches!(&self.state, PageState::Anonymous(anon) if anon.slot.is_some()),
        }
    }

    pub(crate) fn is_resident(&self) -> bool {
        self.frame.is_some()
    }

    /// Fills `frame` with the content of this page.
    ///
    /// An uninitialized page is transmuted into its target type first, then its
    /// initializer runs. This happens exactly once per page.
    pub(crate) fn swap_in<D: BlockDeviceModule, P: PageTableModule>(
        &mut self,
        frame: &mut [u8],
        page_table: &mut P,
        swap: &SwapTable<D>,
    ) -> Result<(), VmError> {
        if matches!(self.state, PageState::Uninit(_)) {
            return self.initialize(frame, page_table);
        }

        let va = self.va;
        match &mut self.state {
            PageState::Uninit(_) => unreachable!(),
            PageState::Anonymous(anon) => anon.swap_in(va, frame, swap),
            PageState::FileBacked(file) => file.swap_in(va, frame, page_table),
        }
    }

    fn initialize<P: PageTableModule>(
        &mut self,
        frame: &mut [u8],
        page_table: &mut P,
    ) -> Result<(), VmError> {
        trace!("Initialize lazy page {}", self.va);

        // the placeholder only lives until the new state is written
        let old = mem::replace(&mut self.state, PageState::Anonymous(AnonPage::new(false)));
        let PageState::Uninit(uninit) = old else {
            unreachable!("page {} is already initialized", self.va)
        };

        let (state, initializer) = uninit.transmute();
        self.state = state;

        match initializer {
            Initializer::Zero => {
                frame.fill(0);
                Ok(())
            }
            Initializer::Read(mut slice) => match slice.load(frame) {
                // the file handle is closed here
                Ok(()) => Ok(()),
                Err(err) => {
                    // the next fault loads it again
                    self.state = PageState::Uninit(UninitPage::Segment(slice));
                    Err(err)
                }
            },
            Initializer::Backing => match &mut self.state {
                PageState::FileBacked(file) => file.swap_in(self.va, frame, page_table),
                _ => unreachable!("backing initializer for a page without file"),
            },
        }
    }

    /// Moves the content of `frame` out of memory and removes its mapping.
    ///
    /// Afterwards the page is no longer resident.
    pub(crate) fn swap_out<D: BlockDeviceModule, P: PageTableModule>(
        &mut self,
        frame: &[u8],
        page_table: &mut P,
        swap: &SwapTable<D>,
    ) -> Result<(), VmError> {
        assert!(self.is_resident(), "swap out of non resident page {}", self.va);

        let va = self.va;
        match &mut self.state {
            PageState::Uninit(_) => panic!("uninitialized page {} is resident", va),
            PageState::Anonymous(anon) => anon.swap_out(va, frame, page_table, swap)?,
            PageState::FileBacked(file) => file.swap_out(va, frame, page_table)?,
        }

        self.frame = None;
        Ok(())
    }

    /// Releases everything this page holds except for its frame, which belongs to the frame table.
    ///
    /// `frame` has to be the content of the frame if this page is resident.
    pub(crate) fn destroy<D: BlockDeviceModule, P: PageTableModule>(
        self,
        frame: Option<&[u8]>,
        page_table: &mut P,
        swap: &SwapTable<D>,
    ) -> Result<(), VmError> {
        debug_assert_eq!(self.is_resident(), frame.is_some());

        let va = self.va;
        let result = match self.state {
            // an untouched page only drops its initializer data
            PageState::Uninit(_) => Ok(()),
            PageState::Anonymous(anon) => anon.destroy(swap),
            PageState::FileBacked(file) => file.destroy(va, frame, page_table),
        };

        if self.frame.is_some() {
            page_table.unmap(va);
        }

        result
    }
}
