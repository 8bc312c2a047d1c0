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

use std::collections::{btree_map, BTreeMap};

use crate::{address::VirtAddr, modules::file::FileModule, page::Page};

/// All pages of one address space, keyed by their page aligned address
pub(crate) struct SupplementalPageTable<F: FileModule> {
    pages: BTreeMap<VirtAddr, Page<F>>,
}

impl<F: FileModule> SupplementalPageTable<F> {
    pub(crate) fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
        }
    }

    /// Looks up the page that contains `va`
    pub(crate) fn find(&self, va: VirtAddr) -> Option<&Page<F>> {
        self.pages.get(&va.page_round_down())
    }

    pub(crate) fn find_mut(&mut self, va: VirtAddr) -> Option<&mut Page<F>> {
        self.pages.get_mut(&va.page_round_down())
    }

    pub(crate) fn contains(&self, va: VirtAddr) -> bool {
        self.pages.contains_key(&va.page_round_down())
    }

    /// Panics if there is a page at this address already
    pub(crate) fn insert(&mut self, page: Page<F>) {
        match self.pages.entry(page.va) {
            btree_map::Entry::Vacant(entry) => {
                entry.insert(page);
            }
            btree_map::Entry::Occupied(entry) => {
                panic!("page {} is already present", entry.key())
            }
        }
    }

    pub(crate) fn remove(&mut self, va: VirtAddr) -> Option<Page<F>> {
        self.pages.remove(&va.page_round_down())
    }

    /// Does any page lie in `[start, start + len)`?
    pub(crate) fn overlaps(&self, start: VirtAddr, len: usize) -> bool {
        let end = start.as_usize().saturating_add(len);
        self.pages
            .range(start.page_round_down()..)
            .next()
            .is_some_and(|(va, _)| va.as_usize() < end)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Page<F>> {
        self.pages.values()
    }

    pub(crate) fn addresses(&self) -> Vec<VirtAddr> {
        self.pages.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod test {
    use super::SupplementalPageTable;
    use crate::{
        address::{VirtAddr, PAGE_SIZE},
        modules::file::MemoryFileModule,
        page::Page,
    };

    #[test]
    fn test_find_rounds_down() {
        let mut spt: SupplementalPageTable<MemoryFileModule> = SupplementalPageTable::new();
        spt.insert(Page::new_stack(VirtAddr::new(0x1000)));

        assert!(spt.find(VirtAddr::new(0x1000)).is_some());
        assert!(spt.find(VirtAddr::new(0x1fff)).is_some());
        assert!(spt.find(VirtAddr::new(0x2000)).is_none());
        assert!(spt.find(VirtAddr::new(0x0fff)).is_none());

        assert!(spt.remove(VirtAddr::new(0x1234)).is_some());
        assert_eq!(spt.len(), 0);
    }

    #[test]
    fn test_overlaps() {
        let mut spt: SupplementalPageTable<MemoryFileModule> = SupplementalPageTable::new();
        spt.insert(Page::new_stack(VirtAddr::new(4 * PAGE_SIZE)));

        assert!(!spt.overlaps(VirtAddr::new(0), 4 * PAGE_SIZE));
        assert!(spt.overlaps(VirtAddr::new(0), 4 * PAGE_SIZE + 1));
        assert!(spt.overlaps(VirtAddr::new(4 * PAGE_SIZE + 12), 1));
        assert!(!spt.overlaps(VirtAddr::new(5 * PAGE_SIZE), 10 * PAGE_SIZE));
    }

    #[test]
    #[should_panic]
    fn test_duplicate_insert_panics() {
        let mut spt: SupplementalPageTable<MemoryFileModule> = SupplementalPageTable::new();
        spt.insert(Page::new_stack(VirtAddr::new(0x1000)));
        spt.insert(Page::new_stack(VirtAddr::new(0x1000)));
    }
}
