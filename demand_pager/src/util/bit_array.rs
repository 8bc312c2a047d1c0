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

use super::ceil_div;

/// Fixed size set of bits, all unset initially
pub(crate) struct BitArray {
    arr: Box<[u8]>,
    len: usize,
}

impl BitArray {
    pub(crate) fn new(len: usize) -> Self {
        BitArray {
            arr: vec![0u8; ceil_div(len, 8)].into_boxed_slice(),
            len,
        }
    }

    pub(crate) fn set(&mut self, value: bool, index: usize) {
        assert!(index < self.len, "bit {} out of range ({})", index, self.len);
        let arr_index = index / 8;
        let internal_index = index % 8;

        let item = &mut self.arr[arr_index];
        if value {
            // set bit
            *item |= 1u8 << internal_index;
        } else {
            // unset bit
            *item &= !(1u8 << internal_index);
        }
    }

    pub(crate) fn is_set(&self, index: usize) -> bool {
        assert!(index < self.len, "bit {} out of range ({})", index, self.len);
        let arr_index = index / 8;
        let internal_index = index % 8;

        let item = self.arr[arr_index];
        (item & (1u8 << internal_index)) != 0
    }

    /// Returns the first unset bit, skipping bytes that are completely used
    pub(crate) fn first_unset(&self) -> Option<usize> {
        for (arr_index, item) in self.arr.iter().enumerate() {
            if *item == u8::MAX {
                continue;
            }

            let bit = (!*item).trailing_zeros() as usize;
            let index = arr_index * 8 + bit;
            return if index < self.len { Some(index) } else { None };
        }

        None
    }

    pub(crate) fn count_set(&self) -> usize {
        self.arr.iter().map(|x| x.count_ones() as usize).sum()
    }
}
