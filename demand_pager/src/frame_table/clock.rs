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

/// Second chance replacement over all frames in allocation order
pub(crate) struct ClockHand {
    position: usize,
}

impl ClockHand {
    pub(crate) fn new() -> Self {
        Self { position: 0 }
    }

    /// Sweeps over the `len` candidates starting at the hand.
    ///
    /// `test_and_clear(i)` returns `None` if candidate `i` can not be evicted right
    /// now and otherwise its accessed bit before clearing it. As every bit is cleared
    /// on the first sweep, the second sweep is guaranteed to find a victim if there
    /// is any candidate at all.
    pub(crate) fn select_victim<T: FnMut(usize) -> Option<bool>>(
        &mut self,
        len: usize,
        mut test_and_clear: T,
    ) -> Option<usize> {
        if len == 0 {
            return None;
        }

        if self.position >= len {
            self.position = 0;
        }

        for _ in 0..2 * len {
            let curr = self.position;
            self.position = (self.position + 1) % len;

            match test_and_clear(curr) {
                // page lost its chance, choose it
                Some(false) => return Some(curr),
                // page was accessed, give it another chance
                Some(true) => {}
                None => {}
            }
        }

        // we could not find a suitable frame
        None
    }
}
