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

use crate::address::{VirtAddr, USER_STACK};

/// Upper bound for the size of a user stack
pub const DEFAULT_MAX_STACK_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VmConfig {
    /// How far the stack may grow downwards from `user_stack_top`
    pub max_stack_size: usize,

    /// First address above the user stack
    pub user_stack_top: VirtAddr,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
            user_stack_top: VirtAddr::new(USER_STACK),
        }
    }
}

impl VmConfig {
    /// Lowest address the stack is allowed to grow to
    pub(crate) fn stack_limit(&self) -> VirtAddr {
        VirtAddr::new(
            self.user_stack_top
                .as_usize()
                .saturating_sub(self.max_stack_size),
        )
    }
}
