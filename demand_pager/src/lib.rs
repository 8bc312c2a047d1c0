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

mod address;
mod address_space;
mod frame_table;
mod page;
mod supplemental_page_table;
mod swap_table;
mod util;
mod vm;
mod vm_config;
mod vm_error;

#[cfg(test)]
mod test;

pub mod modules;

pub use address::{VirtAddr, KERN_BASE, PAGE_SIZE, USER_STACK};
pub use address_space::{AddressSpaceId, MappedRegion};
pub use page::{ContentSource, PageInfo, PageType};
pub use vm::Vm;
pub use vm_config::{VmConfig, DEFAULT_MAX_STACK_SIZE};
pub use vm_error::VmError;
