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

use super::get_test_vm;
use crate::{
    address::{VirtAddr, KERN_BASE, PAGE_SIZE},
    modules::file::{FileModule, MemoryFileModule},
    ContentSource, MappedRegion, PageType, VmError,
};

const MAP: VirtAddr = VirtAddr::new(0x3000_0000);

fn numbered(len: usize) -> Vec<u8> {
    (0..len).map(|x| (x % 241) as u8).collect()
}

#[test]
fn test_mmap_reads_file() {
    let mut vm = get_test_vm(4, 4);
    let space = vm.create_address_space();
    let content = numbered(3 * PAGE_SIZE);
    let file = MemoryFileModule::new(content.clone());

    let addr = vm
        .mmap(space, MAP, PAGE_SIZE + 100, false, &file, PAGE_SIZE as u64)
        .unwrap();
    assert_eq!(addr, MAP);
    assert_eq!(
        vm.mappings(space),
        &[MappedRegion {
            start: MAP,
            page_count: 2
        }]
    );
    assert_eq!(vm.page_type(space, MAP + PAGE_SIZE), Some(PageType::FileBacked));
    assert_eq!(vm.resident_frame_count(), 0);

    let mut data = vec![0u8; 2 * PAGE_SIZE];
    vm.user_read(space, MAP, &mut data).unwrap();
    assert_eq!(&data[..PAGE_SIZE + 100], &content[PAGE_SIZE..2 * PAGE_SIZE + 100]);
    assert!(data[PAGE_SIZE + 100..].iter().all(|x| *x == 0));

    // the caller may close its handle, the mapping has its own
    assert_eq!(file.open_count(), 3);
    drop(file);
    vm.user_read(space, MAP, &mut data[..10]).unwrap();
    vm.check_integrity();
}

#[test]
fn test_munmap_writes_back() {
    let mut vm = get_test_vm(4, 4);
    let space = vm.create_address_space();
    let file = MemoryFileModule::new(numbered(PAGE_SIZE + 904));

    vm.mmap(space, MAP, PAGE_SIZE + 904, true, &file, 0).unwrap();
    vm.user_write(space, MAP + 8, &[0xee; 4]).unwrap();
    vm.user_write(space, MAP + PAGE_SIZE + 10, &[0xdd; 4]).unwrap();

    // nothing reached the file yet
    assert_eq!(file.content(), numbered(PAGE_SIZE + 904));

    vm.munmap(space, MAP).unwrap();
    assert!(vm.mappings(space).is_empty());
    assert_eq!(vm.page_count(space), 0);
    assert_eq!(vm.resident_frame_count(), 0);
    assert_eq!(file.open_count(), 1);

    let mut expected = numbered(PAGE_SIZE + 904);
    expected[8..12].fill(0xee);
    expected[PAGE_SIZE + 10..PAGE_SIZE + 14].fill(0xdd);
    assert_eq!(file.content(), expected);
}

#[test]
fn test_bytes_behind_file_end_are_not_written() {
    let mut vm = get_test_vm(4, 4);
    let space = vm.create_address_space();
    let file = MemoryFileModule::new(vec![5; 100]);

    vm.mmap(space, MAP, 2 * PAGE_SIZE, true, &file, 0).unwrap();

    let mut data = vec![0xffu8; 2 * PAGE_SIZE];
    vm.user_read(space, MAP, &mut data).unwrap();
    assert!(data[..100].iter().all(|x| *x == 5));
    assert!(data[100..].iter().all(|x| *x == 0));

    vm.user_write(space, MAP + 50, &[6; 100]).unwrap();
    vm.user_write(space, MAP + PAGE_SIZE, &[7; 10]).unwrap();
    vm.munmap(space, MAP).unwrap();

    let mut expected = vec![5u8; 100];
    expected[50..].fill(6);
    assert_eq!(file.content(), expected);
}

#[test]
fn test_eviction_writes_back_dirty_file_pages() {
    let mut vm = get_test_vm(1, 4);
    let space = vm.create_address_space();
    let file = MemoryFileModule::new(vec![0; 2 * PAGE_SIZE]);

    vm.mmap(space, MAP, 2 * PAGE_SIZE, true, &file, 0).unwrap();
    vm.user_write(space, MAP, &[1; 4]).unwrap();

    // the second page takes the only frame
    let mut data = [0u8; 4];
    vm.user_read(space, MAP + PAGE_SIZE, &mut data).unwrap();
    assert!(!vm.is_resident(space, MAP));
    assert_eq!(&file.content()[..4], &[1; 4]);

    // file pages never use swap space
    assert_eq!(vm.swap_slots_in_use().unwrap(), 0);

    // the file is read again on the next access
    let mut other = file.duplicate().unwrap();
    other.write_at(&[2; 4], 0).unwrap();
    vm.user_read(space, MAP, &mut data).unwrap();
    assert_eq!(data, [2; 4]);
    vm.check_integrity();
}

#[test]
fn test_exit_writes_back_mappings() {
    let mut vm = get_test_vm(4, 4);
    let space = vm.create_address_space();
    let file = MemoryFileModule::new(vec![0; 64]);

    vm.mmap(space, MAP, 64, true, &file, 0).unwrap();
    vm.user_write(space, MAP, b"exit").unwrap();
    vm.destroy_address_space(space).unwrap();

    assert_eq!(&file.content()[..4], b"exit");
    assert_eq!(file.open_count(), 1);
}

#[test]
fn test_mmap_validation() {
    let mut vm = get_test_vm(4, 4);
    let space = vm.create_address_space();
    let file = MemoryFileModule::new(vec![1; PAGE_SIZE]);
    let empty = MemoryFileModule::new(Vec::new());

    let mut check = |addr: usize, length: usize, file: &MemoryFileModule, offset: u64| {
        vm.mmap(space, VirtAddr::new(addr), length, true, file, offset)
    };

    assert_eq!(check(0, PAGE_SIZE, &file, 0), Err(VmError::InvalidArgument));
    assert_eq!(
        check(MAP.as_usize() + 1, PAGE_SIZE, &file, 0),
        Err(VmError::InvalidArgument)
    );
    assert_eq!(check(MAP.as_usize(), 0, &file, 0), Err(VmError::InvalidArgument));
    assert_eq!(
        check(MAP.as_usize(), PAGE_SIZE, &file, 10),
        Err(VmError::InvalidArgument)
    );
    assert_eq!(
        check(MAP.as_usize(), PAGE_SIZE, &empty, 0),
        Err(VmError::InvalidArgument)
    );
    assert_eq!(
        check(KERN_BASE - PAGE_SIZE, 2 * PAGE_SIZE, &file, 0),
        Err(VmError::InvalidArgument)
    );
    assert_eq!(
        check(KERN_BASE, PAGE_SIZE, &file, 0),
        Err(VmError::InvalidArgument)
    );
    assert_eq!(
        check(MAP.as_usize(), usize::MAX, &file, 0),
        Err(VmError::InvalidArgument)
    );
    assert_eq!(
        check(MAP.as_usize(), KERN_BASE + 1, &file, 0),
        Err(VmError::InvalidArgument)
    );
    assert_eq!(
        check(MAP.as_usize(), PAGE_SIZE, &file, u64::MAX - (PAGE_SIZE as u64 - 1)),
        Err(VmError::InvalidArgument)
    );

    // overlap with anonymous memory
    vm.reserve_lazy_region(
        space,
        MAP + PAGE_SIZE,
        true,
        ContentSource::Anonymous { page_count: 1 },
    )
    .unwrap();
    assert_eq!(
        vm.mmap(space, MAP, 2 * PAGE_SIZE, true, &file, 0),
        Err(VmError::InvalidArgument)
    );

    assert_eq!(vm.munmap(space, MAP), Err(VmError::InvalidArgument));
    assert!(vm.mappings(space).is_empty());
    assert_eq!(vm.page_count(space), 1);
}
