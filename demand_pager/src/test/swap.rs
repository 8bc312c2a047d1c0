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

use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

use super::{get_test_vm, init_logger, rand_page, FaultyBlockDevice, TestVm};
use crate::{
    address::{VirtAddr, PAGE_SIZE},
    modules::{block_device::DEFAULT_SECTOR_SIZE, physical_memory::HeapPhysicalMemoryModule},
    ContentSource, PageType, Vm, VmConfig, VmError,
};

const BASE: VirtAddr = VirtAddr::new(0x1000_0000);

fn page(i: usize) -> VirtAddr {
    BASE + i * PAGE_SIZE
}

#[test]
fn test_swap_round_trip() {
    const FRAMES: usize = 4;
    const SEED: u64 = 9384756102938475;

    let mut rand = SmallRng::seed_from_u64(SEED);
    let mut vm = get_test_vm(FRAMES, 16);
    let space = vm.create_address_space();
    vm.reserve_lazy_region(
        space,
        BASE,
        true,
        ContentSource::Anonymous {
            page_count: FRAMES + 1,
        },
    )
    .unwrap();

    let markers: Vec<Vec<u8>> = (0..FRAMES + 1).map(|_| rand_page(&mut rand)).collect();
    for (i, marker) in markers.iter().enumerate().take(FRAMES) {
        vm.user_write(space, page(i), marker).unwrap();
    }
    assert_eq!(vm.resident_frame_count(), FRAMES);
    assert_eq!(vm.swap_slots_in_use().unwrap(), 0);

    // one more page than frames, the first page loses its frame
    vm.user_write(space, page(FRAMES), &markers[FRAMES]).unwrap();
    assert_eq!(vm.resident_frame_count(), FRAMES);
    assert_eq!(vm.swap_slots_in_use().unwrap(), 1);
    assert!(!vm.is_resident(space, page(0)));
    assert!(vm.page_info(space, page(0)).unwrap().swapped);
    vm.check_integrity();

    let mut order: Vec<usize> = (0..FRAMES + 1).collect();
    for _ in 0..5 {
        order.shuffle(&mut rand);
        for &i in order.iter() {
            let mut data = vec![0u8; PAGE_SIZE];
            vm.user_read(space, page(i), &mut data).unwrap();
            assert_eq!(data, markers[i], "content of page {} changed", i);
        }
        vm.check_integrity();
    }

    assert_eq!(
        vm.page_type(space, page(0)),
        Some(PageType::Anonymous { stack: false })
    );

    vm.destroy_address_space(space).unwrap();
    assert_eq!(vm.resident_frame_count(), 0);
    assert_eq!(vm.swap_slots_in_use().unwrap(), 0);
}

#[test]
fn test_unaligned_access_across_pages() {
    let mut vm = get_test_vm(1, 4);
    let space = vm.create_address_space();
    vm.reserve_lazy_region(space, BASE, true, ContentSource::Anonymous { page_count: 2 })
        .unwrap();

    // the second half evicts the first one while writing
    let data: Vec<u8> = (0..200).map(|x| x as u8).collect();
    vm.user_write(space, page(1) - 100, &data).unwrap();
    assert_eq!(vm.swap_slots_in_use().unwrap(), 1);

    let mut read = vec![0u8; 200];
    vm.user_read(space, page(1) - 100, &mut read).unwrap();
    assert_eq!(read, data);
    vm.check_integrity();
}

#[test]
fn test_swap_exhausted_during_eviction() {
    let mut vm = get_test_vm(2, 1);
    let space = vm.create_address_space();
    vm.reserve_lazy_region(space, BASE, true, ContentSource::Anonymous { page_count: 4 })
        .unwrap();

    for i in 0..3 {
        vm.user_write(space, page(i), &[i as u8 + 1; 8]).unwrap();
    }
    assert_eq!(vm.swap_slots_in_use().unwrap(), 1);

    // the only slot is taken, so no frame can be freed
    assert_eq!(
        vm.user_write(space, page(3), &[4; 8]),
        Err(VmError::SwapExhausted)
    );
    assert!(!vm.handle_page_fault(space, page(3), true, true, true));
    assert!(!vm.is_resident(space, page(3)));
    assert_eq!(vm.resident_frame_count(), 2);
    vm.check_integrity();

    // resident pages are untouched
    let mut data = [0u8; 8];
    vm.user_read(space, page(2), &mut data).unwrap();
    assert_eq!(data, [3; 8]);
}

#[test]
fn test_failed_swap_write_keeps_page() {
    init_logger();

    let (device, failing) = FaultyBlockDevice::new(4 * PAGE_SIZE / DEFAULT_SECTOR_SIZE);
    let mut vm: TestVm<FaultyBlockDevice> =
        Vm::new(VmConfig::default(), device, HeapPhysicalMemoryModule::new(1)).unwrap();
    let space = vm.create_address_space();
    vm.reserve_lazy_region(space, BASE, true, ContentSource::Anonymous { page_count: 2 })
        .unwrap();

    vm.user_write(space, page(0), &[0x5a; 16]).unwrap();

    failing.set(true);
    assert_eq!(vm.user_write(space, page(1), &[1; 16]), Err(VmError::Io));
    assert!(vm.is_resident(space, page(0)));
    assert!(!vm.is_resident(space, page(1)));
    assert_eq!(vm.swap_slots_in_use().unwrap(), 0);
    vm.check_integrity();

    failing.set(false);
    vm.user_write(space, page(1), &[1; 16]).unwrap();
    assert!(!vm.is_resident(space, page(0)));

    // making room for it fails, so the page stays swapped out
    failing.set(true);
    let mut data = [0u8; 16];
    assert_eq!(vm.user_read(space, page(0), &mut data), Err(VmError::Io));
    assert!(vm.page_info(space, page(0)).unwrap().swapped);
    vm.check_integrity();

    failing.set(false);
    vm.user_read(space, page(0), &mut data).unwrap();
    assert_eq!(data, [0x5a; 16]);
    vm.check_integrity();
}

#[test]
fn test_unmap_region_releases_slots() {
    let mut vm = get_test_vm(1, 4);
    let space = vm.create_address_space();
    vm.reserve_lazy_region(space, BASE, true, ContentSource::Anonymous { page_count: 3 })
        .unwrap();

    for i in 0..3 {
        vm.user_write(space, page(i), &[7; 4]).unwrap();
    }
    assert_eq!(vm.swap_slots_in_use().unwrap(), 2);

    vm.unmap_region(space, page(0), 2).unwrap();
    assert_eq!(vm.swap_slots_in_use().unwrap(), 0);
    assert_eq!(vm.page_count(space), 1);
    assert!(vm.handle_page_fault(space, page(2), true, false, true));
    assert!(!vm.handle_page_fault(space, page(0), true, false, true));
    vm.check_integrity();
}
