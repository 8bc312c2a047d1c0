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

use std::{env, fs, io::stdout, process::ExitCode};

use demand_pager::{
    modules::{
        block_device::{FileBlockDeviceModule, DEFAULT_SECTOR_SIZE},
        file::{FileModule, MemoryFileModule},
        page_table::SoftPageTableModule,
        physical_memory::HeapPhysicalMemoryModule,
    },
    AddressSpaceId, ContentSource, VirtAddr, Vm, VmConfig, VmError, PAGE_SIZE,
};
use env_logger::{Builder, Env};
use log::{error, info};
use rand::{rngs::SmallRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

type PlaygroundVm =
    Vm<FileBlockDeviceModule, HeapPhysicalMemoryModule, SoftPageTableModule, MemoryFileModule>;

const CODE: VirtAddr = VirtAddr::new(0x40_0000);
const HEAP: VirtAddr = VirtAddr::new(0x1000_0000);
const MAP: VirtAddr = VirtAddr::new(0x3000_0000);

#[derive(Deserialize)]
#[serde(default)]
struct PlaygroundConfig {
    vm: VmConfig,
    frames: usize,
    swap_slots: usize,
    heap_pages: usize,
    rounds: usize,
    seed: u64,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            vm: VmConfig::default(),
            frames: 8,
            swap_slots: 128,
            heap_pages: 24,
            rounds: 1000,
            seed: 7318263571209817,
        }
    }
}

#[derive(Serialize)]
struct Summary {
    frames: usize,
    swap_slots: usize,
    heap_pages: usize,
    resident_frames: usize,
    swap_slots_in_use: usize,
    parent_pages: usize,
    child_pages: usize,
    stack_bottom: Option<usize>,
}

fn main() -> ExitCode {
    Builder::from_env(Env::default())
        .format_module_path(false)
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(msg) => {
            error!("{}", msg);
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(summary) => {
            if let Err(err) = serde_json::to_writer(stdout(), &summary) {
                error!("Could not print summary: {}", err);
                return ExitCode::FAILURE;
            }
            println!();
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("Playground failed: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> Result<PlaygroundConfig, String> {
    let Some(path) = env::args().nth(1) else {
        return Ok(PlaygroundConfig::default());
    };

    let text = fs::read_to_string(&path).map_err(|err| format!("Could not read {}: {}", path, err))?;
    serde_json::from_str(&text).map_err(|err| format!("Invalid config {}: {}", path, err))
}

fn rand_page(rand: &mut SmallRng) -> Vec<u8> {
    let mut data = vec![0u8; PAGE_SIZE];
    rand.fill_bytes(&mut data);
    data
}

fn run(config: &PlaygroundConfig) -> Result<Summary, VmError> {
    let swap_path = env::temp_dir().join("swap_playground.swap");
    let device = FileBlockDeviceModule::new(
        &swap_path,
        config.swap_slots * PAGE_SIZE / DEFAULT_SECTOR_SIZE,
    )
    .map_err(|_| VmError::Io)?;

    let mut vm: PlaygroundVm = Vm::new(
        config.vm,
        device,
        HeapPhysicalMemoryModule::new(config.frames),
    )?;
    let mut rand = SmallRng::seed_from_u64(config.seed);

    let process = vm.create_address_space();
    let image: Vec<u8> = (0..2 * PAGE_SIZE).map(|x| (x % 199) as u8).collect();
    vm.reserve_lazy_region(
        process,
        CODE,
        false,
        ContentSource::Segment {
            file: MemoryFileModule::new(image.clone()),
            offset: 0,
            read_bytes: image.len(),
            zero_bytes: 0,
        },
    )?;
    vm.reserve_lazy_region(
        process,
        HEAP,
        true,
        ContentSource::Anonymous {
            page_count: config.heap_pages,
        },
    )?;

    // a few stack frames deep, so the stack has to grow
    let rsp = vm.setup_stack(process)?;
    vm.user_write(process, rsp - 3 * PAGE_SIZE, &[0x5c; 64])?;
    info!("Stack grew to {:?}", vm.stack_bottom(process));

    let heap = fill_heap(&mut vm, process, config.heap_pages, &mut rand)?;
    check_heap(&mut vm, process, &heap, config.rounds, &mut rand)?;

    let mut code = vec![0u8; image.len()];
    vm.user_read(process, CODE, &mut code)?;
    assert_eq!(code, image, "program image was not loaded correctly");
    vm.check_integrity();

    let child = vm.fork(process)?;
    check_heap(&mut vm, child, &heap, config.rounds, &mut rand)?;
    vm.user_write(child, HEAP, &[0; 16])?;
    // the parent still sees its own first page
    check_heap(&mut vm, process, &heap, config.rounds / 10, &mut rand)?;
    vm.check_integrity();
    info!("Child {:?} is independent of its parent", child);

    map_file(&mut vm, process)?;

    let summary = Summary {
        frames: config.frames,
        swap_slots: vm.swap_slot_count(),
        heap_pages: config.heap_pages,
        resident_frames: vm.resident_frame_count(),
        swap_slots_in_use: vm.swap_slots_in_use()?,
        parent_pages: vm.page_count(process),
        child_pages: vm.page_count(child),
        stack_bottom: vm.stack_bottom(process).map(|x| x.as_usize()),
    };

    vm.destroy_address_space(child)?;
    vm.destroy_address_space(process)?;
    vm.check_integrity();

    Ok(summary)
}

fn fill_heap(
    vm: &mut PlaygroundVm,
    process: AddressSpaceId,
    heap_pages: usize,
    rand: &mut SmallRng,
) -> Result<Vec<Vec<u8>>, VmError> {
    let mut pages = Vec::with_capacity(heap_pages);
    for i in 0..heap_pages {
        let data = rand_page(rand);
        vm.user_write(process, HEAP + i * PAGE_SIZE, &data)?;
        pages.push(data);
    }

    info!(
        "Filled {} heap pages, {} of them are on swap",
        heap_pages,
        vm.swap_slots_in_use()?
    );
    Ok(pages)
}

/// Reads random heap pages and compares them with what was written
fn check_heap(
    vm: &mut PlaygroundVm,
    process: AddressSpaceId,
    heap: &[Vec<u8>],
    rounds: usize,
    rand: &mut SmallRng,
) -> Result<(), VmError> {
    if heap.is_empty() {
        return Ok(());
    }

    let mut data = vec![0u8; PAGE_SIZE];
    for _ in 0..rounds {
        let i = rand.next_u32() as usize % heap.len();
        vm.user_read(process, HEAP + i * PAGE_SIZE, &mut data)?;
        assert_eq!(data, heap[i], "heap page {} changed", i);
    }

    Ok(())
}

/// Maps a file, modifies it through memory and unmaps it again
fn map_file(vm: &mut PlaygroundVm, process: AddressSpaceId) -> Result<(), VmError> {
    let file = MemoryFileModule::new(vec![b'.'; 3000]);
    vm.mmap(process, MAP, file.length() as usize, true, &file, 0)?;

    vm.user_write(process, MAP + 100, b"written through memory")?;
    vm.munmap(process, MAP)?;

    let content = file.content();
    info!(
        "Mapped file reads {:?}",
        String::from_utf8_lossy(&content[96..126])
    );
    Ok(())
}
