//! Block device behaviour against the emulated part

use sectorflash_core::cache::CacheState;
use sectorflash_core::config::FlashConfig;
use sectorflash_core::flash::{BlockDevice, SerialFlash};
use sectorflash_core::spi::opcodes;
use sectorflash_dummy::{BusEvent, DummyChip};

const SECTOR: usize = 512;

fn attach(chip: &mut DummyChip) -> SerialFlash<&mut DummyChip> {
    SerialFlash::attach(chip, FlashConfig::default()).unwrap()
}

/// Attach, then forget the bring-up traffic
fn attach_quiet(chip: &mut DummyChip) -> SerialFlash<&mut DummyChip> {
    chip.clear_events();
    attach(chip)
}

fn count_commands(chip: &DummyChip, pred: impl Fn(u8, Option<u32>) -> bool) -> usize {
    chip.events()
        .iter()
        .filter(|event| matches!(event, BusEvent::Command { opcode, address } if pred(*opcode, *address)))
        .count()
}

fn addressed_aai(chip: &DummyChip) -> usize {
    count_commands(chip, |op, addr| op == opcodes::AAI && addr.is_some())
}

fn sector_erases(chip: &DummyChip) -> usize {
    count_commands(chip, |op, _| op == opcodes::SE_20)
}

#[test]
fn test_attach_identifies_and_unprotects() {
    let mut chip = DummyChip::new_default();
    let flash = attach(&mut chip);
    assert_eq!(flash.chip_geometry().block_count(), 512);
    assert_eq!(flash.geometry().erase_block_count, 4096);
    flash.detach().unwrap();

    assert!(!chip.status().is_protected());
    assert!(!chip.is_locked());
    assert!(chip.violations().is_empty());
}

#[test]
fn test_read_after_write_per_sector() {
    let mut chip = DummyChip::new_default();
    let mut flash = attach(&mut chip);

    for sector in [0u32, 1, 7, 8, 100, 4095] {
        let data = vec![sector as u8 ^ 0x5A; SECTOR];
        assert_eq!(flash.write(sector, 1, &data), Ok(1));
        let mut out = vec![0u8; SECTOR];
        assert_eq!(flash.read(sector, 1, &mut out), Ok(1));
        assert_eq!(out, data, "sector {}", sector);
    }
    flash.detach().unwrap();

    // Same contents after everything has been committed
    let mut flash = attach(&mut chip);
    for sector in [0u32, 1, 7, 8, 100, 4095] {
        let mut out = vec![0u8; SECTOR];
        flash.read(sector, 1, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == sector as u8 ^ 0x5A));
    }
    drop(flash);
    assert!(chip.violations().is_empty());
}

#[test]
fn test_erase_then_read_gives_erased_state() {
    let mut chip = DummyChip::new_default();
    chip.data_mut()[..8192].fill(0x00);
    let mut flash = attach(&mut chip);

    assert_eq!(flash.erase(2, 3), Ok(3));
    let mut out = vec![0u8; 5 * SECTOR];
    flash.read(1, 5, &mut out).unwrap();
    assert!(out[..SECTOR].iter().all(|&b| b == 0x00));
    assert!(out[SECTOR..4 * SECTOR].iter().all(|&b| b == 0xFF));
    assert!(out[4 * SECTOR..].iter().all(|&b| b == 0x00));
    flash.detach().unwrap();

    // Surrounding sectors were written back
    assert!(chip.data()[..1024].iter().all(|&b| b == 0x00));
    assert!(chip.data()[1024..2560].iter().all(|&b| b == 0xFF));
    assert!(chip.data()[2560..8192].iter().all(|&b| b == 0x00));
    assert!(chip.violations().is_empty());
}

#[test]
fn test_erased_sector_write_into_erased_block_needs_no_erase() {
    let mut chip = DummyChip::new_default();
    let mut flash = attach_quiet(&mut chip);

    flash.erase(0, 1).unwrap();
    flash.write(1, 1, &[0xFF; SECTOR]).unwrap();
    flash.detach().unwrap();

    assert_eq!(sector_erases(&chip), 1);
}

#[test]
fn test_flush_twice_programs_once() {
    let mut chip = DummyChip::new_default();
    let mut flash = attach_quiet(&mut chip);

    flash.write(0, 1, &[0x00; SECTOR]).unwrap();
    flash.flush().unwrap();
    assert_eq!(flash.cache_state(), Some(CacheState::Valid));
    flash.flush().unwrap();
    flash.detach().unwrap();

    assert_eq!(addressed_aai(&chip), 1);
    assert_eq!(chip.program_count(), SECTOR / 2);
}

#[test]
fn test_eviction_programs_before_loading() {
    let mut chip = DummyChip::new_default();
    let mut flash = attach_quiet(&mut chip);

    flash.write(0, 1, &[0x11; SECTOR]).unwrap();
    // Sector 8 lives in block 1
    flash.write(8, 1, &[0x22; SECTOR]).unwrap();
    assert_eq!(flash.resident_block(), Some(1));
    flash.detach().unwrap();

    let events = chip.events();
    let last_block0_program = events
        .iter()
        .rposition(|e| matches!(e, BusEvent::Command { opcode: opcodes::AAI, address: Some(0) }))
        .unwrap();
    let block1_load = events
        .iter()
        .position(|e| {
            matches!(e, BusEvent::Command { opcode: opcodes::FAST_READ, address: Some(0x1000) })
        })
        .unwrap();
    assert!(last_block0_program < block1_load);
    assert_eq!(&chip.data()[..SECTOR], &[0x11; SECTOR][..]);
    assert_eq!(&chip.data()[0x1000..0x1000 + SECTOR], &[0x22; SECTOR][..]);
}

#[test]
fn test_single_sector_in_large_block() {
    let mut chip = DummyChip::new_default();
    let mut flash = attach_quiet(&mut chip);

    flash.write(3, 1, &[0xAA; SECTOR]).unwrap();
    flash.flush().unwrap();

    let mut out = vec![0u8; 8 * SECTOR];
    flash.read(0, 8, &mut out).unwrap();
    flash.detach().unwrap();

    for (sector, data) in out.chunks(SECTOR).enumerate() {
        let expected = if sector == 3 { 0xAA } else { 0xFF };
        assert!(data.iter().all(|&b| b == expected), "sector {}", sector);
    }
    assert_eq!(
        count_commands(&chip, |op, addr| op == opcodes::SE_20 && addr == Some(0)),
        1
    );
    assert_eq!(chip.erase_count(), 1);
    assert_eq!(addressed_aai(&chip), 1);
    assert_eq!(count_commands(&chip, |op, _| op == opcodes::WRDI), 1);
    assert!(chip.violations().is_empty());
}

#[test]
fn test_adjacent_writes_share_erase_and_flush() {
    let mut chip = DummyChip::new_default();
    let mut flash = attach_quiet(&mut chip);

    flash.write(0, 1, &[0x01; SECTOR]).unwrap();
    flash.write(1, 1, &[0x02; SECTOR]).unwrap();
    assert_eq!(flash.cache_state(), Some(CacheState::Dirty));
    flash.detach().unwrap();

    assert_eq!(chip.erase_count(), 1);
    // Both sectors go out in one auto-increment run
    assert_eq!(addressed_aai(&chip), 1);
    assert_eq!(&chip.data()[..SECTOR], &[0x01; SECTOR][..]);
    assert_eq!(&chip.data()[SECTOR..2 * SECTOR], &[0x02; SECTOR][..]);
}

#[test]
fn test_multi_sector_write_across_blocks() {
    let mut chip = DummyChip::new_default();
    let mut flash = attach_quiet(&mut chip);

    let data: Vec<u8> = (0..4 * SECTOR).map(|i| (i / SECTOR) as u8).collect();
    assert_eq!(flash.write(6, 4, &data), Ok(4));
    let mut out = vec![0u8; 4 * SECTOR];
    flash.read(6, 4, &mut out).unwrap();
    assert_eq!(out, data);
    flash.detach().unwrap();

    assert_eq!(chip.erase_count(), 2);
    assert_eq!(&chip.data()[6 * SECTOR..10 * SECTOR], &data[..]);
    assert!(chip.violations().is_empty());
}

#[test]
fn test_read_of_other_block_keeps_resident_block() {
    let mut chip = DummyChip::new_default();
    chip.data_mut()[0x3000..0x3010].fill(0x42);
    let mut flash = attach(&mut chip);

    flash.write(0, 1, &[0x00; SECTOR]).unwrap();
    let mut out = [0u8; 16];
    flash.read_bytes(0x3000, &mut out).unwrap();
    assert_eq!(out, [0x42; 16]);
    assert_eq!(flash.resident_block(), Some(0));
    assert_eq!(flash.cache_state(), Some(CacheState::Valid));
    drop(flash);
    assert!(chip.violations().is_empty());
}

#[test]
fn test_read_bytes_sees_staged_data() {
    let mut chip = DummyChip::new_default();
    let mut flash = attach(&mut chip);

    flash.write(1, 1, &[0x33; SECTOR]).unwrap();
    let mut out = [0u8; 4];
    flash.read_bytes(SECTOR as u32 - 2, &mut out).unwrap();
    assert_eq!(out, [0xFF, 0xFF, 0x33, 0x33]);
}

#[test]
fn test_drop_flushes() {
    let mut chip = DummyChip::new_default();
    {
        let mut flash = attach(&mut chip);
        flash.write(5, 1, &[0x77; SECTOR]).unwrap();
    }
    assert_eq!(&chip.data()[5 * SECTOR..6 * SECTOR], &[0x77; SECTOR][..]);
    assert!(!chip.is_locked());
}

#[test]
fn test_bulk_erase() {
    let mut chip = DummyChip::new_default();
    chip.data_mut().fill(0x00);
    let mut flash = attach(&mut chip);

    flash.write(0, 1, &[0x12; SECTOR]).unwrap();
    flash.bulk_erase().unwrap();
    let mut out = [0u8; SECTOR];
    flash.read(0, 1, &mut out).unwrap();
    assert_eq!(out, [0xFF; SECTOR]);
    flash.detach().unwrap();

    assert!(chip.data().iter().all(|&b| b == 0xFF));
    assert!(chip.violations().is_empty());
}

#[test]
fn test_every_operation_is_bracketed_by_lock() {
    let mut chip = DummyChip::new_default();
    let mut flash = attach_quiet(&mut chip);
    flash.write(0, 1, &[0x00; SECTOR]).unwrap();
    flash.read(0, 1, &mut [0u8; SECTOR]).unwrap();
    flash.flush().unwrap();
    flash.detach().unwrap();

    let mut locked = false;
    for event in chip.events() {
        match event {
            BusEvent::Lock => {
                assert!(!locked);
                locked = true;
            }
            BusEvent::Unlock => {
                assert!(locked);
                locked = false;
            }
            BusEvent::Configure(_) => assert!(locked),
            BusEvent::Command { .. } => assert!(locked),
        }
    }
    assert!(!locked);
}
