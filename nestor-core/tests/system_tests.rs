mod common;

use nestor_core::cart::{Cartridge, Mirroring};
use nestor_core::cpu::Mem;
use nestor_core::events::{Event, EventQueue};
use nestor_core::ppu::{PpuStatus, CYCLES_PER_SCANLINE, PPU, SCANLINES_PER_FRAME};
use nestor_core::rom::Rom;
use nestor_core::{Nes, NesError};

const FULL_FRAME: u32 = CYCLES_PER_SCANLINE as u32 * SCANLINES_PER_FRAME as u32;

fn nrom_cart() -> Cartridge {
    let prg = common::program_rom(&[], 0x8000, 0x8000, 0x8000);
    Cartridge::new(Rom::new(prg, vec![0; common::CHR_BANK], Mirroring::VERTICAL, 0)).unwrap()
}

// Dots until the PPU next reports a finished frame
fn dots_to_next_frame(ppu: &mut PPU, cart: &Cartridge, events: &mut EventQueue) -> u32 {
    let mut dots = 0;
    loop {
        dots += 1;
        if ppu.step(cart, events) {
            return dots;
        }
    }
}

#[test]
fn frame_timing() {
    let mut cart = nrom_cart();
    let mut events = EventQueue::new();
    let mut ppu = PPU::new();

    dots_to_next_frame(&mut ppu, &cart, &mut events);
    assert_eq!(dots_to_next_frame(&mut ppu, &cart, &mut events), FULL_FRAME);
    assert_eq!(dots_to_next_frame(&mut ppu, &cart, &mut events), FULL_FRAME);

    // With rendering on the frames alternate; the odd ones are one dot short
    ppu.write_register(&mut cart, &mut events, 0x2001, 0x18);
    let odd = dots_to_next_frame(&mut ppu, &cart, &mut events);
    let even = dots_to_next_frame(&mut ppu, &cart, &mut events);
    assert_eq!(odd.min(even), FULL_FRAME - 1);
    assert_eq!(odd + even, 2 * FULL_FRAME - 1);
    assert!(events.is_empty());
}

#[test]
fn vblank_flag_window() {
    let mut cart = nrom_cart();
    let mut events = EventQueue::new();
    let mut ppu = PPU::new();
    ppu.write_register(&mut cart, &mut events, 0x2000, 0x80);

    while !(ppu.scanline() == 241 && ppu.cycle() == 1) {
        ppu.step(&cart, &mut events);
        assert!(!ppu.status().contains(PpuStatus::VBLANK));
    }
    ppu.step(&cart, &mut events);
    assert!(ppu.status().contains(PpuStatus::VBLANK));
    assert_eq!(events.pop(), Some(Event::Nmi));

    while !(ppu.scanline() == -1 && ppu.cycle() == 1) {
        ppu.step(&cart, &mut events);
        assert!(ppu.status().contains(PpuStatus::VBLANK));
    }
    ppu.step(&cart, &mut events);
    assert!(!ppu.status().contains(PpuStatus::VBLANK));
}

#[test]
fn sprite_overflow_after_dma() {
    // LDA #$02; STA $4014; LDA #$10; STA $2001; JMP $800A
    let program = [0xA9, 0x02, 0x8D, 0x14, 0x40, 0xA9, 0x10, 0x8D, 0x01, 0x20, 0x4C, 0x0A, 0x80];
    let prg = common::program_rom(&[(0x8000, &program[..])], 0x8000, 0x8000, 0x8000);
    let mut nes = Nes::from_ines(&common::ines_image(&prg, &[0; common::CHR_BANK], 0, false)).unwrap();

    for i in 0..64u16 {
        let y = if i < 9 { 0x20 } else { 0xFF };
        nes.bus.mem_write(0x0200 + i * 4, y);
        nes.bus.mem_write(0x0200 + i * 4 + 1, i as u8);
        nes.bus.mem_write(0x0200 + i * 4 + 3, (i * 8) as u8);
    }

    while !(nes.bus.ppu.scanline() == 0x20 && nes.bus.ppu.cycle() >= 257) {
        nes.step();
    }
    assert_eq!(nes.bus.ppu.oam[4 * 8 + 1], 8);
    assert!(nes.bus.ppu.status().contains(PpuStatus::SPRITE_OVERFLOW));
    let secondary = nes.bus.ppu.secondary_oam();
    for i in 0..8 {
        assert_eq!(secondary[i * 4], 0x20);
        assert_eq!(secondary[i * 4 + 1], i as u8);
    }
}

// Renders with NMIs and DMA running, so a save-state has to capture
// everything in flight to stay in step
fn busy_rom() -> Vec<u8> {
    // reset: LDA #$1E; STA $2001; LDA #$80; STA $2000
    // loop:  INC $10; LDA $10; STA $0200,X; INX; JMP loop
    let reset = [
        0xA9, 0x1E, 0x8D, 0x01, 0x20, 0xA9, 0x80, 0x8D, 0x00, 0x20,
        0xE6, 0x10, 0xA5, 0x10, 0x9D, 0x00, 0x02, 0xE8, 0x4C, 0x0A, 0x80,
    ];
    // nmi: LDA #$02; STA $4014; INC $11; LDA #$3F; STA $2006; LDA $11; STA $2006; STA $2007; RTI
    let nmi = [
        0xA9, 0x02, 0x8D, 0x14, 0x40, 0xE6, 0x11, 0xA9, 0x3F, 0x8D, 0x06, 0x20,
        0xA5, 0x11, 0x8D, 0x06, 0x20, 0x8D, 0x07, 0x20, 0x40,
    ];
    let prg = common::program_rom(&[(0x8000, &reset[..]), (0x9000, &nmi[..])], 0x9000, 0x8000, 0x8000);
    let chr: Vec<u8> = (0..common::CHR_BANK).map(|i| (i * 7) as u8).collect();
    common::ines_image(&prg, &chr, 0, true)
}

#[test]
fn save_state_round_trip() {
    let mut original = Nes::from_ines(&busy_rom()).unwrap();
    for _ in 0..3 {
        original.run_frame();
    }
    let state = original.save_state().unwrap();

    let mut restored = Nes::from_ines(&busy_rom()).unwrap();
    restored.run_frame();
    restored.load_state(&state).unwrap();

    for _ in 0..30_000 {
        original.step();
        restored.step();
    }

    assert_eq!(original.cpu.program_counter, restored.cpu.program_counter);
    assert_eq!(original.cpu.register_a, restored.cpu.register_a);
    assert_eq!(original.cpu.instruction_count, restored.cpu.instruction_count);
    assert_eq!(original.bus.memory(), restored.bus.memory());
    assert_eq!(original.bus.ppu.oam, restored.bus.ppu.oam);
    assert!(original.frame().pixels == restored.frame().pixels);
    assert_eq!(original.save_state().unwrap(), restored.save_state().unwrap());
}

#[test]
fn save_state_from_other_cartridge_is_rejected() {
    let mut nrom = Nes::from_ines(&busy_rom()).unwrap();
    let state = nrom.save_state().unwrap();

    let prg = common::program_rom(&[], 0x8000, 0x8000, 0x8000);
    let mut mmc1 = Nes::from_ines(&common::ines_image(&prg, &[], 1, false)).unwrap();
    let pc = mmc1.cpu.program_counter;
    assert!(matches!(mmc1.load_state(&state), Err(NesError::InvalidSaveState(_))));
    assert_eq!(mmc1.cpu.program_counter, pc);
}

#[test]
fn nrom_single_bank_is_mirrored() {
    let mut prg = vec![0; common::PRG_BANK];
    prg[0] = 0xAA;
    let nes = Nes::from_ines(&common::ines_image(&prg, &[0; common::CHR_BANK], 0, false)).unwrap();
    assert_eq!(nes.bus.peek(0x8000), 0xAA);
    assert_eq!(nes.bus.peek(0xC000), 0xAA);

    let mut prg = vec![0; 2 * common::PRG_BANK];
    prg[0] = 0xAA;
    prg[common::PRG_BANK] = 0xBB;
    let nes = Nes::from_ines(&common::ines_image(&prg, &[0; common::CHR_BANK], 0, false)).unwrap();
    assert_eq!(nes.bus.peek(0x8000), 0xAA);
    assert_eq!(nes.bus.peek(0xC000), 0xBB);
}

#[test]
fn mmc1_reset_fixes_last_bank() {
    // Four banks, each filled with its own index
    let prg: Vec<u8> = (0..4 * common::PRG_BANK).map(|i| (i / common::PRG_BANK) as u8).collect();
    let mut nes = Nes::from_ines(&common::ines_image(&prg, &[], 1, false)).unwrap();

    // Control = 0: 32KB mode, so the PRG register picks a bank pair
    for _ in 0..5 {
        nes.bus.mem_write(0x8000, 0);
    }
    let serial_write = |nes: &mut Nes, addr: u16, value: u8| {
        for i in 0..5 {
            nes.bus.mem_write(addr, (value >> i) & 1);
        }
    };
    serial_write(&mut nes, 0xE000, 0x02);
    assert_eq!(nes.bus.peek(0x8000), 2);
    assert_eq!(nes.bus.peek(0xC000), 3);

    serial_write(&mut nes, 0xE000, 0x00);
    assert_eq!(nes.bus.peek(0xC000), 1);

    // The reset bit lands at any PRG address and restores the fixed last bank
    nes.bus.mem_write(0xA123, 0x80);
    assert_eq!(nes.bus.peek(0xC000), 3);
    serial_write(&mut nes, 0xE000, 0x01);
    assert_eq!(nes.bus.peek(0x8000), 1);
    assert_eq!(nes.bus.peek(0xC000), 3);
}

#[test]
fn rejects_bad_images() {
    assert!(matches!(Nes::from_ines(b"NES"), Err(NesError::InvalidRom(_))));

    let prg = vec![0; common::PRG_BANK];
    let mut image = common::ines_image(&prg, &[], 0, false);
    image[0] = b'X';
    assert!(matches!(Nes::from_ines(&image), Err(NesError::InvalidRom(_))));

    assert!(matches!(
        Nes::from_ines(&common::ines_image(&prg, &[], 2, false)),
        Err(NesError::UnsupportedMapper(2))
    ));
}
