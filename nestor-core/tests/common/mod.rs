#![allow(dead_code)]

pub const PRG_BANK: usize = 0x4000;
pub const CHR_BANK: usize = 0x2000;

/// Wraps raw PRG and CHR data in a 16-byte iNES header.
pub fn ines_image(prg: &[u8], chr: &[u8], mapper: u8, vertical: bool) -> Vec<u8> {
    assert_eq!(prg.len() % PRG_BANK, 0);
    assert_eq!(chr.len() % CHR_BANK, 0);
    let flags6 = ((mapper & 0x0F) << 4) | vertical as u8;
    let flags7 = mapper & 0xF0;
    let mut image = vec![
        0x4E, 0x45, 0x53, 0x1A,
        (prg.len() / PRG_BANK) as u8, (chr.len() / CHR_BANK) as u8,
        flags6, flags7,
        0, 0, 0, 0, 0, 0, 0, 0,
    ];
    image.extend_from_slice(prg);
    image.extend_from_slice(chr);
    image
}

/// 32KB of NOPs with each `(address, bytes)` segment copied in and the
/// NMI/reset/IRQ vectors filled.
pub fn program_rom(segments: &[(u16, &[u8])], nmi: u16, reset: u16, irq: u16) -> Vec<u8> {
    let mut prg = vec![0xEA; 2 * PRG_BANK];
    for (addr, bytes) in segments {
        let start = (*addr - 0x8000) as usize;
        prg[start..start + bytes.len()].copy_from_slice(bytes);
    }
    prg[0x7FFA..0x7FFC].copy_from_slice(&nmi.to_le_bytes());
    prg[0x7FFC..0x7FFE].copy_from_slice(&reset.to_le_bytes());
    prg[0x7FFE..0x8000].copy_from_slice(&irq.to_le_bytes());
    prg
}
