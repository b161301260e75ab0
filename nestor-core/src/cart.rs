use enum_dispatch::enum_dispatch;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::NesError;
use crate::rom::{Rom, CHR_PAGE_SIZE, PRG_PAGE_SIZE};

const CHR_RAM_SIZE: usize = 8192;
const MMC1_CHR_BANK_SIZE: usize = 4096;

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum Mirroring {
    HORIZONTAL,
    VERTICAL,
    SINGLE_LOWER,
    SINGLE_UPPER,
}


#[enum_dispatch]
pub trait Mapper {
    /// Offset into PRG ROM for a CPU address in $8000-$FFFF.
    fn translate_prg(&self, addr: u16) -> usize;
    /// Offset into CHR memory for a PPU address in $0000-$1FFF.
    fn translate_chr(&self, addr: u16) -> usize;
    /// Returns false when the mapper has nothing listening at `addr`.
    fn write_register(&mut self, addr: u16, value: u8) -> bool;
    fn mirroring(&self) -> Mirroring;
}

#[enum_dispatch(Mapper)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MapperKind {
    NROM,
    MMC1,
}


//// NROM: Mapper 0 ////
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NROM {
    prg_banks: usize,
    mirroring: Mirroring,
}

impl NROM {
    pub fn new(prg_banks: usize, chr_banks: usize, mirroring: Mirroring) -> Result<Self, NesError> {
        if prg_banks != 1 && prg_banks != 2 {
            return Err(NesError::InvalidMapper(format!("NROM needs 1 or 2 PRG banks, found {}", prg_banks)));
        }
        if chr_banks > 1 {
            return Err(NesError::InvalidMapper(format!("NROM holds at most 1 CHR bank, found {}", chr_banks)));
        }
        Ok(NROM { prg_banks, mirroring })
    }
}

impl Mapper for NROM {
    fn translate_prg(&self, addr: u16) -> usize {
        // The PRG rom is located from 0x8000 to 0xFFFF,
        // but potentially takes less space.
        // In that case, the PRG rom is mirrored over.
        let shifted_addr = (addr - 0x8000) as usize;
        if self.prg_banks == 1 { shifted_addr % PRG_PAGE_SIZE } else { shifted_addr }
    }

    fn translate_chr(&self, addr: u16) -> usize { addr as usize }
    fn write_register(&mut self, _: u16, _: u8) -> bool { false }
    fn mirroring(&self) -> Mirroring { self.mirroring }
}


//// MMC1: Mapper 1 ////
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MMC1 {
    // Serial port
    load: u8,
    write_count: u8,

    // Internal registers, as written through the serial port
    control: u8,
    chr_bank0_reg: u8,
    chr_bank1_reg: u8,
    prg_bank_reg: u8,

    // Banks currently mapped in, derived from the registers
    prg_bank0: usize,
    prg_bank1: usize,
    chr_bank0: usize,
    chr_bank1: usize,
    mirroring: Mirroring,

    prg_banks: usize,
    chr_banks: usize,
}

impl MMC1 {
    pub fn new(prg_banks: usize, chr_size: usize) -> Self {
        let mut mapper = MMC1 {
            load: 0,
            write_count: 0,
            control: 0x0C,
            chr_bank0_reg: 0,
            chr_bank1_reg: 0,
            prg_bank_reg: 0,
            prg_bank0: 0,
            prg_bank1: 0,
            chr_bank0: 0,
            chr_bank1: 1,
            mirroring: Mirroring::SINGLE_LOWER,
            prg_banks: prg_banks.max(1),
            chr_banks: (chr_size / MMC1_CHR_BANK_SIZE).max(1),
        };
        mapper.update_banks();
        mapper
    }

    // Control register layout:
    // - - - C P P M M
    //       ^ ^ ^ ^ ^
    //       | | | +-+- Mirroring (0: one-screen lower, 1: one-screen upper, 2: vertical, 3: horizontal)
    //       | +-+----- PRG bank mode (0, 1: 32KB; 2: fix first bank; 3: fix last bank)
    //       +--------- CHR bank mode (0: 8KB, 1: two 4KB banks)
    pub fn prg_bank_mode(&self) -> u8 { (self.control >> 2) & 0b11 }

    fn update_banks(&mut self) {
        self.mirroring = match self.control & 0b11 {
            0 => Mirroring::SINGLE_LOWER,
            1 => Mirroring::SINGLE_UPPER,
            2 => Mirroring::VERTICAL,
            3 => Mirroring::HORIZONTAL,
            _ => unreachable!(),
        };

        if self.control & 0b1_0000 == 0 {
            // 8KB at once, low bit of the bank number ignored
            self.chr_bank0 = (self.chr_bank0_reg & 0b1_1110) as usize;
            self.chr_bank1 = self.chr_bank0 + 1;
        } else {
            self.chr_bank0 = self.chr_bank0_reg as usize;
            self.chr_bank1 = self.chr_bank1_reg as usize;
        }

        self.update_prg_banks();
    }

    fn update_prg_banks(&mut self) {
        match self.prg_bank_mode() {
            0 | 1 => {
                if self.prg_bank_reg & 0b1_0000 != 0 {
                    warn!("MMC1 PRG bank {:02X} selected with bit 4 set", self.prg_bank_reg);
                }
                self.prg_bank0 = (self.prg_bank_reg & 0b1110) as usize;
                self.prg_bank1 = self.prg_bank0 + 1;
            }
            2 => {
                self.prg_bank0 = 0;
                self.prg_bank1 = (self.prg_bank_reg & 0b1111) as usize;
            }
            3 => {
                self.prg_bank0 = (self.prg_bank_reg & 0b1111) as usize;
                self.prg_bank1 = self.prg_banks - 1;
            }
            _ => unreachable!(),
        }
    }
}

impl Mapper for MMC1 {
    fn translate_prg(&self, addr: u16) -> usize {
        let bank = if addr < 0xC000 { self.prg_bank0 } else { self.prg_bank1 };
        (bank % self.prg_banks) * PRG_PAGE_SIZE + (addr & 0x3FFF) as usize
    }

    fn translate_chr(&self, addr: u16) -> usize {
        let bank = if addr < 0x1000 { self.chr_bank0 } else { self.chr_bank1 };
        (bank % self.chr_banks) * MMC1_CHR_BANK_SIZE + (addr & 0x0FFF) as usize
    }

    fn write_register(&mut self, addr: u16, value: u8) -> bool {
        // A write with bit 7 set clears the shift register and locks
        // the last PRG bank in place
        if value & 0b1000_0000 != 0 {
            self.load = 0;
            self.write_count = 0;
            self.control |= 0x0C;
            self.update_prg_banks();
            return true;
        }

        // Bits arrive LSB first, so each one enters at bit 4
        self.load = (self.load >> 1) | ((value & 1) << 4);
        self.write_count += 1;

        if self.write_count == 5 {
            // Bits 13 and 14 of the final write pick the target register
            match (addr >> 13) & 0b11 {
                0 => self.control = self.load,
                1 => self.chr_bank0_reg = self.load,
                2 => self.chr_bank1_reg = self.load,
                3 => self.prg_bank_reg = self.load,
                _ => unreachable!(),
            }
            self.load = 0;
            self.write_count = 0;
            self.update_banks();
        }
        true
    }

    fn mirroring(&self) -> Mirroring { self.mirroring }
}


/// Mapper registers plus any cartridge RAM, as stored in a save-state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartridgeState {
    pub mapper: MapperKind,
    pub chr_ram: Option<Vec<u8>>,
}

pub struct Cartridge {
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
    mapper_id: u8,
    pub mapper: MapperKind,
}

impl Cartridge {
    pub fn new(rom: Rom) -> Result<Cartridge, NesError> {
        let prg_banks = rom.prg_banks();
        if prg_banks == 0 || rom.prg_rom.len() % PRG_PAGE_SIZE != 0 {
            return Err(NesError::InvalidRom(format!("PRG ROM of {} bytes is not a whole number of banks", rom.prg_rom.len())));
        }
        if rom.chr_rom.len() % CHR_PAGE_SIZE != 0 {
            return Err(NesError::InvalidRom(format!("CHR ROM of {} bytes is not a whole number of banks", rom.chr_rom.len())));
        }

        let chr_banks = rom.chr_banks();
        // No CHR ROM means the board carries 8KB of CHR RAM instead
        let chr_is_ram = rom.chr_rom.is_empty();
        let chr = if chr_is_ram { vec![0; CHR_RAM_SIZE] } else { rom.chr_rom };

        let mapper = match rom.mapper {
            0x00 => MapperKind::NROM(NROM::new(prg_banks, chr_banks, rom.mirroring)?),
            0x01 => MapperKind::MMC1(MMC1::new(prg_banks, chr.len())),
            id => return Err(NesError::UnsupportedMapper(id)),
        };

        Ok(Cartridge { prg_rom: rom.prg_rom, chr, chr_is_ram, mapper_id: rom.mapper, mapper })
    }

    pub fn mapper_id(&self) -> u8 { self.mapper_id }
    pub fn mirroring(&self) -> Mirroring { self.mapper.mirroring() }

    /// Reads PRG ROM if `addr` falls in the cartridge's range.
    pub fn read_prg(&self, addr: u16) -> Option<u8> {
        if addr < 0x8000 {
            return None;
        }
        let offset = self.mapper.translate_prg(addr) % self.prg_rom.len();
        Some(self.prg_rom[offset])
    }

    /// Offers a CPU write to the mapper. Returns false if the address is
    /// outside the cartridge's range.
    pub fn write_prg(&mut self, addr: u16, value: u8) -> bool {
        if addr < 0x8000 {
            return false;
        }
        if !self.mapper.write_register(addr, value) {
            warn!("Ignoring write of {:02X} to PRG ROM at {:04X}", value, addr);
        }
        true
    }

    pub fn read_chr(&self, addr: u16) -> u8 {
        self.chr[self.mapper.translate_chr(addr) % self.chr.len()]
    }

    pub fn write_chr(&mut self, addr: u16, value: u8) {
        if !self.chr_is_ram {
            debug!("Ignoring write of {:02X} to CHR ROM at {:04X}", value, addr);
            return;
        }
        let offset = self.mapper.translate_chr(addr) % self.chr.len();
        self.chr[offset] = value;
    }

    pub fn state(&self) -> CartridgeState {
        CartridgeState {
            mapper: self.mapper.clone(),
            chr_ram: if self.chr_is_ram { Some(self.chr.clone()) } else { None },
        }
    }

    /// Checks that `state` was taken from a cartridge of the same shape.
    pub fn validate_state(&self, state: &CartridgeState) -> Result<(), NesError> {
        if std::mem::discriminant(&self.mapper) != std::mem::discriminant(&state.mapper) {
            return Err(NesError::InvalidSaveState("mapper registers belong to another mapper".to_string()));
        }
        match (&state.chr_ram, self.chr_is_ram) {
            (Some(ram), true) if ram.len() == self.chr.len() => Ok(()),
            (None, false) => Ok(()),
            _ => Err(NesError::InvalidSaveState("CHR RAM does not match the cartridge".to_string())),
        }
    }

    pub fn restore_state(&mut self, state: CartridgeState) {
        self.mapper = state.mapper;
        if let Some(ram) = state.chr_ram {
            self.chr = ram;
        }
    }
}


#[cfg(test)]
pub mod test {
    use super::*;

    // 32KB NROM cart with vertical mirroring, each PRG bank filled with its index
    pub fn test_cart() -> Cartridge {
        let mut prg = vec![0; 2 * PRG_PAGE_SIZE];
        prg[PRG_PAGE_SIZE..].iter_mut().for_each(|b| *b = 1);
        let chr = (0..CHR_PAGE_SIZE).map(|i| (i & 0xFF) as u8).collect();
        Cartridge::new(Rom::new(prg, chr, Mirroring::VERTICAL, 0)).unwrap()
    }

    fn mmc1_cart(prg_banks: usize) -> Cartridge {
        let prg = (0..prg_banks * PRG_PAGE_SIZE).map(|i| (i / PRG_PAGE_SIZE) as u8).collect();
        Cartridge::new(Rom::new(prg, vec![], Mirroring::HORIZONTAL, 1)).unwrap()
    }

    fn mmc1_write(cart: &mut Cartridge, addr: u16, value: u8) {
        for i in 0..5 {
            cart.write_prg(addr, (value >> i) & 1);
        }
    }

    fn mmc1_mode(cart: &Cartridge) -> u8 {
        match &cart.mapper {
            MapperKind::MMC1(m) => m.prg_bank_mode(),
            _ => panic!("not an MMC1 cart"),
        }
    }

    #[test]
    fn test_nrom_single_bank_is_mirrored() {
        let prg = (0..PRG_PAGE_SIZE).map(|i| (i % 251) as u8).collect();
        let cart = Cartridge::new(Rom::new(prg, vec![0; CHR_PAGE_SIZE], Mirroring::HORIZONTAL, 0)).unwrap();

        assert_eq!(cart.read_prg(0x8000), cart.read_prg(0xC000));
        assert_eq!(cart.read_prg(0x9234), cart.read_prg(0xD234));
        assert_eq!(cart.read_prg(0x7FFF), None);
    }

    #[test]
    fn test_nrom_two_banks_are_distinct() {
        let cart = test_cart();
        assert_eq!(cart.read_prg(0x8000), Some(0));
        assert_eq!(cart.read_prg(0xC000), Some(1));
        assert_eq!(cart.read_prg(0xFFFF), Some(1));
    }

    #[test]
    fn test_nrom_rejects_bad_layouts() {
        let rom = Rom::new(vec![0; 3 * PRG_PAGE_SIZE], vec![], Mirroring::HORIZONTAL, 0);
        assert!(matches!(Cartridge::new(rom), Err(NesError::InvalidMapper(_))));

        let rom = Rom::new(vec![0; PRG_PAGE_SIZE], vec![], Mirroring::HORIZONTAL, 4);
        assert!(matches!(Cartridge::new(rom), Err(NesError::UnsupportedMapper(4))));
    }

    #[test]
    fn test_nrom_ignores_prg_writes() {
        let mut cart = test_cart();
        assert!(cart.write_prg(0x8000, 0x55));
        assert_eq!(cart.read_prg(0x8000), Some(0));
        assert!(!cart.write_prg(0x6000, 0x55));
    }

    #[test]
    fn test_chr_rom_is_read_only_and_chr_ram_is_not() {
        let mut cart = test_cart();
        cart.write_chr(0x0010, 0xAA);
        assert_eq!(cart.read_chr(0x0010), 0x10);

        let mut cart = mmc1_cart(2);
        cart.write_chr(0x0010, 0xAA);
        assert_eq!(cart.read_chr(0x0010), 0xAA);
        assert!(cart.state().chr_ram.is_some());
    }

    #[test]
    fn test_mmc1_powers_up_with_last_bank_fixed() {
        let cart = mmc1_cart(8);
        assert_eq!(mmc1_mode(&cart), 3);
        assert_eq!(cart.read_prg(0x8000), Some(0));
        assert_eq!(cart.read_prg(0xC000), Some(7));
    }

    #[test]
    fn test_mmc1_serial_prg_switch() {
        let mut cart = mmc1_cart(8);
        mmc1_write(&mut cart, 0xE000, 5);

        assert_eq!(cart.read_prg(0x8000), Some(5));
        assert_eq!(cart.read_prg(0xC000), Some(7));
    }

    #[test]
    fn test_mmc1_32k_and_fixed_first_modes() {
        let mut cart = mmc1_cart(8);

        // 32KB mode ignores the low bit of the bank number
        mmc1_write(&mut cart, 0x8000, 0b0_0000);
        mmc1_write(&mut cart, 0xE000, 5);
        assert_eq!(cart.read_prg(0x8000), Some(4));
        assert_eq!(cart.read_prg(0xC000), Some(5));

        mmc1_write(&mut cart, 0x8000, 0b0_1000);
        assert_eq!(mmc1_mode(&cart), 2);
        assert_eq!(cart.read_prg(0x8000), Some(0));
        assert_eq!(cart.read_prg(0xC000), Some(5));
    }

    #[test]
    fn test_mmc1_reset_write_restores_fixed_last_bank() {
        let mut cart = mmc1_cart(4);
        mmc1_write(&mut cart, 0x8000, 0b0_1000);
        assert_eq!(mmc1_mode(&cart), 2);

        // Partial serial write, then reset
        cart.write_prg(0x8000, 1);
        cart.write_prg(0xA000, 0b1000_0000);
        assert_eq!(mmc1_mode(&cart), 3);
        assert_eq!(cart.read_prg(0xC000), Some(3));

        // The aborted write must not leak into the next one
        mmc1_write(&mut cart, 0xE000, 2);
        assert_eq!(cart.read_prg(0x8000), Some(2));
    }

    #[test]
    fn test_mmc1_mirroring_control() {
        let mut cart = mmc1_cart(2);
        mmc1_write(&mut cart, 0x8000, 0b0_1110);
        assert_eq!(cart.mirroring(), Mirroring::VERTICAL);
        mmc1_write(&mut cart, 0x8000, 0b0_1111);
        assert_eq!(cart.mirroring(), Mirroring::HORIZONTAL);
        mmc1_write(&mut cart, 0x8000, 0b0_1101);
        assert_eq!(cart.mirroring(), Mirroring::SINGLE_UPPER);
        mmc1_write(&mut cart, 0x8000, 0b0_1100);
        assert_eq!(cart.mirroring(), Mirroring::SINGLE_LOWER);
    }

    #[test]
    fn test_mmc1_4k_chr_banks() {
        let chr = (0..4 * CHR_PAGE_SIZE).map(|i| (i / MMC1_CHR_BANK_SIZE) as u8).collect();
        let mut cart = Cartridge::new(Rom::new(vec![0; 2 * PRG_PAGE_SIZE], chr, Mirroring::HORIZONTAL, 1)).unwrap();

        mmc1_write(&mut cart, 0x8000, 0b1_1100);
        mmc1_write(&mut cart, 0xA000, 3);
        mmc1_write(&mut cart, 0xC000, 6);

        assert_eq!(cart.read_chr(0x0000), 3);
        assert_eq!(cart.read_chr(0x1000), 6);
    }

    #[test]
    fn test_state_rejects_other_mapper() {
        let nrom = test_cart();
        let mmc1 = mmc1_cart(2);
        assert!(nrom.validate_state(&mmc1.state()).is_err());
        assert!(mmc1.validate_state(&mmc1.state()).is_ok());
    }
}
