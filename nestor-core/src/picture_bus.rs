use serde::{Deserialize, Serialize};

use crate::cart::{Cartridge, Mirroring};

const PICTURE_BUS_SIZE: usize = 0x4000;

/// The PPU's 16KB address space. Pattern tables live on the cartridge;
/// nametables and palettes live here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PictureBus {
    memory: Vec<u8>,
}

impl Default for PictureBus {
    fn default() -> Self {
        PictureBus { memory: vec![0; PICTURE_BUS_SIZE] }
    }
}

impl PictureBus {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.memory.len() }

    pub fn read(&self, cart: &Cartridge, addr: u16) -> u8 {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => cart.read_chr(addr),
            0x2000..=0x3EFF => self.memory[mirror_vram_address(addr, cart.mirroring()) as usize],
            _ => self.memory[mirror_palette_address(addr) as usize],
        }
    }

    pub fn write(&mut self, cart: &mut Cartridge, addr: u16, value: u8) {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => cart.write_chr(addr, value),
            0x2000..=0x3EFF => self.memory[mirror_vram_address(addr, cart.mirroring()) as usize] = value,
            _ => self.memory[mirror_palette_address(addr) as usize] = value,
        }
    }
}

pub fn mirror_vram_address(addr: u16, mirroring: Mirroring) -> u16 {
    // mirror down 0x3000-0x3eff to 0x2000-0x2eff
    let mirrored_vram = addr & 0b10_1111_1111_1111;
    let name_table = (mirrored_vram - 0x2000) / 0x400;
    let offset = mirrored_vram & 0x03FF;
    // Map the four logical nametables onto the two physical ones
    let physical = match (mirroring, name_table) {
        (Mirroring::HORIZONTAL, 0) | (Mirroring::HORIZONTAL, 1) => 0,
        (Mirroring::HORIZONTAL, _) => 1,
        (Mirroring::VERTICAL, t) => t & 1,
        (Mirroring::SINGLE_LOWER, _) => 0,
        (Mirroring::SINGLE_UPPER, _) => 1,
    };
    0x2000 + physical * 0x400 + offset
}

fn mirror_palette_address(addr: u16) -> u16 {
    let addr = 0x3F00 | (addr & 0x1F);
    // $3F10/$3F14/$3F18/$3F1C share storage with the background entries
    if addr & 0x13 == 0x10 { addr & !0x10 } else { addr }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::cart::test;

    #[test]
    fn test_vram_mirroring() {
        // Mirroring an address in the first nametable should just drop the range
        let addr1 = 0x3011;
        assert_eq!(mirror_vram_address(addr1, Mirroring::VERTICAL), 0x2011);
        assert_eq!(mirror_vram_address(addr1, Mirroring::HORIZONTAL), 0x2011);

        let addr2 = 0x2410;
        assert_eq!(mirror_vram_address(addr2, Mirroring::VERTICAL), 0x2410);
        assert_eq!(mirror_vram_address(addr2, Mirroring::HORIZONTAL), 0x2010);

        let addr3 = 0x2810;
        assert_eq!(mirror_vram_address(addr3, Mirroring::VERTICAL), 0x2010);
        assert_eq!(mirror_vram_address(addr3, Mirroring::HORIZONTAL), 0x2410);

        let addr4 = 0x2C10;
        assert_eq!(mirror_vram_address(addr4, Mirroring::VERTICAL), 0x2410);
        assert_eq!(mirror_vram_address(addr4, Mirroring::HORIZONTAL), 0x2410);
        assert_eq!(mirror_vram_address(addr4, Mirroring::SINGLE_LOWER), 0x2010);
        assert_eq!(mirror_vram_address(addr2, Mirroring::SINGLE_UPPER), 0x2410);
    }

    #[test]
    fn test_palette_aliases() {
        let mut cart = test::test_cart();
        let mut bus = PictureBus::new();

        bus.write(&mut cart, 0x3F10, 0x21);
        assert_eq!(bus.read(&cart, 0x3F00), 0x21);

        bus.write(&mut cart, 0x3F04, 0x17);
        assert_eq!(bus.read(&cart, 0x3F14), 0x17);

        // Palette RAM repeats every 32 bytes
        assert_eq!(bus.read(&cart, 0x3F24), 0x17);

        // Sprite palette entries that are not colour 0 are distinct
        bus.write(&mut cart, 0x3F11, 0x05);
        assert_eq!(bus.read(&cart, 0x3F01), 0x00);
    }

    #[test]
    fn test_pattern_reads_go_to_cartridge() {
        let mut cart = test::test_cart();
        let mut bus = PictureBus::new();

        assert_eq!(bus.read(&cart, 0x0042), 0x42);
        bus.write(&mut cart, 0x0042, 0x00);
        assert_eq!(bus.read(&cart, 0x0042), 0x42);

        // Addresses above 0x3FFF wrap
        bus.write(&mut cart, 0x6005, 0x99);
        assert_eq!(bus.read(&cart, 0x2005), 0x99);
    }
}
