use log::{info, warn};

use crate::cart::Mirroring;
use crate::error::NesError;

// Magic string used to identify valid NES files
const NES_TAG: [u8; 4] = [0x4e, 0x45, 0x53, 0x1a];
const HEADER_SIZE: usize = 16;
const TRAINER_SIZE: usize = 512;

// Page sizes for both ROM types
pub const PRG_PAGE_SIZE: usize = 16384;
pub const CHR_PAGE_SIZE: usize = 8192;

/// Decoded cartridge contents. The core never looks at the raw header
/// again once this exists.
#[derive(Debug, Clone)]
pub struct Rom {
    pub prg_rom: Vec<u8>,
    /// Empty when the cartridge carries CHR RAM instead.
    pub chr_rom: Vec<u8>,
    pub mirroring: Mirroring,
    pub mapper: u8,
}

impl Rom {
    pub fn new(prg_rom: Vec<u8>, chr_rom: Vec<u8>, mirroring: Mirroring, mapper: u8) -> Self {
        Rom { prg_rom, chr_rom, mirroring, mapper }
    }

    /// Number of 16KB PRG banks.
    pub fn prg_banks(&self) -> usize { self.prg_rom.len() / PRG_PAGE_SIZE }

    /// Number of 8KB CHR banks. Zero means CHR RAM.
    pub fn chr_banks(&self) -> usize { self.chr_rom.len() / CHR_PAGE_SIZE }

    pub fn from_ines(data: &[u8]) -> Result<Rom, NesError> {
        if data.len() < HEADER_SIZE {
            return Err(NesError::InvalidRom("file is shorter than an iNES header".to_string()));
        }
        // Check magic string
        if data[0..4] != NES_TAG {
            return Err(NesError::InvalidRom("file is not in valid iNES format".to_string()));
        }

        let flags6 = data[6];
        let flags7 = data[7];

        // The iNES rom type is specified here. Only iNES 1.0 is supported
        if flags7 >> 2 & 0b11 == 0b10 {
            return Err(NesError::InvalidRom("NES 2.0 headers are not supported".to_string()));
        }

        let mapper = (flags7 & 0b1111_0000) | (flags6 >> 4);

        if flags6 & 0b1000 != 0 {
            warn!("Four-screen VRAM is not supported, using header mirroring bit");
        }
        if flags6 & 0b0010 != 0 {
            warn!("Battery-backed PRG RAM is not persisted");
        }
        let mirroring = if flags6 & 0b0001 != 0 { Mirroring::VERTICAL } else { Mirroring::HORIZONTAL };

        // Bytes 4 and 5 are the prg and chr rom sizes, in pages
        let prg_size = data[4] as usize * PRG_PAGE_SIZE;
        let chr_size = data[5] as usize * CHR_PAGE_SIZE;
        if prg_size == 0 {
            return Err(NesError::InvalidRom("header declares no PRG ROM".to_string()));
        }

        // Optional trainer section for Famicom support. Skip if present.
        let trainer_present = flags6 & 0b0100 != 0;
        if trainer_present {
            warn!("Trainer present, skipping it");
        }

        let prg_start = HEADER_SIZE + if trainer_present { TRAINER_SIZE } else { 0 };
        let chr_start = prg_start + prg_size;

        if data.len() < chr_start + chr_size {
            return Err(NesError::InvalidRom(format!(
                "file holds {} bytes but the header needs {}",
                data.len(),
                chr_start + chr_size
            )));
        }

        let prg_rom = data[prg_start..chr_start].to_vec();
        let chr_rom = data[chr_start..(chr_start + chr_size)].to_vec();

        info!(
            "Loaded ROM: mapper {}, {} PRG bank(s), {} CHR bank(s), {:?} mirroring",
            mapper, data[4], data[5], mirroring
        );

        Ok(Rom::new(prg_rom, chr_rom, mirroring, mapper))
    }
}


#[cfg(test)]
pub mod test {
    use super::*;

    pub fn ines_image(prg_banks: u8, chr_banks: u8, flags6: u8, flags7: u8) -> Vec<u8> {
        let mut data = vec![0x4E, 0x45, 0x53, 0x1A, prg_banks, chr_banks, flags6, flags7, 0, 0, 0, 0, 0, 0, 0, 0];
        if flags6 & 0b0100 != 0 {
            data.extend(vec![0xEE; TRAINER_SIZE]);
        }
        data.extend(vec![1; prg_banks as usize * PRG_PAGE_SIZE]);
        data.extend(vec![2; chr_banks as usize * CHR_PAGE_SIZE]);
        data
    }

    #[test]
    fn parses_header_fields() {
        let rom = Rom::from_ines(&ines_image(2, 1, 0x01, 0)).unwrap();

        assert_eq!(rom.prg_banks(), 2);
        assert_eq!(rom.chr_banks(), 1);
        assert_eq!(rom.mirroring, Mirroring::VERTICAL);
        assert_eq!(rom.mapper, 0);
        assert!(rom.prg_rom.iter().all(|b| *b == 1));
        assert!(rom.chr_rom.iter().all(|b| *b == 2));
    }

    #[test]
    fn skips_trainer() {
        let rom = Rom::from_ines(&ines_image(1, 1, 0b0100, 0)).unwrap();

        assert_eq!(rom.prg_rom.len(), PRG_PAGE_SIZE);
        assert_eq!(rom.prg_rom[0], 1);
        assert_eq!(rom.mirroring, Mirroring::HORIZONTAL);
    }

    #[test]
    fn mapper_id_combines_both_nibbles() {
        let rom = Rom::from_ines(&ines_image(1, 0, 0x10, 0x00)).unwrap();
        assert_eq!(rom.mapper, 1);
        assert_eq!(rom.chr_banks(), 0);

        let rom = Rom::from_ines(&ines_image(1, 0, 0x40, 0x40)).unwrap();
        assert_eq!(rom.mapper, 0x44);
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let mut data = ines_image(1, 1, 0, 0);
        data[0] = b'X';
        assert!(matches!(Rom::from_ines(&data), Err(NesError::InvalidRom(_))));

        let mut data = ines_image(2, 1, 0, 0);
        data.truncate(HEADER_SIZE + PRG_PAGE_SIZE);
        assert!(matches!(Rom::from_ines(&data), Err(NesError::InvalidRom(_))));

        assert!(Rom::from_ines(&[0x4E, 0x45]).is_err());
    }

    #[test]
    fn rejects_nes2_header() {
        let data = ines_image(1, 1, 0, 0b0000_1000);
        assert!(matches!(Rom::from_ines(&data), Err(NesError::InvalidRom(_))));
    }
}
