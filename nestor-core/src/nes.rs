use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::bus::{Bus, MEMORY_SIZE};
use crate::cart::{Cartridge, CartridgeState};
use crate::config::NesConfig;
use crate::cpu::{reset_cpu, step_cpu, CPU};
use crate::error::NesError;
use crate::joypad::{Joypad, JoypadButtons};
use crate::ppu::{FrameBuffer, PPU};
use crate::rom::Rom;

const SNAPSHOT_MAGIC: [u8; 4] = *b"NSTS";
const SNAPSHOT_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    magic: [u8; 4],
    version: u16,
    mapper_id: u8,
    cpu: CPU,
    memory: Vec<u8>,
    dma_page: u8,
    frame_ready: bool,
    ppu: PPU,
    cartridge: CartridgeState,
    joypads: [Joypad; 2],
}

/// The whole console: a CPU driving a bus that owns everything else.
pub struct Nes {
    pub cpu: CPU,
    pub bus: Bus,
    config: NesConfig,
}

impl Nes {
    pub fn new(rom: Rom) -> Result<Nes, NesError> {
        Self::with_config(rom, NesConfig::default())
    }

    pub fn with_config(rom: Rom, config: NesConfig) -> Result<Nes, NesError> {
        let cartridge = Cartridge::new(rom)?;
        let mut nes = Nes { cpu: CPU::new(), bus: Bus::new(cartridge), config };
        nes.reset();
        Ok(nes)
    }

    pub fn from_ines(data: &[u8]) -> Result<Nes, NesError> {
        Self::new(Rom::from_ines(data)?)
    }

    pub fn reset(&mut self) {
        self.bus.reset();
        reset_cpu(&mut self.cpu, &mut self.bus, self.config.start_address);
        self.cpu.trace = self.config.trace_instructions;
        info!("Reset, starting at {:04X}", self.cpu.program_counter);
    }

    /// Runs one instruction and any events it raised. Returns CPU cycles.
    pub fn step(&mut self) -> u32 {
        step_cpu(&mut self.cpu, &mut self.bus)
    }

    /// Runs until the PPU enters vblank and returns the finished picture.
    pub fn run_frame(&mut self) -> &FrameBuffer {
        while !self.bus.take_frame_ready() {
            self.step();
        }
        &self.bus.ppu.frame_buffer
    }

    /// For hosts driving `step` themselves: true once per completed frame.
    pub fn take_frame(&mut self) -> bool {
        self.bus.take_frame_ready()
    }

    pub fn frame(&self) -> &FrameBuffer { &self.bus.ppu.frame_buffer }

    pub fn set_key(&mut self, player: usize, button: JoypadButtons, pressed: bool) {
        match self.bus.joypads.get_mut(player) {
            Some(joypad) => joypad.set_key(button, pressed),
            None => warn!("No controller {} to send {:?} to", player, button),
        }
    }

    pub fn wait_until_event_queue_empty(&mut self) {
        while !self.bus.events.is_empty() {
            self.step();
        }
    }

    pub fn save_state(&mut self) -> Result<Vec<u8>, NesError> {
        self.wait_until_event_queue_empty();

        let snapshot = Snapshot {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            mapper_id: self.bus.cartridge.mapper_id(),
            cpu: self.cpu.clone(),
            memory: self.bus.memory().to_vec(),
            dma_page: self.bus.dma_page(),
            frame_ready: self.bus.frame_ready(),
            ppu: self.bus.ppu.clone(),
            cartridge: self.bus.cartridge.state(),
            joypads: self.bus.joypads.clone(),
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    /// Restores a state written by `save_state`. On error the console is
    /// left exactly as it was.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), NesError> {
        let snapshot: Snapshot = bincode::deserialize(data)?;

        if snapshot.magic != SNAPSHOT_MAGIC {
            return Err(NesError::InvalidSaveState("not a save-state".to_string()));
        }
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(NesError::InvalidSaveState(format!("unknown version {}", snapshot.version)));
        }
        if snapshot.mapper_id != self.bus.cartridge.mapper_id() {
            return Err(NesError::InvalidSaveState(format!(
                "state is for mapper {}, cartridge uses mapper {}",
                snapshot.mapper_id,
                self.bus.cartridge.mapper_id()
            )));
        }
        if snapshot.memory.len() != MEMORY_SIZE {
            return Err(NesError::InvalidSaveState("CPU memory has the wrong size".to_string()));
        }
        snapshot.ppu.validate()?;
        self.bus.cartridge.validate_state(&snapshot.cartridge)?;

        let trace = self.cpu.trace;
        self.cpu = snapshot.cpu;
        self.cpu.trace = trace;
        self.bus.restore_memory(snapshot.memory, snapshot.dma_page, snapshot.frame_ready);
        self.bus.ppu = snapshot.ppu;
        self.bus.cartridge.restore_state(snapshot.cartridge);
        self.bus.joypads = snapshot.joypads;
        self.bus.events.clear();
        info!("Restored state at {:04X}", self.cpu.program_counter);
        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::rom::test::ines_image;

    // Two PRG banks of NOPs with the reset vector pointing at $8000,
    // followed by an endless loop
    fn nop_rom() -> Vec<u8> {
        let mut image = ines_image(2, 1, 0, 0);
        let prg = &mut image[16..16 + 0x8000];
        prg.iter_mut().for_each(|b| *b = 0xEA);
        prg[0x0100..0x0103].copy_from_slice(&[0x4C, 0x00, 0x81]);
        prg[0x7FFC] = 0x00;
        prg[0x7FFD] = 0x80;
        image
    }

    #[test]
    fn test_reset_uses_vector_or_start_address() {
        let nes = Nes::from_ines(&nop_rom()).unwrap();
        assert_eq!(nes.cpu.program_counter, 0x8000);

        let rom = Rom::from_ines(&nop_rom()).unwrap();
        let nes = Nes::with_config(rom, NesConfig::default().with_start_address(0x8100)).unwrap();
        assert_eq!(nes.cpu.program_counter, 0x8100);
    }

    #[test]
    fn test_unsupported_mapper_is_rejected() {
        let image = ines_image(1, 1, 0x40, 0);
        assert!(matches!(Nes::from_ines(&image), Err(NesError::UnsupportedMapper(4))));
    }

    #[test]
    fn test_run_frame_stops_at_vblank() {
        let mut nes = Nes::from_ines(&nop_rom()).unwrap();
        nes.run_frame();
        assert_eq!(nes.bus.ppu.scanline(), 241);
        assert!(!nes.take_frame());

        nes.run_frame();
        assert_eq!(nes.bus.ppu.frame_count(), 1);
    }

    #[test]
    fn test_set_key_reaches_controller() {
        let mut nes = Nes::from_ines(&nop_rom()).unwrap();
        nes.set_key(1, JoypadButtons::START, true);
        assert!(nes.bus.joypads[1].status.contains(JoypadButtons::START));
        // Out of range players are ignored
        nes.set_key(2, JoypadButtons::START, true);
    }

    #[test]
    fn test_load_state_rejects_garbage_without_side_effects() {
        let mut nes = Nes::from_ines(&nop_rom()).unwrap();
        nes.step();
        let pc = nes.cpu.program_counter;

        assert!(matches!(nes.load_state(&[1, 2, 3]), Err(NesError::InvalidSaveState(_))));

        let mut state = nes.save_state().unwrap();
        state[0] = b'X';
        assert!(matches!(nes.load_state(&state), Err(NesError::InvalidSaveState(_))));
        assert_eq!(nes.cpu.program_counter, pc);
    }

    #[test]
    fn test_load_state_rejects_other_mapper() {
        let mut nes = Nes::from_ines(&nop_rom()).unwrap();
        let state = nes.save_state().unwrap();

        let mut other = Nes::from_ines(&ines_image(2, 0, 0x10, 0)).unwrap();
        assert!(matches!(other.load_state(&state), Err(NesError::InvalidSaveState(_))));
    }

    #[test]
    fn test_state_round_trip() {
        let mut nes = Nes::from_ines(&nop_rom()).unwrap();
        for _ in 0..1000 {
            nes.step();
        }
        let state = nes.save_state().unwrap();
        let (pc, count, cycle) = (nes.cpu.program_counter, nes.cpu.instruction_count, nes.bus.ppu.cycle());

        for _ in 0..500 {
            nes.step();
        }
        nes.load_state(&state).unwrap();
        assert_eq!(nes.cpu.program_counter, pc);
        assert_eq!(nes.cpu.instruction_count, count);
        assert_eq!(nes.bus.ppu.cycle(), cycle);
    }
}
