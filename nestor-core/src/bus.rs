use crate::cart::Cartridge;
use crate::cpu::Mem;
use crate::events::{Event, EventQueue};
use crate::joypad::Joypad;
use crate::ppu::PPU;

const RAM_START: u16 =                  0x0000;
const RAM_MIRRORS_END: u16 =            0x1FFF;

const PPU_REGISTERS: u16 =              0x2000;
const PPU_REGISTERS_MIRRORS_END: u16 =  0x3FFF;

const OAM_DMA: u16 =                    0x4014;
const JOYPAD_1: u16 =                   0x4016;
const JOYPAD_2: u16 =                   0x4017;

pub const MEMORY_SIZE: usize = 0x10000;

pub struct Bus {
    // Work RAM lives in the first 2KB; everything the bus does not route
    // elsewhere (APU ports, cartridge SRAM) reads back as plain memory
    memory: Vec<u8>,
    pub ppu: PPU,
    pub cartridge: Cartridge,
    pub joypads: [Joypad; 2],
    pub events: EventQueue,
    dma_page: u8,
    frame_ready: bool,
}

impl Mem for Bus {
    fn mem_read(&mut self, addr: u16) -> u8 {
        if let Some(value) = self.cartridge.read_prg(addr) {
            return value;
        }
        match addr {
            RAM_START..=RAM_MIRRORS_END => self.memory[(addr & 0x07FF) as usize],
            PPU_REGISTERS..=PPU_REGISTERS_MIRRORS_END => {
                self.ppu.read_register(&self.cartridge, PPU_REGISTERS | (addr & 0x0007))
            }
            JOYPAD_1 => self.joypads[0].read(),
            JOYPAD_2 => self.joypads[1].read(),
            _ => self.memory[addr as usize],
        }
    }

    fn mem_write(&mut self, addr: u16, value: u8) {
        if self.cartridge.write_prg(addr, value) {
            return;
        }
        match addr {
            RAM_START..=RAM_MIRRORS_END => self.memory[(addr & 0x07FF) as usize] = value,
            PPU_REGISTERS..=PPU_REGISTERS_MIRRORS_END => {
                self.ppu.write_register(&mut self.cartridge, &mut self.events, PPU_REGISTERS | (addr & 0x0007), value)
            }
            OAM_DMA => {
                self.dma_page = value;
                self.events.push(Event::OamDma);
            }
            // Both controllers share the strobe line
            JOYPAD_1 => self.joypads.iter_mut().for_each(|pad| pad.write(value)),
            _ => self.memory[addr as usize] = value,
        }
    }
}

impl Bus {
    pub fn new(cartridge: Cartridge) -> Self {
        Bus {
            memory: vec![0; MEMORY_SIZE],
            ppu: PPU::new(),
            cartridge,
            joypads: [Joypad::default(), Joypad::default()],
            events: EventQueue::new(),
            dma_page: 0,
            frame_ready: false,
        }
    }

    /// Reads without side effects. PPU and controller ports are not
    /// consulted, so their addresses return whatever plain memory holds.
    pub fn peek(&self, addr: u16) -> u8 {
        if let Some(value) = self.cartridge.read_prg(addr) {
            return value;
        }
        match addr {
            RAM_START..=RAM_MIRRORS_END => self.memory[(addr & 0x07FF) as usize],
            _ => self.memory[addr as usize],
        }
    }

    /// Advances the PPU three dots for every CPU cycle.
    pub fn tick(&mut self, cpu_cycles: u32) {
        for _ in 0..cpu_cycles * 3 {
            if self.ppu.step(&self.cartridge, &mut self.events) {
                self.frame_ready = true;
            }
        }
    }

    /// Returns whether a frame completed since the last call, clearing the flag.
    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    pub fn dma_page(&self) -> u8 { self.dma_page }
    pub fn memory(&self) -> &[u8] { &self.memory }

    pub fn reset(&mut self) {
        self.ppu.reset();
        self.events = EventQueue::new();
        self.frame_ready = false;
    }

    pub(crate) fn restore_memory(&mut self, memory: Vec<u8>, dma_page: u8, frame_ready: bool) {
        self.memory = memory;
        self.dma_page = dma_page;
        self.frame_ready = frame_ready;
    }

    pub(crate) fn frame_ready(&self) -> bool { self.frame_ready }
}
