use bitflags::bitflags;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::cart::Cartridge;
use crate::error::NesError;
use crate::events::{Event, EventQueue};
use crate::palette;
use crate::picture_bus::PictureBus;

pub const SCREEN_WIDTH: usize = 256;
pub const SCREEN_HEIGHT: usize = 240;

pub const CYCLES_PER_SCANLINE: u16 = 341;
pub const SCANLINES_PER_FRAME: u16 = 262;
const PRE_RENDER_LINE: i16 = -1;
const POST_RENDER_LINE: i16 = 240;
const VBLANK_LINE: i16 = 241;
const LAST_LINE: i16 = 260;


#[derive(Clone, Serialize, Deserialize)]
pub struct FrameBuffer {
    // All pixels are stored as 0x00RRGGBB in a single dimension
    // (x, y) -> y * 256 + x
    pub pixels: Vec<u32>,
}

impl Default for FrameBuffer {
    fn default() -> Self { FrameBuffer { pixels: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT] } }
}

impl FrameBuffer {
    pub fn new() -> Self { Self::default() }
    pub fn get(&self, x: usize, y: usize) -> u32 { self.pixels[pixel_index(x, y)] }
    pub fn set(&mut self, x: usize, y: usize, color: u32) { self.pixels[pixel_index(x, y)] = color; }
}

fn pixel_index(x: usize, y: usize) -> usize { y * SCREEN_WIDTH + x }


bitflags! {
    // PPU Control register is a series of flags:
    // V P H B S I N N
    // ^ ^ ^ ^ ^ ^ ^ ^
    // | | | | | | +-+- Base Nametable Address
    // | | | | | +----- VRAM Address Increment (when reading PPUDATA)
    // | | | | +------- Sprite pattern table addr (for 8x8 sprites)
    // | | | +--------- Background pattern table addr (0: $0000, 1: $1000)
    // | | +----------- Sprite size (0: 8x8, 1: 8x16)
    // | +------------- PPU Master/Slave select (0: read backdrop from EXT, 1: write)
    // +--------------- VBlank Interrupt enable
    #[derive(Default, Serialize, Deserialize)]
    pub struct PpuControl: u8 {
        const NMI_ENABLE       = 0b1000_0000;
        const PPU_MASTER       = 0b0100_0000;
        const SPRITE_SIZE      = 0b0010_0000;
        const BG_TBL           = 0b0001_0000;
        const SPRITE_TBL       = 0b0000_1000;
        const VRAM_ADDR_INCR   = 0b0000_0100;
        const BASE_TBL2        = 0b0000_0010;
        const BASE_TBL1        = 0b0000_0001;
    }
}

impl PpuControl {
    pub fn vram_addr_increment(&self) -> u16 { if self.contains(PpuControl::VRAM_ADDR_INCR) { 32 } else { 1 } }
    pub fn bg_pattern_addr(&self) -> u16 { if self.contains(PpuControl::BG_TBL) { 0x1000 } else { 0x0000 } }
    pub fn sprite_pattern_addr(&self) -> u16 { if self.contains(PpuControl::SPRITE_TBL) { 0x1000 } else { 0x0000 } }
    pub fn sprite_height(&self) -> i16 { if self.contains(PpuControl::SPRITE_SIZE) { 16 } else { 8 } }
    pub fn update(&mut self, data: u8) { *self = PpuControl::from_bits_truncate(data); }
}

bitflags! {
    // PPU Mask is also a series of flags:
    // B G R s b M m G
    // ^ ^ ^ ^ ^ ^ ^ ^
    // | | | | | | | +- Grayscale (0: normal, 1: grayscale)
    // | | | | | | +--- Show bg in leftmost 8 pixels of screen (0: hide)
    // | | | | | +----- Show sprites in leftmost 8 pixels (0: hide)
    // | | | | +------- Show background (0: hide)
    // | | | +--------- Show sprites (0: hide)
    // | | +----------- Emphasize red
    // | +------------- Emphasize green
    // +--------------- Emphasize blue
    #[derive(Default, Serialize, Deserialize)]
    pub struct PpuMask: u8 {
        const EMPH_BLUE = 0b1000_0000;
        const EMPH_GRN = 0b0100_0000;
        const EMPH_RED = 0b0010_0000;
        const SHOW_SPRITES = 0b0001_0000;
        const SHOW_BG = 0b0000_1000;
        const LEFT_SPRITES = 0b0000_0100;
        const LEFT_BG = 0b0000_0010;
        const GRAYSCALE = 0b0000_0001;
    }
}

impl PpuMask {
    pub fn rendering(&self) -> bool { self.intersects(PpuMask::SHOW_BG | PpuMask::SHOW_SPRITES) }
    pub fn update(&mut self, data: u8) { *self = PpuMask::from_bits_truncate(data); }
}

bitflags! {
    // PPU Status, only the top 3 bits are driven:
    // V S O - - - - -
    // ^ ^ ^
    // | | +----------- Sprite overflow
    // | +------------- Sprite 0 hit
    // +--------------- Vertical blank has started
    #[derive(Default, Serialize, Deserialize)]
    pub struct PpuStatus: u8 {
        const VBLANK          = 0b1000_0000;
        const SPRITE_ZERO_HIT = 0b0100_0000;
        const SPRITE_OVERFLOW = 0b0010_0000;
    }
}


// The v and t registers share the same layout:
// yyy NN YYYYY XXXXX
// ||| || ||||| +++++-- coarse X scroll
// ||| || +++++-------- coarse Y scroll
// ||| ++-------------- nametable select
// +++----------------- fine Y scroll
const COARSE_X: u16 = 0b000_00_00000_11111;
const COARSE_Y: u16 = 0b000_00_11111_00000;
const NAMETABLE_X: u16 = 0b000_01_00000_00000;
const NAMETABLE_Y: u16 = 0b000_10_00000_00000;
const FINE_Y: u16 = 0b111_00_00000_00000;

#[derive(Clone, Serialize, Deserialize)]
pub struct PPU {
    pub vram: PictureBus,
    pub oam: Vec<u8>,
    secondary_oam: [u8; 32],

    control: PpuControl,
    mask: PpuMask,
    status: PpuStatus,
    oam_addr: u8,

    // Scroll registers
    v: u16,
    t: u16,
    fine_x: u8,
    w: bool,
    data_buffer: u8,

    // Background fetch latches and shifters
    next_tile_id: u8,
    next_tile_attr: u8,
    next_tile_lo: u8,
    next_tile_hi: u8,
    bg_shift_lo: u16,
    bg_shift_hi: u16,
    attr_shift_lo: u8,
    attr_shift_hi: u8,
    attr_latch_lo: bool,
    attr_latch_hi: bool,

    // Sprite evaluation progress, advanced one cycle at a time
    eval_n: u8,
    eval_m: u8,
    eval_slot: u8,
    eval_data: u8,
    eval_done: bool,
    eval_zero_found: bool,
    // PPUCTRL sprite size, latched when evaluation starts
    eval_height: i16,

    // Sprites for the line being drawn
    line_sprites: u8,
    sprite_zero_on_line: bool,
    sprite_lo: [u8; 8],
    sprite_hi: [u8; 8],
    sprite_attr: [u8; 8],
    sprite_x: [u8; 8],

    scanline: i16,
    cycle: u16,
    frame: u64,

    pub frame_buffer: FrameBuffer,
}

impl Default for PPU {
    fn default() -> Self {
        PPU {
            vram: PictureBus::new(),
            oam: vec![0; 256],
            secondary_oam: [0xFF; 32],

            control: PpuControl::default(),
            mask: PpuMask::default(),
            status: PpuStatus::default(),
            oam_addr: 0,

            v: 0,
            t: 0,
            fine_x: 0,
            w: false,
            data_buffer: 0,

            next_tile_id: 0,
            next_tile_attr: 0,
            next_tile_lo: 0,
            next_tile_hi: 0,
            bg_shift_lo: 0,
            bg_shift_hi: 0,
            attr_shift_lo: 0,
            attr_shift_hi: 0,
            attr_latch_lo: false,
            attr_latch_hi: false,

            eval_n: 0,
            eval_m: 0,
            eval_slot: 0,
            eval_data: 0,
            eval_done: false,
            eval_zero_found: false,
            eval_height: 8,

            line_sprites: 0,
            sprite_zero_on_line: false,
            sprite_lo: [0; 8],
            sprite_hi: [0; 8],
            sprite_attr: [0; 8],
            sprite_x: [0xFF; 8],

            scanline: PRE_RENDER_LINE,
            cycle: 0,
            frame: 0,

            frame_buffer: FrameBuffer::new(),
        }
    }
}


impl PPU {
    pub fn new() -> Self { Self::default() }

    /// Clears the registers games program, and rewinds to the start of a frame.
    /// VRAM and OAM are left as they are.
    pub fn reset(&mut self) {
        self.control = PpuControl::default();
        self.mask = PpuMask::default();
        self.status = PpuStatus::default();
        self.t = 0;
        self.fine_x = 0;
        self.w = false;
        self.data_buffer = 0;
        self.line_sprites = 0;
        self.scanline = PRE_RENDER_LINE;
        self.cycle = 0;
    }

    pub fn scanline(&self) -> i16 { self.scanline }
    pub fn cycle(&self) -> u16 { self.cycle }
    pub fn frame_count(&self) -> u64 { self.frame }
    pub fn status(&self) -> PpuStatus { self.status }
    pub fn oam_addr(&self) -> u8 { self.oam_addr }
    pub fn secondary_oam(&self) -> &[u8] { &self.secondary_oam }
    pub fn vram_addr(&self) -> u16 { self.v }

    /// Rejects a deserialized PPU whose memories have the wrong size.
    pub fn validate(&self) -> Result<(), NesError> {
        if self.oam.len() != 256 || self.vram.len() != 0x4000 {
            return Err(NesError::InvalidSaveState("PPU memory has the wrong size".to_string()));
        }
        if self.frame_buffer.pixels.len() != SCREEN_WIDTH * SCREEN_HEIGHT {
            return Err(NesError::InvalidSaveState("frame buffer has the wrong size".to_string()));
        }
        Ok(())
    }

    fn rendering_enabled(&self) -> bool { self.mask.rendering() }

    //// Register ports ($2000-$2007) ////

    pub fn read_register(&mut self, cart: &Cartridge, addr: u16) -> u8 {
        match addr {
            0x2002 => self.read_status(),
            0x2004 => self.oam[self.oam_addr as usize],
            0x2007 => self.read_data(cart),
            _ => {
                debug!("Read of write-only PPU register {:04X}", addr);
                0
            }
        }
    }

    pub fn write_register(&mut self, cart: &mut Cartridge, events: &mut EventQueue, addr: u16, value: u8) {
        match addr {
            0x2000 => {
                let nmi_was_enabled = self.control.contains(PpuControl::NMI_ENABLE);
                self.control.update(value);
                self.t = (self.t & !(NAMETABLE_X | NAMETABLE_Y)) | ((value as u16 & 0b11) << 10);
                // Turning NMIs on in the middle of vblank fires one straight away
                if !nmi_was_enabled && self.control.contains(PpuControl::NMI_ENABLE) && self.status.contains(PpuStatus::VBLANK) {
                    events.push(Event::Nmi);
                }
            }
            0x2001 => self.mask.update(value),
            0x2003 => self.oam_addr = value,
            0x2004 => {
                self.oam[self.oam_addr as usize] = value;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            }
            0x2005 => {
                if !self.w {
                    self.t = (self.t & !COARSE_X) | (value as u16 >> 3);
                    self.fine_x = value & 0b111;
                } else {
                    self.t = (self.t & !(COARSE_Y | FINE_Y)) | ((value as u16 & 0xF8) << 2) | ((value as u16 & 0b111) << 12);
                }
                self.w = !self.w;
            }
            0x2006 => {
                if !self.w {
                    self.t = (self.t & 0x00FF) | ((value as u16 & 0x3F) << 8);
                } else {
                    self.t = (self.t & 0xFF00) | value as u16;
                    self.v = self.t;
                }
                self.w = !self.w;
            }
            0x2007 => {
                self.vram.write(cart, self.v & 0x3FFF, value);
                self.increment_vram_addr();
            }
            _ => debug!("Write of {:02X} to read-only PPU register {:04X}", value, addr),
        }
    }

    pub fn read_status(&mut self) -> u8 {
        // The low bits are whatever was last on the PPU's data bus
        let res = self.status.bits() | (self.data_buffer & 0b0001_1111);

        // Reading this register clears the VBLANK flag and resets the write latch
        self.status.remove(PpuStatus::VBLANK);
        self.w = false;

        res
    }

    fn read_data(&mut self, cart: &Cartridge) -> u8 {
        let addr = self.v & 0x3FFF;
        let res = if addr < 0x3F00 {
            // Reads lag one behind, going through an internal buffer
            let buffered = self.data_buffer;
            self.data_buffer = self.vram.read(cart, addr);
            buffered
        } else {
            // Palette reads are immediate, but the buffer still picks up
            // the nametable byte underneath
            self.data_buffer = self.vram.read(cart, addr - 0x1000);
            self.vram.read(cart, addr)
        };
        self.increment_vram_addr();
        res
    }

    fn increment_vram_addr(&mut self) {
        self.v = self.v.wrapping_add(self.control.vram_addr_increment()) & 0x7FFF;
    }

    /// One byte of an OAM DMA transfer, `offset` bytes past OAMADDR.
    pub fn write_oam_dma(&mut self, offset: u8, value: u8) {
        self.oam[self.oam_addr.wrapping_add(offset) as usize] = value;
    }

    //// Dot clock ////

    /// Advances one PPU cycle. Returns true on the cycle the frame is
    /// complete, at the start of vblank.
    pub fn step(&mut self, cart: &Cartridge, events: &mut EventQueue) -> bool {
        let mut frame_complete = false;
        let rendering = self.rendering_enabled();

        if self.scanline < POST_RENDER_LINE {
            if self.scanline == PRE_RENDER_LINE && self.cycle == 1 {
                self.status.remove(PpuStatus::VBLANK | PpuStatus::SPRITE_ZERO_HIT | PpuStatus::SPRITE_OVERFLOW);
            }
            if rendering {
                self.background_cycle(cart);
                self.sprite_cycle(cart);
            }
            if self.scanline >= 0 && (1..=256).contains(&self.cycle) {
                self.render_pixel(cart);
            }
        } else if self.scanline == VBLANK_LINE && self.cycle == 1 {
            self.status.insert(PpuStatus::VBLANK);
            if self.control.contains(PpuControl::NMI_ENABLE) {
                events.push(Event::Nmi);
            }
            frame_complete = true;
        }

        self.advance(rendering);
        frame_complete
    }

    fn advance(&mut self, rendering: bool) {
        self.cycle += 1;
        // Odd frames drop the last cycle of the pre-render line while rendering
        if self.scanline == PRE_RENDER_LINE && self.cycle == CYCLES_PER_SCANLINE - 1 && rendering && self.frame % 2 == 1 {
            self.cycle = CYCLES_PER_SCANLINE;
        }
        if self.cycle >= CYCLES_PER_SCANLINE {
            self.cycle = 0;
            self.scanline += 1;
            if self.scanline > LAST_LINE {
                self.scanline = PRE_RENDER_LINE;
                self.frame += 1;
            }
        }
    }

    //// Background ////

    fn background_cycle(&mut self, cart: &Cartridge) {
        let cycle = self.cycle;
        if (2..=257).contains(&cycle) || (321..=337).contains(&cycle) {
            self.shift_background();

            // Each tile takes 8 cycles: nametable, attribute, low plane, high plane
            match (cycle - 1) % 8 {
                0 => {
                    self.load_background_shifters();
                    self.next_tile_id = self.vram.read(cart, 0x2000 | (self.v & 0x0FFF));
                }
                2 => {
                    let addr = 0x23C0 | (self.v & 0x0C00) | ((self.v >> 4) & 0x38) | ((self.v >> 2) & 0x07);
                    let mut attr = self.vram.read(cart, addr);
                    // Each attribute byte covers a 4x4 tile area, 2 bits per 2x2 quadrant
                    if self.v & 0b10_00000 != 0 { attr >>= 4; }
                    if self.v & 0b10 != 0 { attr >>= 2; }
                    self.next_tile_attr = attr & 0b11;
                }
                4 => self.next_tile_lo = self.vram.read(cart, self.tile_row_addr()),
                6 => self.next_tile_hi = self.vram.read(cart, self.tile_row_addr() + 8),
                7 => self.increment_x(),
                _ => {}
            }
        }

        if cycle == 256 {
            self.increment_y();
        }
        if cycle == 257 {
            self.copy_horizontal();
        }
        if self.scanline == PRE_RENDER_LINE && (280..=304).contains(&cycle) {
            self.copy_vertical();
        }
    }

    fn tile_row_addr(&self) -> u16 {
        let fine_y = (self.v & FINE_Y) >> 12;
        self.control.bg_pattern_addr() + ((self.next_tile_id as u16) << 4) + fine_y
    }

    fn load_background_shifters(&mut self) {
        self.bg_shift_lo = (self.bg_shift_lo & 0xFF00) | self.next_tile_lo as u16;
        self.bg_shift_hi = (self.bg_shift_hi & 0xFF00) | self.next_tile_hi as u16;
        self.attr_latch_lo = self.next_tile_attr & 0b01 != 0;
        self.attr_latch_hi = self.next_tile_attr & 0b10 != 0;
    }

    fn shift_background(&mut self) {
        self.bg_shift_lo <<= 1;
        self.bg_shift_hi <<= 1;
        self.attr_shift_lo = (self.attr_shift_lo << 1) | self.attr_latch_lo as u8;
        self.attr_shift_hi = (self.attr_shift_hi << 1) | self.attr_latch_hi as u8;
    }

    fn increment_x(&mut self) {
        if self.v & COARSE_X == 31 {
            // Wrap into the horizontally adjacent nametable
            self.v &= !COARSE_X;
            self.v ^= NAMETABLE_X;
        } else {
            self.v += 1;
        }
    }

    fn increment_y(&mut self) {
        if self.v & FINE_Y != FINE_Y {
            self.v += 0x1000;
            return;
        }
        self.v &= !FINE_Y;
        let mut coarse_y = (self.v & COARSE_Y) >> 5;
        if coarse_y == 29 {
            // Row 29 is the last row of tiles, the attribute table follows
            coarse_y = 0;
            self.v ^= NAMETABLE_Y;
        } else if coarse_y == 31 {
            coarse_y = 0;
        } else {
            coarse_y += 1;
        }
        self.v = (self.v & !COARSE_Y) | (coarse_y << 5);
    }

    fn copy_horizontal(&mut self) {
        let bits = COARSE_X | NAMETABLE_X;
        self.v = (self.v & !bits) | (self.t & bits);
    }

    fn copy_vertical(&mut self) {
        let bits = FINE_Y | NAMETABLE_Y | COARSE_Y;
        self.v = (self.v & !bits) | (self.t & bits);
    }

    //// Sprites ////

    fn sprite_cycle(&mut self, cart: &Cartridge) {
        let cycle = self.cycle;
        if self.scanline >= 0 {
            match cycle {
                // Secondary OAM is cleared one byte every other cycle
                1..=64 => {
                    if cycle % 2 == 0 {
                        self.secondary_oam[(cycle / 2 - 1) as usize] = 0xFF;
                    }
                }
                65..=256 => self.evaluate_sprites(),
                _ => {}
            }
        }

        if (2..=257).contains(&cycle) {
            self.shift_sprites();
        }

        if (257..=320).contains(&cycle) {
            self.oam_addr = 0;
            if cycle == 257 {
                let visible = self.scanline >= 0;
                self.line_sprites = if visible { self.eval_slot } else { 0 };
                self.sprite_zero_on_line = visible && self.eval_zero_found;
            }
            if (cycle - 257) % 8 == 0 {
                self.fetch_sprite(cart, ((cycle - 257) / 8) as usize);
            }
        }
    }

    fn evaluate_sprites(&mut self) {
        if self.cycle == 65 {
            self.eval_n = 0;
            self.eval_m = 0;
            self.eval_slot = 0;
            self.eval_done = false;
            self.eval_zero_found = false;
            self.eval_height = self.control.sprite_height();
        }
        if self.eval_done {
            return;
        }

        // Odd cycles read from primary OAM, even cycles write to secondary OAM
        if self.cycle % 2 == 1 {
            self.eval_data = self.oam[(self.eval_n as usize) * 4 + self.eval_m as usize];
            return;
        }

        let slot = self.eval_slot as usize;
        if self.eval_m == 0 {
            let row = self.scanline - self.eval_data as i16;
            if row >= 0 && row < self.eval_height {
                if slot == 8 {
                    self.status.insert(PpuStatus::SPRITE_OVERFLOW);
                    self.eval_done = true;
                    return;
                }
                self.secondary_oam[slot * 4] = self.eval_data;
                if self.eval_n == 0 {
                    self.eval_zero_found = true;
                }
                self.eval_m = 1;
            } else {
                self.next_sprite();
            }
        } else {
            self.secondary_oam[slot * 4 + self.eval_m as usize] = self.eval_data;
            self.eval_m += 1;
            if self.eval_m == 4 {
                self.eval_m = 0;
                self.eval_slot += 1;
                self.next_sprite();
            }
        }
    }

    fn next_sprite(&mut self) {
        self.eval_n += 1;
        if self.eval_n == 64 {
            self.eval_done = true;
        }
    }

    fn fetch_sprite(&mut self, cart: &Cartridge, slot: usize) {
        let y = self.secondary_oam[slot * 4];
        let height = self.eval_height;
        let row = self.scanline - y as i16;
        if slot >= self.line_sprites as usize || row < 0 || row >= height {
            // Empty slots are fetched as transparent
            self.sprite_lo[slot] = 0;
            self.sprite_hi[slot] = 0;
            self.sprite_attr[slot] = 0;
            self.sprite_x[slot] = 0xFF;
            return;
        }

        let tile = self.secondary_oam[slot * 4 + 1];
        let attributes = self.secondary_oam[slot * 4 + 2];
        let x = self.secondary_oam[slot * 4 + 3];

        let mut row = row as u16;
        // Flip the sprite vertically if bit 7 of the attributes is set.
        // A row of 7 becomes 0 (15 for tall sprites), and vice versa.
        if attributes & 0b1000_0000 != 0 {
            row = (height as u16 - 1) - row;
        }

        let addr = if height == 16 {
            // The table of a tall sprite comes from bit 0 of its tile number,
            // and the bottom half is the next tile along
            let table_base = if tile & 0b1 != 0 { 0x1000 } else { 0x0000 };
            let tile_idx = (tile & 0b1111_1110) as u16 + if row >= 8 { 1 } else { 0 };
            table_base + (tile_idx << 4) + (row % 8)
        } else {
            self.control.sprite_pattern_addr() + ((tile as u16) << 4) + row
        };

        // Low and high sprite bytes differ by only bit 3
        let mut lo = self.vram.read(cart, addr);
        let mut hi = self.vram.read(cart, addr + 8);
        if attributes & 0b0100_0000 != 0 {
            lo = lo.reverse_bits();
            hi = hi.reverse_bits();
        }

        self.sprite_lo[slot] = lo;
        self.sprite_hi[slot] = hi;
        self.sprite_attr[slot] = attributes;
        self.sprite_x[slot] = x;
    }

    fn shift_sprites(&mut self) {
        for i in 0..self.line_sprites as usize {
            if self.sprite_x[i] > 0 {
                self.sprite_x[i] -= 1;
            } else {
                self.sprite_lo[i] <<= 1;
                self.sprite_hi[i] <<= 1;
            }
        }
    }

    //// Output ////

    fn render_pixel(&mut self, cart: &Cartridge) {
        let x = (self.cycle - 1) as usize;
        let y = self.scanline as usize;

        let mut bg_pixel = 0;
        let mut bg_palette = 0;
        if self.mask.contains(PpuMask::SHOW_BG) && (x >= 8 || self.mask.contains(PpuMask::LEFT_BG)) {
            let bit = 0x8000u16 >> self.fine_x;
            bg_pixel = ((self.bg_shift_hi & bit != 0) as u8) << 1 | (self.bg_shift_lo & bit != 0) as u8;
            let bit = 0x80u8 >> self.fine_x;
            bg_palette = ((self.attr_shift_hi & bit != 0) as u8) << 1 | (self.attr_shift_lo & bit != 0) as u8;
        }

        let mut fg_pixel = 0;
        let mut fg_palette = 0;
        let mut fg_in_front = false;
        let mut fg_is_zero = false;
        if self.mask.contains(PpuMask::SHOW_SPRITES) && (x >= 8 || self.mask.contains(PpuMask::LEFT_SPRITES)) {
            // The lowest slot with an opaque pixel wins
            for i in 0..self.line_sprites as usize {
                if self.sprite_x[i] != 0 {
                    continue;
                }
                let pixel = (self.sprite_hi[i] >> 7) << 1 | (self.sprite_lo[i] >> 7);
                if pixel != 0 {
                    fg_pixel = pixel;
                    fg_palette = (self.sprite_attr[i] & 0b11) + 4;
                    fg_in_front = self.sprite_attr[i] & 0b0010_0000 == 0;
                    fg_is_zero = i == 0 && self.sprite_zero_on_line;
                    break;
                }
            }
        }

        let (pixel, palette) = match (bg_pixel, fg_pixel) {
            (0, 0) => (0, 0),
            (0, _) => (fg_pixel, fg_palette),
            (_, 0) => (bg_pixel, bg_palette),
            _ => {
                if fg_is_zero && x != 255 {
                    self.status.insert(PpuStatus::SPRITE_ZERO_HIT);
                }
                if fg_in_front { (fg_pixel, fg_palette) } else { (bg_pixel, bg_palette) }
            }
        };

        let addr = if pixel != 0 {
            0x3F00 + ((palette as u16) << 2) + pixel as u16
        } else if !self.rendering_enabled() && self.v & 0x3FFF >= 0x3F00 {
            // With rendering off, a v pointing into palette RAM picks the backdrop
            self.v & 0x3FFF
        } else {
            0x3F00
        };
        let mut color = self.vram.read(cart, addr);
        if self.mask.contains(PpuMask::GRAYSCALE) {
            color &= 0x30;
        }
        self.frame_buffer.set(x, y, palette::rgb(color));
    }
}
