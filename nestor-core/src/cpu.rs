use std::fmt;

use bitflags::bitflags;
use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::events::Event;
use crate::opcodes::{fallback_mode, Op, Opcode, OPCODE_MAP};

const STACK: u16 = 0x0100;
const STACK_RESET: u8 = 0xFD;

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

const INTERRUPT_CYCLES: u32 = 7;
const UNKNOWN_OPCODE_CYCLES: u32 = 2;
// One read and one write per byte
const DMA_CYCLES_PER_BYTE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum AddressingMode {
    Implicit,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPage_X,
    ZeroPage_Y,
    Relative,
    Absolute,
    Absolute_X,
    Absolute_Y,
    Indirect,
    Indirect_X,
    Indirect_Y,
}

impl AddressingMode {
    /// Instruction length in bytes, opcode included.
    pub fn len(&self) -> u8 {
        match self {
            AddressingMode::Implicit | AddressingMode::Accumulator => 1,
            AddressingMode::Absolute | AddressingMode::Absolute_X | AddressingMode::Absolute_Y | AddressingMode::Indirect => 3,
            _ => 2,
        }
    }
}

pub trait Mem {
    fn mem_read(&mut self, addr: u16) -> u8;
    fn mem_write(&mut self, addr: u16, value: u8);

    fn mem_read_u16(&mut self, addr: u16) -> u16 {
        // The NES packs 16-bit values in little endian
        let lo = self.mem_read(addr) as u16;
        let hi = self.mem_read(addr.wrapping_add(1)) as u16;
        (hi << 8) | (lo)
    }

    fn mem_write_u16(&mut self, addr: u16, value: u16) {
        let lo = (value & 0xff) as u8;
        let hi = (value >> 8) as u8;
        self.mem_write(addr, lo);
        self.mem_write(addr.wrapping_add(1), hi);
    }
}

bitflags! {
    // Status register is a series of flags:
    // N V - B D I Z C
    // ^ ^ ^ ^ ^ ^ ^ ^- Carry
    // | | | | | | +--- Zero
    // | | | | | +----- Interrupt (IRQ disable)
    // | | | | +------- Decimal (no effect on the NES)
    // | | | +--------- Break (only exists on the stack)
    // | | +----------- Unused, always pushed as 1
    // | +------------- Overflow
    // +--------------- Negative
    #[derive(Default, Serialize, Deserialize)]
    pub struct CpuFlags: u8 {
        const NEGATIVE  = 0b1000_0000;
        const OVERFLOW  = 0b0100_0000;
        const UNUSED    = 0b0010_0000;
        const BREAK     = 0b0001_0000;
        const DECIMAL   = 0b0000_1000;
        const INTERRUPT = 0b0000_0100;
        const ZERO      = 0b0000_0010;
        const CARRY     = 0b0000_0001;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    NMI,
    IRQ,
    BRK,
}

impl Interrupt {
    fn vector(&self) -> u16 {
        match self {
            Interrupt::NMI => NMI_VECTOR,
            Interrupt::IRQ | Interrupt::BRK => IRQ_VECTOR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CPU {
    pub register_a: u8,
    pub register_x: u8,
    pub register_y: u8,
    pub stack_pointer: u8,

    pub status: CpuFlags,
    pub program_counter: u16,

    pub instruction_count: u64,

    #[serde(skip)]
    pub trace: bool,
}

impl Default for CPU {
    fn default() -> Self {
        CPU {
            register_a: 0,
            register_x: 0,
            register_y: 0,
            stack_pointer: STACK_RESET,
            status: CpuFlags::INTERRUPT | CpuFlags::UNUSED,
            program_counter: 0,
            instruction_count: 0,
            trace: false,
        }
    }
}


/// One decoded instruction, with its effective address already resolved.
pub struct Instruction {
    pub opcode: &'static Opcode,
    /// Address of the opcode byte.
    pub pc: u16,
    /// Effective address, or the branch target for relative mode.
    pub address: u16,
    /// Raw operand bytes as they appear after the opcode.
    pub argument: u16,
    pub cycles: u8,
    pub page_crossed: bool,
    operand: Option<u8>,
}

impl Instruction {
    pub fn op(&self) -> Op { self.opcode.op }
    pub fn mode(&self) -> AddressingMode { self.opcode.mode }
    pub fn len(&self) -> u8 { self.opcode.len }

    /// The byte at the effective address, read from the bus on first use.
    pub fn operand(&mut self, bus: &mut Bus) -> u8 {
        match self.operand {
            Some(value) => value,
            None => {
                let value = bus.mem_read(self.address);
                self.operand = Some(value);
                value
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.op();
        match self.mode() {
            AddressingMode::Implicit => write!(f, "{:?}", op),
            AddressingMode::Accumulator => write!(f, "{:?} A", op),
            AddressingMode::Immediate => write!(f, "{:?} #${:02X}", op, self.argument),
            AddressingMode::ZeroPage => write!(f, "{:?} ${:02X}", op, self.argument),
            AddressingMode::ZeroPage_X => write!(f, "{:?} ${:02X},X", op, self.argument),
            AddressingMode::ZeroPage_Y => write!(f, "{:?} ${:02X},Y", op, self.argument),
            AddressingMode::Relative => write!(f, "{:?} ${:04X}", op, self.address),
            AddressingMode::Absolute => write!(f, "{:?} ${:04X}", op, self.argument),
            AddressingMode::Absolute_X => write!(f, "{:?} ${:04X},X", op, self.argument),
            AddressingMode::Absolute_Y => write!(f, "{:?} ${:04X},Y", op, self.argument),
            AddressingMode::Indirect => write!(f, "{:?} (${:04X})", op, self.argument),
            AddressingMode::Indirect_X => write!(f, "{:?} (${:02X},X)", op, self.argument),
            AddressingMode::Indirect_Y => write!(f, "{:?} (${:02X}),Y", op, self.argument),
        }
    }
}

pub enum Decoded {
    Instruction(Instruction),
    /// Undocumented opcode, stepped over as a NOP of `len` bytes.
    Unknown { code: u8, pc: u16, len: u8 },
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::Instruction(instr) => instr.fmt(f),
            Decoded::Unknown { code, .. } => write!(f, ".byte ${:02X}", code),
        }
    }
}

fn page_differs(a: u16, b: u16) -> bool { a & 0xFF00 != b & 0xFF00 }

/// Decodes the instruction at the program counter without executing it.
pub fn decode(cpu: &CPU, bus: &mut Bus) -> Decoded {
    let pc = cpu.program_counter;
    let code = bus.mem_read(pc);
    match OPCODE_MAP.get(&code) {
        Some(&opcode) => Decoded::Instruction(resolve(cpu, bus, opcode, pc)),
        None => Decoded::Unknown { code, pc, len: fallback_mode(code).len() },
    }
}

fn resolve(cpu: &CPU, bus: &mut Bus, opcode: &'static Opcode, pc: u16) -> Instruction {
    let arg_addr = pc.wrapping_add(1);
    let (address, argument, page_crossed) = match opcode.mode {
        AddressingMode::Implicit | AddressingMode::Accumulator => (0, 0, false),
        AddressingMode::Immediate => (arg_addr, bus.mem_read(arg_addr) as u16, false),
        AddressingMode::ZeroPage => {
            let base = bus.mem_read(arg_addr);
            (base as u16, base as u16, false)
        }
        AddressingMode::ZeroPage_X => {
            let base = bus.mem_read(arg_addr);
            (base.wrapping_add(cpu.register_x) as u16, base as u16, false)
        }
        AddressingMode::ZeroPage_Y => {
            let base = bus.mem_read(arg_addr);
            (base.wrapping_add(cpu.register_y) as u16, base as u16, false)
        }
        AddressingMode::Relative => {
            let offset = bus.mem_read(arg_addr);
            let next = pc.wrapping_add(2);
            let target = next.wrapping_add(offset as i8 as u16);
            (target, offset as u16, page_differs(next, target))
        }
        AddressingMode::Absolute => {
            let base = bus.mem_read_u16(arg_addr);
            (base, base, false)
        }
        AddressingMode::Absolute_X => {
            let base = bus.mem_read_u16(arg_addr);
            let addr = base.wrapping_add(cpu.register_x as u16);
            (addr, base, page_differs(base, addr))
        }
        AddressingMode::Absolute_Y => {
            let base = bus.mem_read_u16(arg_addr);
            let addr = base.wrapping_add(cpu.register_y as u16);
            (addr, base, page_differs(base, addr))
        }
        AddressingMode::Indirect => {
            let ptr = bus.mem_read_u16(arg_addr);
            // Hardware bug: the pointer's high byte never carries into the next page
            let lo = bus.mem_read(ptr) as u16;
            let hi = bus.mem_read((ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF)) as u16;
            (hi << 8 | lo, ptr, false)
        }
        AddressingMode::Indirect_X => {
            let base = bus.mem_read(arg_addr);
            let ptr = base.wrapping_add(cpu.register_x);
            let lo = bus.mem_read(ptr as u16) as u16;
            let hi = bus.mem_read(ptr.wrapping_add(1) as u16) as u16;
            (hi << 8 | lo, base as u16, false)
        }
        AddressingMode::Indirect_Y => {
            let base = bus.mem_read(arg_addr);
            let lo = bus.mem_read(base as u16) as u16;
            let hi = bus.mem_read(base.wrapping_add(1) as u16) as u16;
            let deref_addr = hi << 8 | lo;
            let addr = deref_addr.wrapping_add(cpu.register_y as u16);
            (addr, base as u16, page_differs(deref_addr, addr))
        }
    };

    let mut cycles = opcode.cycles;
    if page_crossed && opcode.op.has_page_penalty() {
        cycles += 1;
    }

    Instruction { opcode, pc, address, argument, cycles, page_crossed, operand: None }
}


impl CPU {
    pub fn new() -> Self { Self::default() }

    fn push(&mut self, bus: &mut Bus, value: u8) {
        bus.mem_write(STACK | self.stack_pointer as u16, value);
        self.stack_pointer = self.stack_pointer.wrapping_sub(1);
    }

    fn pop(&mut self, bus: &mut Bus) -> u8 {
        self.stack_pointer = self.stack_pointer.wrapping_add(1);
        bus.mem_read(STACK | self.stack_pointer as u16)
    }

    fn push_u16(&mut self, bus: &mut Bus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, (value & 0xFF) as u8);
    }

    fn pop_u16(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.pop(bus) as u16;
        let hi = self.pop(bus) as u16;
        hi << 8 | lo
    }

    // B only exists in the pushed copy; bit 5 always reads back as set
    fn restore_status(&mut self, value: u8) {
        self.status = CpuFlags::from_bits_truncate(value);
        self.status.remove(CpuFlags::BREAK);
        self.status.insert(CpuFlags::UNUSED);
    }

    fn update_zero_negative_flags(&mut self, result: u8) {
        // Update zero flag
        self.status.set(CpuFlags::ZERO, result == 0);

        // Update negative flag
        self.status.set(CpuFlags::NEGATIVE, result & 0b1000_0000 != 0);
    }

    fn set_a(&mut self, value: u8) {
        self.register_a = value;
        self.update_zero_negative_flags(value);
    }

    fn set_x(&mut self, value: u8) {
        self.register_x = value;
        self.update_zero_negative_flags(value);
    }

    fn set_y(&mut self, value: u8) {
        self.register_y = value;
        self.update_zero_negative_flags(value);
    }

    fn add_to_a(&mut self, value: u8) {
        let sum = self.register_a as u16 + value as u16 + self.status.contains(CpuFlags::CARRY) as u16;
        let result = sum as u8;
        self.status.set(CpuFlags::CARRY, sum > 0xFF);
        // Overflow when both inputs share a sign that the result does not
        self.status.set(CpuFlags::OVERFLOW, (value ^ result) & (self.register_a ^ result) & 0x80 != 0);
        self.set_a(result);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.status.set(CpuFlags::CARRY, register >= value);
        self.update_zero_negative_flags(register.wrapping_sub(value));
    }

    fn branch(&mut self, instr: &Instruction, condition: bool) -> u8 {
        if !condition {
            return 0;
        }
        self.program_counter = instr.address;
        if instr.page_crossed { 2 } else { 1 }
    }

    fn read_modify_write(&mut self, bus: &mut Bus, instr: &mut Instruction, f: impl FnOnce(&mut CPU, u8) -> u8) {
        if instr.mode() == AddressingMode::Accumulator {
            let value = self.register_a;
            let result = f(self, value);
            self.set_a(result);
        } else {
            let value = instr.operand(bus);
            let result = f(self, value);
            bus.mem_write(instr.address, result);
            self.update_zero_negative_flags(result);
        }
    }

    fn carry_in(&self) -> u8 { self.status.contains(CpuFlags::CARRY) as u8 }
}


fn execute(cpu: &mut CPU, bus: &mut Bus, instr: &mut Instruction) -> u8 {
    let mut cycles = instr.cycles;
    cpu.program_counter = instr.pc.wrapping_add(instr.len() as u16);

    match instr.op() {
        Op::ADC => {
            let value = instr.operand(bus);
            cpu.add_to_a(value);
        }
        Op::SBC => {
            // A - M - !C is A + !M + C in two's complement
            let value = instr.operand(bus);
            cpu.add_to_a(!value);
        }
        Op::AND => {
            let value = instr.operand(bus);
            cpu.set_a(cpu.register_a & value);
        }
        Op::ORA => {
            let value = instr.operand(bus);
            cpu.set_a(cpu.register_a | value);
        }
        Op::EOR => {
            let value = instr.operand(bus);
            cpu.set_a(cpu.register_a ^ value);
        }
        Op::ASL => cpu.read_modify_write(bus, instr, |cpu, v| {
            cpu.status.set(CpuFlags::CARRY, v & 0x80 != 0);
            v << 1
        }),
        Op::LSR => cpu.read_modify_write(bus, instr, |cpu, v| {
            cpu.status.set(CpuFlags::CARRY, v & 0x01 != 0);
            v >> 1
        }),
        Op::ROL => cpu.read_modify_write(bus, instr, |cpu, v| {
            let carry = cpu.carry_in();
            cpu.status.set(CpuFlags::CARRY, v & 0x80 != 0);
            (v << 1) | carry
        }),
        Op::ROR => cpu.read_modify_write(bus, instr, |cpu, v| {
            let carry = cpu.carry_in();
            cpu.status.set(CpuFlags::CARRY, v & 0x01 != 0);
            (v >> 1) | (carry << 7)
        }),
        Op::INC => cpu.read_modify_write(bus, instr, |_, v| v.wrapping_add(1)),
        Op::DEC => cpu.read_modify_write(bus, instr, |_, v| v.wrapping_sub(1)),

        Op::BCC => cycles += cpu.branch(instr, !cpu.status.contains(CpuFlags::CARRY)),
        Op::BCS => cycles += cpu.branch(instr, cpu.status.contains(CpuFlags::CARRY)),
        Op::BEQ => cycles += cpu.branch(instr, cpu.status.contains(CpuFlags::ZERO)),
        Op::BMI => cycles += cpu.branch(instr, cpu.status.contains(CpuFlags::NEGATIVE)),
        Op::BNE => cycles += cpu.branch(instr, !cpu.status.contains(CpuFlags::ZERO)),
        Op::BPL => cycles += cpu.branch(instr, !cpu.status.contains(CpuFlags::NEGATIVE)),
        Op::BVC => cycles += cpu.branch(instr, !cpu.status.contains(CpuFlags::OVERFLOW)),
        Op::BVS => cycles += cpu.branch(instr, cpu.status.contains(CpuFlags::OVERFLOW)),

        Op::BIT => {
            let value = instr.operand(bus);
            cpu.status.set(CpuFlags::ZERO, cpu.register_a & value == 0);
            cpu.status.set(CpuFlags::NEGATIVE, value & 0b1000_0000 != 0);
            cpu.status.set(CpuFlags::OVERFLOW, value & 0b0100_0000 != 0);
        }
        Op::CMP => {
            let value = instr.operand(bus);
            cpu.compare(cpu.register_a, value);
        }
        Op::CPX => {
            let value = instr.operand(bus);
            cpu.compare(cpu.register_x, value);
        }
        Op::CPY => {
            let value = instr.operand(bus);
            cpu.compare(cpu.register_y, value);
        }

        Op::BRK => {
            // The byte after BRK is padding, so the return address skips it
            interrupt(cpu, bus, Interrupt::BRK, instr.pc.wrapping_add(2));
        }
        Op::JMP => cpu.program_counter = instr.address,
        Op::JSR => {
            // Pushes the address of the last byte of the JSR itself
            cpu.push_u16(bus, instr.pc.wrapping_add(2));
            cpu.program_counter = instr.address;
        }
        Op::RTS => cpu.program_counter = cpu.pop_u16(bus).wrapping_add(1),
        Op::RTI => {
            let flags = cpu.pop(bus);
            cpu.restore_status(flags);
            cpu.program_counter = cpu.pop_u16(bus);
        }

        Op::PHA => cpu.push(bus, cpu.register_a),
        Op::PHP => {
            let flags = cpu.status | CpuFlags::BREAK | CpuFlags::UNUSED;
            cpu.push(bus, flags.bits());
        }
        Op::PLA => {
            let value = cpu.pop(bus);
            cpu.set_a(value);
        }
        Op::PLP => {
            let flags = cpu.pop(bus);
            cpu.restore_status(flags);
        }

        Op::LDA => {
            let value = instr.operand(bus);
            cpu.set_a(value);
        }
        Op::LDX => {
            let value = instr.operand(bus);
            cpu.set_x(value);
        }
        Op::LDY => {
            let value = instr.operand(bus);
            cpu.set_y(value);
        }
        Op::STA => bus.mem_write(instr.address, cpu.register_a),
        Op::STX => bus.mem_write(instr.address, cpu.register_x),
        Op::STY => bus.mem_write(instr.address, cpu.register_y),

        Op::TAX => cpu.set_x(cpu.register_a),
        Op::TAY => cpu.set_y(cpu.register_a),
        Op::TSX => cpu.set_x(cpu.stack_pointer),
        Op::TXA => cpu.set_a(cpu.register_x),
        Op::TXS => cpu.stack_pointer = cpu.register_x,
        Op::TYA => cpu.set_a(cpu.register_y),

        Op::DEX => cpu.set_x(cpu.register_x.wrapping_sub(1)),
        Op::DEY => cpu.set_y(cpu.register_y.wrapping_sub(1)),
        Op::INX => cpu.set_x(cpu.register_x.wrapping_add(1)),
        Op::INY => cpu.set_y(cpu.register_y.wrapping_add(1)),

        Op::CLC => cpu.status.remove(CpuFlags::CARRY),
        Op::CLD => cpu.status.remove(CpuFlags::DECIMAL),
        Op::CLI => cpu.status.remove(CpuFlags::INTERRUPT),
        Op::CLV => cpu.status.remove(CpuFlags::OVERFLOW),
        Op::SEC => cpu.status.insert(CpuFlags::CARRY),
        Op::SED => cpu.status.insert(CpuFlags::DECIMAL),
        Op::SEI => cpu.status.insert(CpuFlags::INTERRUPT),

        Op::NOP => {}
    }

    cycles
}


/// Puts the CPU in its power-on state and loads the program counter from
/// the reset vector, unless `start_address` overrides it.
pub fn reset_cpu(cpu: &mut CPU, bus: &mut Bus, start_address: Option<u16>) {
    cpu.register_a = 0;
    cpu.register_x = 0;
    cpu.register_y = 0;
    cpu.stack_pointer = STACK_RESET;
    cpu.status = CpuFlags::INTERRUPT | CpuFlags::UNUSED;
    cpu.program_counter = match start_address {
        Some(addr) => addr,
        None => bus.mem_read_u16(RESET_VECTOR),
    };
}

/// Pushes `return_pc` and the status register, then jumps through the
/// interrupt's vector. Returns the cycles spent, 0 if a masked IRQ was dropped.
pub fn interrupt(cpu: &mut CPU, bus: &mut Bus, kind: Interrupt, return_pc: u16) -> u32 {
    if kind == Interrupt::IRQ && cpu.status.contains(CpuFlags::INTERRUPT) {
        return 0;
    }

    cpu.push_u16(bus, return_pc);
    let mut flags = cpu.status | CpuFlags::UNUSED;
    flags.set(CpuFlags::BREAK, kind == Interrupt::BRK);
    cpu.push(bus, flags.bits());

    cpu.status.insert(CpuFlags::INTERRUPT);
    cpu.program_counter = bus.mem_read_u16(kind.vector());
    INTERRUPT_CYCLES
}

/// Raises a maskable interrupt request from outside the CPU.
pub fn irq(cpu: &mut CPU, bus: &mut Bus) -> u32 {
    let pc = cpu.program_counter;
    let cycles = interrupt(cpu, bus, Interrupt::IRQ, pc);
    bus.tick(cycles);
    cycles
}

fn oam_dma(bus: &mut Bus) -> u32 {
    let page = (bus.dma_page() as u16) << 8;
    for i in 0..=255u8 {
        let value = bus.mem_read(page | i as u16);
        bus.ppu.write_oam_dma(i, value);
        bus.tick(DMA_CYCLES_PER_BYTE);
    }
    256 * DMA_CYCLES_PER_BYTE
}

fn process_events(cpu: &mut CPU, bus: &mut Bus) -> u32 {
    let mut cycles = 0;
    // Handling one event can raise another (a DMA running into vblank)
    while let Some(event) = bus.events.pop() {
        cycles += match event {
            Event::Nmi => {
                let pc = cpu.program_counter;
                let spent = interrupt(cpu, bus, Interrupt::NMI, pc);
                bus.tick(spent);
                spent
            }
            Event::OamDma => oam_dma(bus),
        };
    }
    cycles
}

/// Executes one instruction, clocks the PPU for it, then services every
/// pending event. Returns the total CPU cycles that elapsed.
pub fn step_cpu(cpu: &mut CPU, bus: &mut Bus) -> u32 {
    let cycles = match decode(cpu, bus) {
        Decoded::Instruction(mut instr) => {
            if cpu.trace {
                trace!(
                    "{:04X}  {:<14} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X}",
                    instr.pc, instr.to_string(), cpu.register_a, cpu.register_x, cpu.register_y,
                    cpu.status.bits(), cpu.stack_pointer
                );
            }
            execute(cpu, bus, &mut instr) as u32
        }
        Decoded::Unknown { code, pc, len } => {
            warn!("Unknown opcode {:02X} at {:04X}, skipping {} byte(s)", code, pc, len);
            cpu.program_counter = pc.wrapping_add(len as u16);
            UNKNOWN_OPCODE_CYCLES
        }
    };
    cpu.instruction_count += 1;

    bus.tick(cycles);
    cycles + process_events(cpu, bus)
}
