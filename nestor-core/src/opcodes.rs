use std::collections::HashMap;

use crate::cpu::AddressingMode;
use lazy_static::lazy_static;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    ADC, AND, ASL, BCC, BCS, BEQ, BIT, BMI, BNE, BPL, BRK, BVC, BVS, CLC,
    CLD, CLI, CLV, CMP, CPX, CPY, DEC, DEX, DEY, EOR, INC, INX, INY, JMP,
    JSR, LDA, LDX, LDY, LSR, NOP, ORA, PHA, PHP, PLA, PLP, ROL, ROR, RTI,
    RTS, SBC, SEC, SED, SEI, STA, STX, STY, TAX, TAY, TSX, TXA, TXS, TYA,
}

impl Op {
    // Only instructions that just read their operand pay for an indexed
    // page cross. Stores and read-modify-write ops always take the long path.
    pub fn has_page_penalty(&self) -> bool {
        matches!(self, Op::ADC | Op::AND | Op::CMP | Op::EOR | Op::LDA | Op::LDX | Op::LDY | Op::ORA | Op::SBC)
    }
}

#[derive(Debug)]
pub struct Opcode {
    pub op: Op,
    pub code: u8,
    pub len: u8,
    pub cycles: u8,
    pub mode: AddressingMode,
}

impl Opcode {
    fn new(op: Op, code: u8, len: u8, cycles: u8, mode: AddressingMode) -> Self {
        Opcode { op, code, len, cycles, mode }
    }
}


lazy_static! {
    pub static ref OPCODES: Vec<Opcode> = vec![
        Opcode::new(Op::ADC, 0x69, 2, 2, AddressingMode::Immediate),
        Opcode::new(Op::ADC, 0x65, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::ADC, 0x75, 2, 4, AddressingMode::ZeroPage_X),
        Opcode::new(Op::ADC, 0x6D, 3, 4, AddressingMode::Absolute),
        Opcode::new(Op::ADC, 0x7D, 3, 4, AddressingMode::Absolute_X),
        Opcode::new(Op::ADC, 0x79, 3, 4, AddressingMode::Absolute_Y),
        Opcode::new(Op::ADC, 0x61, 2, 6, AddressingMode::Indirect_X),
        Opcode::new(Op::ADC, 0x71, 2, 5, AddressingMode::Indirect_Y),

        Opcode::new(Op::AND, 0x29, 2, 2, AddressingMode::Immediate),
        Opcode::new(Op::AND, 0x25, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::AND, 0x35, 2, 4, AddressingMode::ZeroPage_X),
        Opcode::new(Op::AND, 0x2D, 3, 4, AddressingMode::Absolute),
        Opcode::new(Op::AND, 0x3D, 3, 4, AddressingMode::Absolute_X),
        Opcode::new(Op::AND, 0x39, 3, 4, AddressingMode::Absolute_Y),
        Opcode::new(Op::AND, 0x21, 2, 6, AddressingMode::Indirect_X),
        Opcode::new(Op::AND, 0x31, 2, 5, AddressingMode::Indirect_Y),

        Opcode::new(Op::ASL, 0x0A, 1, 2, AddressingMode::Accumulator),
        Opcode::new(Op::ASL, 0x06, 2, 5, AddressingMode::ZeroPage),
        Opcode::new(Op::ASL, 0x16, 2, 6, AddressingMode::ZeroPage_X),
        Opcode::new(Op::ASL, 0x0E, 3, 6, AddressingMode::Absolute),
        Opcode::new(Op::ASL, 0x1E, 3, 7, AddressingMode::Absolute_X),

        Opcode::new(Op::BCC, 0x90, 2, 2, AddressingMode::Relative),

        Opcode::new(Op::BCS, 0xB0, 2, 2, AddressingMode::Relative),

        Opcode::new(Op::BEQ, 0xF0, 2, 2, AddressingMode::Relative),

        Opcode::new(Op::BIT, 0x24, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::BIT, 0x2C, 3, 4, AddressingMode::Absolute),

        Opcode::new(Op::BMI, 0x30, 2, 2, AddressingMode::Relative),

        Opcode::new(Op::BNE, 0xD0, 2, 2, AddressingMode::Relative),

        Opcode::new(Op::BPL, 0x10, 2, 2, AddressingMode::Relative),

        Opcode::new(Op::BRK, 0x00, 1, 7, AddressingMode::Implicit),

        Opcode::new(Op::BVC, 0x50, 2, 2, AddressingMode::Relative),

        Opcode::new(Op::BVS, 0x70, 2, 2, AddressingMode::Relative),

        Opcode::new(Op::CLC, 0x18, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::CLD, 0xD8, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::CLI, 0x58, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::CLV, 0xB8, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::CMP, 0xC9, 2, 2, AddressingMode::Immediate),
        Opcode::new(Op::CMP, 0xC5, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::CMP, 0xD5, 2, 4, AddressingMode::ZeroPage_X),
        Opcode::new(Op::CMP, 0xCD, 3, 4, AddressingMode::Absolute),
        Opcode::new(Op::CMP, 0xDD, 3, 4, AddressingMode::Absolute_X),
        Opcode::new(Op::CMP, 0xD9, 3, 4, AddressingMode::Absolute_Y),
        Opcode::new(Op::CMP, 0xC1, 2, 6, AddressingMode::Indirect_X),
        Opcode::new(Op::CMP, 0xD1, 2, 5, AddressingMode::Indirect_Y),

        Opcode::new(Op::CPX, 0xE0, 2, 2, AddressingMode::Immediate),
        Opcode::new(Op::CPX, 0xE4, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::CPX, 0xEC, 3, 4, AddressingMode::Absolute),

        Opcode::new(Op::CPY, 0xC0, 2, 2, AddressingMode::Immediate),
        Opcode::new(Op::CPY, 0xC4, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::CPY, 0xCC, 3, 4, AddressingMode::Absolute),

        Opcode::new(Op::DEC, 0xC6, 2, 5, AddressingMode::ZeroPage),
        Opcode::new(Op::DEC, 0xD6, 2, 6, AddressingMode::ZeroPage_X),
        Opcode::new(Op::DEC, 0xCE, 3, 6, AddressingMode::Absolute),
        Opcode::new(Op::DEC, 0xDE, 3, 7, AddressingMode::Absolute_X),

        Opcode::new(Op::DEX, 0xCA, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::DEY, 0x88, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::EOR, 0x49, 2, 2, AddressingMode::Immediate),
        Opcode::new(Op::EOR, 0x45, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::EOR, 0x55, 2, 4, AddressingMode::ZeroPage_X),
        Opcode::new(Op::EOR, 0x4D, 3, 4, AddressingMode::Absolute),
        Opcode::new(Op::EOR, 0x5D, 3, 4, AddressingMode::Absolute_X),
        Opcode::new(Op::EOR, 0x59, 3, 4, AddressingMode::Absolute_Y),
        Opcode::new(Op::EOR, 0x41, 2, 6, AddressingMode::Indirect_X),
        Opcode::new(Op::EOR, 0x51, 2, 5, AddressingMode::Indirect_Y),

        Opcode::new(Op::INC, 0xE6, 2, 5, AddressingMode::ZeroPage),
        Opcode::new(Op::INC, 0xF6, 2, 6, AddressingMode::ZeroPage_X),
        Opcode::new(Op::INC, 0xEE, 3, 6, AddressingMode::Absolute),
        Opcode::new(Op::INC, 0xFE, 3, 7, AddressingMode::Absolute_X),

        Opcode::new(Op::INX, 0xE8, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::INY, 0xC8, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::JMP, 0x4C, 3, 3, AddressingMode::Absolute),
        Opcode::new(Op::JMP, 0x6C, 3, 5, AddressingMode::Indirect),

        Opcode::new(Op::JSR, 0x20, 3, 6, AddressingMode::Absolute),

        Opcode::new(Op::LDA, 0xA9, 2, 2, AddressingMode::Immediate),
        Opcode::new(Op::LDA, 0xA5, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::LDA, 0xB5, 2, 4, AddressingMode::ZeroPage_X),
        Opcode::new(Op::LDA, 0xAD, 3, 4, AddressingMode::Absolute),
        Opcode::new(Op::LDA, 0xBD, 3, 4, AddressingMode::Absolute_X),
        Opcode::new(Op::LDA, 0xB9, 3, 4, AddressingMode::Absolute_Y),
        Opcode::new(Op::LDA, 0xA1, 2, 6, AddressingMode::Indirect_X),
        Opcode::new(Op::LDA, 0xB1, 2, 5, AddressingMode::Indirect_Y),

        Opcode::new(Op::LDX, 0xA2, 2, 2, AddressingMode::Immediate),
        Opcode::new(Op::LDX, 0xA6, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::LDX, 0xB6, 2, 4, AddressingMode::ZeroPage_Y),
        Opcode::new(Op::LDX, 0xAE, 3, 4, AddressingMode::Absolute),
        Opcode::new(Op::LDX, 0xBE, 3, 4, AddressingMode::Absolute_Y),

        Opcode::new(Op::LDY, 0xA0, 2, 2, AddressingMode::Immediate),
        Opcode::new(Op::LDY, 0xA4, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::LDY, 0xB4, 2, 4, AddressingMode::ZeroPage_X),
        Opcode::new(Op::LDY, 0xAC, 3, 4, AddressingMode::Absolute),
        Opcode::new(Op::LDY, 0xBC, 3, 4, AddressingMode::Absolute_X),

        Opcode::new(Op::LSR, 0x4A, 1, 2, AddressingMode::Accumulator),
        Opcode::new(Op::LSR, 0x46, 2, 5, AddressingMode::ZeroPage),
        Opcode::new(Op::LSR, 0x56, 2, 6, AddressingMode::ZeroPage_X),
        Opcode::new(Op::LSR, 0x4E, 3, 6, AddressingMode::Absolute),
        Opcode::new(Op::LSR, 0x5E, 3, 7, AddressingMode::Absolute_X),

        Opcode::new(Op::NOP, 0xEA, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::ORA, 0x09, 2, 2, AddressingMode::Immediate),
        Opcode::new(Op::ORA, 0x05, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::ORA, 0x15, 2, 4, AddressingMode::ZeroPage_X),
        Opcode::new(Op::ORA, 0x0D, 3, 4, AddressingMode::Absolute),
        Opcode::new(Op::ORA, 0x1D, 3, 4, AddressingMode::Absolute_X),
        Opcode::new(Op::ORA, 0x19, 3, 4, AddressingMode::Absolute_Y),
        Opcode::new(Op::ORA, 0x01, 2, 6, AddressingMode::Indirect_X),
        Opcode::new(Op::ORA, 0x11, 2, 5, AddressingMode::Indirect_Y),

        Opcode::new(Op::PHA, 0x48, 1, 3, AddressingMode::Implicit),

        Opcode::new(Op::PHP, 0x08, 1, 3, AddressingMode::Implicit),

        Opcode::new(Op::PLA, 0x68, 1, 4, AddressingMode::Implicit),

        Opcode::new(Op::PLP, 0x28, 1, 4, AddressingMode::Implicit),

        Opcode::new(Op::ROL, 0x2A, 1, 2, AddressingMode::Accumulator),
        Opcode::new(Op::ROL, 0x26, 2, 5, AddressingMode::ZeroPage),
        Opcode::new(Op::ROL, 0x36, 2, 6, AddressingMode::ZeroPage_X),
        Opcode::new(Op::ROL, 0x2E, 3, 6, AddressingMode::Absolute),
        Opcode::new(Op::ROL, 0x3E, 3, 7, AddressingMode::Absolute_X),

        Opcode::new(Op::ROR, 0x6A, 1, 2, AddressingMode::Accumulator),
        Opcode::new(Op::ROR, 0x66, 2, 5, AddressingMode::ZeroPage),
        Opcode::new(Op::ROR, 0x76, 2, 6, AddressingMode::ZeroPage_X),
        Opcode::new(Op::ROR, 0x6E, 3, 6, AddressingMode::Absolute),
        Opcode::new(Op::ROR, 0x7E, 3, 7, AddressingMode::Absolute_X),

        Opcode::new(Op::RTI, 0x40, 1, 6, AddressingMode::Implicit),

        Opcode::new(Op::RTS, 0x60, 1, 6, AddressingMode::Implicit),

        Opcode::new(Op::SBC, 0xE9, 2, 2, AddressingMode::Immediate),
        Opcode::new(Op::SBC, 0xE5, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::SBC, 0xF5, 2, 4, AddressingMode::ZeroPage_X),
        Opcode::new(Op::SBC, 0xED, 3, 4, AddressingMode::Absolute),
        Opcode::new(Op::SBC, 0xFD, 3, 4, AddressingMode::Absolute_X),
        Opcode::new(Op::SBC, 0xF9, 3, 4, AddressingMode::Absolute_Y),
        Opcode::new(Op::SBC, 0xE1, 2, 6, AddressingMode::Indirect_X),
        Opcode::new(Op::SBC, 0xF1, 2, 5, AddressingMode::Indirect_Y),

        Opcode::new(Op::SEC, 0x38, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::SED, 0xF8, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::SEI, 0x78, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::STA, 0x85, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::STA, 0x95, 2, 4, AddressingMode::ZeroPage_X),
        Opcode::new(Op::STA, 0x8D, 3, 4, AddressingMode::Absolute),
        Opcode::new(Op::STA, 0x9D, 3, 5, AddressingMode::Absolute_X),
        Opcode::new(Op::STA, 0x99, 3, 5, AddressingMode::Absolute_Y),
        Opcode::new(Op::STA, 0x81, 2, 6, AddressingMode::Indirect_X),
        Opcode::new(Op::STA, 0x91, 2, 6, AddressingMode::Indirect_Y),

        Opcode::new(Op::STX, 0x86, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::STX, 0x96, 2, 4, AddressingMode::ZeroPage_Y),
        Opcode::new(Op::STX, 0x8E, 3, 4, AddressingMode::Absolute),

        Opcode::new(Op::STY, 0x84, 2, 3, AddressingMode::ZeroPage),
        Opcode::new(Op::STY, 0x94, 2, 4, AddressingMode::ZeroPage_X),
        Opcode::new(Op::STY, 0x8C, 3, 4, AddressingMode::Absolute),

        Opcode::new(Op::TAX, 0xAA, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::TAY, 0xA8, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::TSX, 0xBA, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::TXA, 0x8A, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::TXS, 0x9A, 1, 2, AddressingMode::Implicit),

        Opcode::new(Op::TYA, 0x98, 1, 2, AddressingMode::Implicit),
    ];

    pub static ref OPCODE_MAP: HashMap<u8, &'static Opcode> = {
        let mut map = HashMap::new();
        for opcode in &*OPCODES {
            map.insert(opcode.code, opcode);
        }
        map
    };
}

/// Addressing mode implied by an opcode's position in the 6502 opcode
/// matrix (rows of 0x20, columns 0x00-0x1F). Used to size undocumented
/// opcodes so they can be stepped over.
pub fn fallback_mode(code: u8) -> AddressingMode {
    let row = code & 0xE0;
    match code & 0x1F {
        0x00 if row == 0x20 => AddressingMode::Absolute,
        0x00 if row >= 0x80 => AddressingMode::Immediate,
        0x00 => AddressingMode::Implicit,
        0x02 if row <= 0x60 => AddressingMode::Implicit,
        0x02 => AddressingMode::Immediate,
        0x01 | 0x03 => AddressingMode::Indirect_X,
        0x04..=0x07 => AddressingMode::ZeroPage,
        0x08 | 0x0A | 0x12 | 0x18 | 0x1A => AddressingMode::Implicit,
        0x09 | 0x0B => AddressingMode::Immediate,
        0x0C if row == 0x60 => AddressingMode::Indirect,
        0x0C..=0x0F => AddressingMode::Absolute,
        0x10 => AddressingMode::Relative,
        0x11 | 0x13 => AddressingMode::Indirect_Y,
        0x14 | 0x15 => AddressingMode::ZeroPage_X,
        0x16 | 0x17 if row == 0x80 || row == 0xA0 => AddressingMode::ZeroPage_Y,
        0x16 | 0x17 => AddressingMode::ZeroPage_X,
        0x19 | 0x1B => AddressingMode::Absolute_Y,
        0x1C | 0x1D => AddressingMode::Absolute_X,
        0x1E | 0x1F if row == 0x80 || row == 0xA0 => AddressingMode::Absolute_Y,
        0x1E | 0x1F => AddressingMode::Absolute_X,
        _ => unreachable!(),
    }
}
