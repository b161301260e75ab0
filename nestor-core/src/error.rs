use std::fmt;

/// Errors raised while building a console or restoring its state.
///
/// Runtime anomalies such as unknown opcodes never surface here: they are
/// logged and emulation carries on.
#[derive(Debug)]
pub enum NesError {
    /// The image is not a usable iNES file.
    InvalidRom(String),
    /// The header names a mapper this core does not implement.
    UnsupportedMapper(u8),
    /// The mapper exists but the ROM layout does not fit it.
    InvalidMapper(String),
    /// A save-state could not be decoded or belongs to another cartridge.
    InvalidSaveState(String),
}

impl fmt::Display for NesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NesError::InvalidRom(reason) => write!(f, "invalid ROM image: {}", reason),
            NesError::UnsupportedMapper(id) => write!(f, "unsupported mapper {}", id),
            NesError::InvalidMapper(reason) => write!(f, "invalid mapper configuration: {}", reason),
            NesError::InvalidSaveState(reason) => write!(f, "invalid save-state: {}", reason),
        }
    }
}

impl std::error::Error for NesError {}

impl From<bincode::Error> for NesError {
    fn from(err: bincode::Error) -> Self {
        NesError::InvalidSaveState(err.to_string())
    }
}
