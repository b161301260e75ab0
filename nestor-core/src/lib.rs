pub mod bus;
pub mod cart;
pub mod config;
pub mod cpu;
pub mod error;
pub mod events;
pub mod joypad;
pub mod nes;
pub mod opcodes;
pub mod palette;
pub mod picture_bus;
pub mod ppu;
pub mod rom;

pub use config::NesConfig;
pub use error::NesError;
pub use nes::Nes;
