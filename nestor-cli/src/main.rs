use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{info, LevelFilter, Metadata, Record};
use nestor_core::ppu::{FrameBuffer, SCREEN_HEIGHT, SCREEN_WIDTH};
use nestor_core::rom::Rom;
use nestor_core::{Nes, NesConfig};

const FRAME_TIME: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// Headless NES runner
#[derive(Parser, Debug)]
#[command(name = "nestor")]
#[command(about = "Runs an iNES ROM without a window", long_about = None)]
struct Args {
    /// Path to the iNES ROM file
    rom: PathBuf,

    /// Number of frames to run
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// Pace frames to 60Hz instead of running flat out
    #[arg(long)]
    realtime: bool,

    /// Restore this save-state before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save-state here after the last frame
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Write the last frame here as a binary PPM image
    #[arg(long)]
    dump_frame: Option<PathBuf>,

    /// One of off, error, warn, info, debug, trace
    #[arg(long, default_value = "warn")]
    log_level: LevelFilter,

    /// Log every instruction (needs --log-level trace)
    #[arg(long)]
    trace: bool,

    /// Start executing here instead of at the reset vector, in hex
    #[arg(long, value_parser = parse_hex)]
    start_address: Option<u16>,
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn parse_hex(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches('$');
    u16::from_str_radix(digits, 16).map_err(|e| format!("{}: {}", s, e))
}

fn encode_ppm(frame: &FrameBuffer) -> Vec<u8> {
    let mut out = format!("P6\n{} {}\n255\n", SCREEN_WIDTH, SCREEN_HEIGHT).into_bytes();
    for pixel in &frame.pixels {
        out.push((pixel >> 16) as u8);
        out.push((pixel >> 8) as u8);
        out.push(*pixel as u8);
    }
    out
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    log::set_logger(&LOGGER)?;
    log::set_max_level(args.log_level);

    let rom = Rom::from_ines(&fs::read(&args.rom)?)?;
    let mut config = NesConfig::default().with_tracing(args.trace);
    if let Some(addr) = args.start_address {
        config = config.with_start_address(addr);
    }
    let mut nes = Nes::with_config(rom, config)?;

    if let Some(path) = &args.load_state {
        nes.load_state(&fs::read(path)?)?;
        info!("Loaded state from {}", path.display());
    }

    for _ in 0..args.frames {
        let start = Instant::now();
        nes.run_frame();
        if args.realtime {
            if let Some(rest) = FRAME_TIME.checked_sub(start.elapsed()) {
                thread::sleep(rest);
            }
        }
    }
    println!("Ran {} frames, {} instructions", args.frames, nes.cpu.instruction_count);

    if let Some(path) = &args.save_state {
        fs::write(path, nes.save_state()?)?;
        info!("Saved state to {}", path.display());
    }
    if let Some(path) = &args.dump_frame {
        fs::write(path, encode_ppm(nes.frame()))?;
    }
    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("C000"), Ok(0xC000));
        assert_eq!(parse_hex("0x8000"), Ok(0x8000));
        assert_eq!(parse_hex("$fffc"), Ok(0xFFFC));
        assert!(parse_hex("G000").is_err());
    }

    #[test]
    fn test_ppm_layout() {
        let mut frame = FrameBuffer::new();
        frame.set(0, 0, 0x123456);
        let ppm = encode_ppm(&frame);

        let header = b"P6\n256 240\n255\n";
        assert_eq!(&ppm[..header.len()], header);
        assert_eq!(&ppm[header.len()..header.len() + 3], &[0x12, 0x34, 0x56]);
        assert_eq!(ppm.len(), header.len() + SCREEN_WIDTH * SCREEN_HEIGHT * 3);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["nestor", "game.nes", "--frames", "5", "--start-address", "C000", "--log-level", "debug"]);
        assert_eq!(args.frames, 5);
        assert_eq!(args.start_address, Some(0xC000));
        assert_eq!(args.log_level, LevelFilter::Debug);
        assert!(!args.realtime);
    }
}
