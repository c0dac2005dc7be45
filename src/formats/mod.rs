use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::bytereader::ReadError;
use crate::module::{Command, Module};

mod it;
mod s3m;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read module file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unrecognized module format")]
    UnrecognizedFormat,
    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Load a module from raw file data, picking the format by magic: `IMPM`
/// at the start for Impulse Tracker, `SCRM` at 0x2C for Scream Tracker 3.
pub fn load(data: &[u8]) -> Result<Module, LoadError> {
    if data.len() >= 4 && &data[..4] == b"IMPM" {
        return it::load(data);
    }
    if data.len() >= 0x30 && &data[0x2C..0x30] == b"SCRM" {
        return s3m::load(data);
    }
    Err(LoadError::UnrecognizedFormat)
}

pub fn load_file(path: &Path) -> Result<Module, LoadError> {
    let data = fs::read(path)?;
    load(&data)
}

/// Both formats store effect commands as 1-based letter indices; anything
/// outside the shared subset plays as no effect.
fn command_from_raw(raw: u8) -> Command {
    if !(1..=26).contains(&raw) {
        return Command::None;
    }
    let letter = (b'A' + raw - 1) as char;
    Command::from_letter(letter).unwrap_or_else(|| {
        tracing::warn!(letter = %letter, "unsupported effect command, treating as none");
        Command::None
    })
}

/// Break-to-row data bytes are decimal-packed; patterns carry the real row
/// number.
fn unpack_decimal(data: u8) -> u8 {
    (data >> 4) * 10 + (data & 0x0F)
}
