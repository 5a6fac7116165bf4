//! Cartridge header parsing.

use anyhow::{bail, Result};

use crate::mem::MBC1;

const TITLE_START: usize = 0x0134;
const TITLE_END: usize = 0x0144;
const CARTRIDGE_TYPE: usize = 0x0147;
const ROM_SIZE: usize = 0x0148;
const RAM_SIZE: usize = 0x0149;
const HEADER_END: usize = 0x0150;

/// The MBC1 flavours the header can declare at `0x0147`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
  MBC1,
  MBC1Ram,
  MBC1RamBattery,
}

impl Kind {
  pub fn from_byte(byte: u8) -> Result<Kind> {
    match byte {
      0x01 => Ok(Kind::MBC1),
      0x02 => Ok(Kind::MBC1Ram),
      0x03 => Ok(Kind::MBC1RamBattery),
      _ => bail!("unsupported cartridge type {:#04x}", byte),
    }
  }

  pub fn has_ram(self) -> bool {
    self != Kind::MBC1
  }

  pub fn has_battery(self) -> bool {
    self == Kind::MBC1RamBattery
  }
}

#[derive(Debug, Clone)]
pub struct Header {
  pub title: String,
  pub kind: Kind,
  /// Declared ROM size in bytes.
  pub rom_size: usize,
  /// Declared RAM size in bytes. Zero when the cartridge has no RAM chip.
  pub ram_size: usize,
}

impl Header {
  pub fn parse(rom: &[u8]) -> Result<Header> {
    if rom.len() < HEADER_END {
      bail!("ROM image is only {} bytes, too short for a header", rom.len());
    }

    let title = &rom[TITLE_START..TITLE_END];
    let len = title.iter().position(|b| *b == 0).unwrap_or(title.len());
    let title = String::from_utf8_lossy(&title[..len]).trim_end().to_string();

    let kind = Kind::from_byte(rom[CARTRIDGE_TYPE])?;
    let rom_size = match rom[ROM_SIZE] {
      code @ 0x00..=0x08 => 0x8000 << code,
      code => bail!("invalid ROM size code {:#04x}", code),
    };
    let ram_size = match rom[RAM_SIZE] {
      0x00 => 0,
      0x01 => 0x800,
      0x02 => 0x2000,
      0x03 => 0x8000,
      0x04 => 0x20000,
      0x05 => 0x10000,
      code => bail!("invalid RAM size code {:#04x}", code),
    };
    if !kind.has_ram() && ram_size != 0 {
      warn!("{:?} cartridge declares {} bytes of RAM, ignoring", kind, ram_size);
    }

    Ok(Header {
      title: title,
      kind: kind,
      rom_size: rom_size,
      ram_size: if kind.has_ram() { ram_size } else { 0 },
    })
  }

  /// Build the controller this header describes over `rom`.
  pub fn into_controller(self, rom: Vec<u8>) -> Result<MBC1> {
    MBC1::new(rom, self.rom_size, self.ram_size, self.kind.has_battery())
  }
}
