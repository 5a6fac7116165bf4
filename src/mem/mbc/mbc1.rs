use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::mem::mbc::MBC;

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;

/// The controller always backs 4 RAM banks, whatever the header declares.
pub const RAM_BANKS: usize = 4;
pub const RAM_SIZE: usize = RAM_BANKS * RAM_BANK_SIZE;

/// Value seen on reads nothing drives.
const OPEN_BUS: u8 = 0x00;

pub struct MBC1 {
  rom: Vec<u8>,
  ram: Vec<u8>,

  rom_size: usize,
  ram_size: usize,
  battery: bool,

  rom_bank: u8,
  ram_bank: u8,
  ram_on: bool,
  mode: Mode,
}

/// Addressing mode, selected by bit 0 of a write to 0x6000-0x7fff.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
  /// 16 MB ROM / 8 KB RAM. Only RAM bank 0 is reachable and the RAM gate
  /// register is ignored.
  ROM,
  /// 4 MB ROM / 32 KB RAM.
  RAM,
}

impl MBC1 {
  /// Build a controller over `rom`. `rom_size` and `ram_size` are the sizes
  /// declared by the cartridge, in bytes.
  pub fn new(
    mut rom: Vec<u8>,
    rom_size: usize,
    ram_size: usize,
    battery: bool,
  ) -> Result<Self> {
    if rom_size == 0 || rom_size % ROM_BANK_SIZE != 0 {
      bail!(
        "declared ROM size {:#x} is not a multiple of {:#x} bytes",
        rom_size,
        ROM_BANK_SIZE
      );
    }
    if rom.len() < rom_size {
      bail!(
        "ROM image is {} bytes but the cartridge declares {} bytes",
        rom.len(),
        rom_size
      );
    }
    rom.truncate(rom_size);

    let has_ram = ram_size > 0;
    Ok(Self {
      rom: rom,
      ram: if has_ram { vec![0; RAM_SIZE] } else { Vec::new() },

      rom_size: rom_size,
      ram_size: ram_size,
      battery: battery,

      rom_bank: 0,
      ram_bank: 0,
      ram_on: has_ram,
      mode: Mode::ROM,
    })
  }

  pub fn has_ram(&self) -> bool {
    !self.ram.is_empty()
  }

  pub fn has_battery(&self) -> bool {
    self.battery
  }

  pub fn rom_banks(&self) -> usize {
    self.rom_size / ROM_BANK_SIZE
  }

  /// RAM is only persisted when it exists and a battery keeps it alive.
  fn is_persistent(&self) -> bool {
    self.has_ram() && self.battery
  }

  /// The register keeps the raw value, but the switchable window never maps
  /// bank 0: a selection of 0 reads bank 1.
  fn rom_offset(&self) -> usize {
    let bank = if self.rom_bank == 0 { 1 } else { self.rom_bank };
    bank as usize * ROM_BANK_SIZE
  }

  fn ram_offset(&self) -> usize {
    match self.mode {
      Mode::RAM => self.ram_bank as usize * RAM_BANK_SIZE,
      Mode::ROM => 0,
    }
  }

  /// Write battery RAM to the file at `path`, replacing it.
  pub fn save_ram_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let path = path.as_ref();
    if !self.is_persistent() {
      return Ok(());
    }

    let file = File::create(path)
      .with_context(|| format!("failed to create {}", path.display()))?;
    info!("MBC1: saving RAM to {}", path.display());
    self
      .save_ram(&mut BufWriter::new(file))
      .with_context(|| format!("failed to write {}", path.display()))
  }

  /// Load battery RAM from the file at `path`. A missing file leaves RAM
  /// empty.
  pub fn load_ram_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
    let path = path.as_ref();
    if !self.is_persistent() {
      return Ok(());
    }

    match File::open(path) {
      Ok(mut file) => {
        info!("MBC1: loading RAM from {}", path.display());
        self
          .load_ram(Some(&mut file as &mut dyn Read))
          .with_context(|| format!("failed to load {}", path.display()))
      }
      Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
        info!(
          "MBC1: could not find {}, RAM will be empty",
          path.display()
        );
        self.load_ram(None)
      }
      Err(e) => {
        Err(e).with_context(|| format!("failed to open {}", path.display()))
      }
    }
  }
}

impl MBC for MBC1 {
  fn rb(&self, addr: u16) -> u8 {
    match addr {
      0x0000..=0x3fff => self.rom[addr as usize],
      // Banks past the end of a small image are not wired to anything.
      0x4000..=0x7fff => self
        .rom
        .get(self.rom_offset() + (addr - 0x4000) as usize)
        .cloned()
        .unwrap_or(OPEN_BUS),
      0xa000..=0xc000 => {
        let idx = (addr - 0xa000) as usize;
        if self.has_ram() && self.ram_on && idx < RAM_BANK_SIZE {
          self.ram[self.ram_offset() + idx]
        } else {
          OPEN_BUS
        }
      }
      _ => OPEN_BUS,
    }
  }

  fn wb(&mut self, addr: u16, value: u8) {
    match addr {
      0x0000..=0x1fff => {
        if self.mode == Mode::RAM && self.has_ram() {
          self.ram_on = value & 0x0f == 0x0a;
          debug!(
            "MBC1: {} RAM",
            if self.ram_on { "Enabling" } else { "Disabling" }
          );
        }
      }
      0x2000..=0x3fff => self.rom_bank = value & 0x1f,
      0x4000..=0x5fff => self.ram_bank = value & 0x03,
      0x6000..=0x7fff => {
        self.mode = if value & 0x01 == 0x00 {
          Mode::ROM
        } else {
          Mode::RAM
        };
        debug!("MBC1: Switched mode to {:?}", self.mode);
      }
      0xa000..=0xbfff => {
        if self.has_ram() && self.ram_on {
          let offset = self.ram_offset();
          self.ram[offset + (addr - 0xa000) as usize] = value;
        }
      }
      _ => (),
    }
  }

  fn save_ram(&self, sink: &mut dyn Write) -> Result<()> {
    if !self.is_persistent() {
      return Ok(());
    }

    for (i, bank) in self.ram.chunks(RAM_BANK_SIZE).enumerate() {
      debug!("MBC1: --> Saving RAM bank {}", i);
      sink.write_all(bank)?;
    }
    sink.flush()?;
    Ok(())
  }

  fn load_ram(&mut self, source: Option<&mut dyn Read>) -> Result<()> {
    if !self.is_persistent() {
      return Ok(());
    }
    let source = match source {
      Some(source) => source,
      None => return Ok(()),
    };

    let mut data = Vec::with_capacity(RAM_SIZE);
    // One byte past the limit is enough to tell the save is too long.
    source.take(RAM_SIZE as u64 + 1).read_to_end(&mut data)?;
    if data.len() != RAM_SIZE {
      bail!(
        "RAM save is {} bytes, expected exactly {} bytes",
        data.len(),
        RAM_SIZE
      );
    }

    let banks = self.ram.chunks_mut(RAM_BANK_SIZE);
    for (i, (bank, chunk)) in banks.zip(data.chunks(RAM_BANK_SIZE)).enumerate() {
      debug!("MBC1: --> Populating RAM bank {}", i);
      bank.copy_from_slice(chunk);
    }
    Ok(())
  }
}

impl fmt::Display for MBC1 {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    writeln!(f, "Memory Bank Controller")?;
    writeln!(f, "{}", "-".repeat(50))?;
    writeln!(
      f,
      "{:<18} {} ({} bytes)",
      "ROM Banks:",
      self.rom_banks(),
      self.rom_size
    )?;
    writeln!(
      f,
      "{:<18} {} ({} bytes)",
      "RAM Banks:",
      self.ram_size / RAM_BANK_SIZE,
      self.ram_size
    )?;
    writeln!(
      f,
      "{:<18} {}",
      "Battery:",
      if self.battery { "Yes" } else { "No" }
    )
  }
}

// Manual implementation to omit printing the full memory.
impl fmt::Debug for MBC1 {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("MBC1")
      .field("rom_size", &self.rom_size)
      .field("ram_size", &self.ram_size)
      .field("battery", &self.battery)
      .field("rom_bank", &self.rom_bank)
      .field("ram_bank", &self.ram_bank)
      .field("ram_on", &self.ram_on)
      .field("mode", &self.mode)
      .finish()
  }
}
