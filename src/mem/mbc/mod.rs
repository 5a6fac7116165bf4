use std::io::{Read, Write};

use anyhow::Result;

pub mod mbc1;

pub use self::mbc1::MBC1;

/// A memory bank controller, as seen from the cartridge slot.
///
/// Reads and writes never fail: addresses the controller does not map read
/// as `0x00` and writes to them are dropped.
pub trait MBC {
  /// Read a byte at address `addr`.
  fn rb(&self, addr: u16) -> u8;

  /// Write `value` at address `addr`.
  fn wb(&mut self, addr: u16, value: u8);

  /// Flush battery-backed RAM to `sink`.
  fn save_ram(&self, sink: &mut dyn Write) -> Result<()>;

  /// Replace battery-backed RAM with the contents of `source`. `None`
  /// means there is no save yet.
  fn load_ram(&mut self, source: Option<&mut dyn Read>) -> Result<()>;
}
