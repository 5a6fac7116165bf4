#[macro_use]
extern crate log;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{anyhow, Context, Result};
use clap::{App, Arg, ArgMatches};

mod mem;

use crate::mem::{Header, MBC};

fn main() {
  let matches = app().get_matches();

  if let Some(level) = matches.value_of("log-level") {
    env::set_var("RUST_LOG", level);
  }
  if let Err(e) = env_logger::init() {
    eprintln!("failed to initialize logging: {}", e);
  }

  // We just catch potential errors here and pretty print them.
  if let Err(e) = run(&matches) {
    eprintln!("ERROR: {:#}", e);
    process::exit(1);
  }
}

fn app<'a, 'b>() -> App<'a, 'b> {
  App::new("gb-mbc1")
    .version(env!("CARGO_PKG_VERSION"))
    .about("Loads an MBC1 cartridge and drives its bank controller")
    .arg(
      Arg::with_name("rom")
        .help("Path to the ROM that should be loaded")
        .required(true)
        .index(1),
    )
    .arg(
      Arg::with_name("save")
        .long("save")
        .short("s")
        .takes_value(true)
        .value_name("PATH")
        .help("Battery save file [default: the ROM path with a .sav extension]"),
    )
    .arg(
      Arg::with_name("no-save")
        .long("no-save")
        .conflicts_with("save")
        .help("Neither load nor flush the battery save"),
    )
    .arg(
      Arg::with_name("write")
        .long("write")
        .short("w")
        .takes_value(true)
        .multiple(true)
        .number_of_values(1)
        .value_name("ADDR=VAL")
        .help("Bus write applied before dumping, in hex. Can be repeated."),
    )
    .arg(
      Arg::with_name("dump")
        .long("dump")
        .short("d")
        .takes_value(true)
        .value_name("ADDR")
        .help("Hex address to start dumping bytes from"),
    )
    .arg(
      Arg::with_name("len")
        .long("len")
        .short("n")
        .takes_value(true)
        .requires("dump")
        .value_name("LEN")
        .help("Number of bytes to dump, in hex [default: 100]"),
    )
    .arg(
      Arg::with_name("log-level")
        .long("log-level")
        .short("l")
        .takes_value(true)
        .possible_values(&["off", "error", "warn", "info", "debug", "trace"])
        .help("Overrides RUST_LOG"),
    )
}

/// The actual main function.
fn run(matches: &ArgMatches) -> Result<()> {
  let rom_path = matches
    .value_of_os("rom")
    .map(Path::new)
    .ok_or_else(|| anyhow!("no ROM given"))?;
  let rom = fs::read(rom_path)
    .with_context(|| format!("failed to load ROM file {}", rom_path.display()))?;

  let header = Header::parse(&rom)?;
  info!("Loaded: {:?}", header);
  println!("Title: {}", header.title);
  let mut mbc = header.into_controller(rom)?;
  print!("{}", mbc);

  let save_path = save_path(matches, rom_path);
  if save_path.is_some() && !mbc.has_battery() {
    info!("cartridge has no battery, RAM will not be persisted");
  }
  if let Some(path) = &save_path {
    mbc.load_ram_file(path)?;
  }

  if let Some(writes) = matches.values_of("write") {
    for write in writes {
      let (addr, value) = parse_write(write)?;
      debug!("bus write {:04x} <- {:02x}", addr, value);
      mbc.wb(addr, value);
    }
  }

  if let Some(start) = matches.value_of("dump") {
    let start = parse_hex(start)?;
    let len = parse_hex(matches.value_of("len").unwrap_or("100"))?;
    print!("{}", hex_dump(&mbc, start, len));
  }

  if let Some(path) = &save_path {
    mbc.save_ram_file(path)?;
  }
  Ok(())
}

fn save_path(matches: &ArgMatches, rom_path: &Path) -> Option<PathBuf> {
  if matches.is_present("no-save") {
    return None;
  }
  match matches.value_of_os("save") {
    Some(path) => Some(PathBuf::from(path)),
    None => Some(rom_path.with_extension("sav")),
  }
}

/// Parse a hex number, with or without a leading `0x`.
fn parse_hex(src: &str) -> Result<u16> {
  let digits = src.trim_start_matches("0x").trim_start_matches("0X");
  u16::from_str_radix(digits, 16)
    .with_context(|| format!("'{}' is not a 16 bit hex number", src))
}

/// Parse an `ADDR=VAL` bus write.
fn parse_write(src: &str) -> Result<(u16, u8)> {
  let mut parts = src.splitn(2, '=');
  let addr = parts.next().unwrap_or("");
  let value = parts
    .next()
    .ok_or_else(|| anyhow!("'{}' is not of the form ADDR=VAL", src))?;

  let value = parse_hex(value)?;
  if value > 0xff {
    return Err(anyhow!("value in '{}' does not fit in a byte", src));
  }
  Ok((parse_hex(addr)?, value as u8))
}

/// Read `len` bytes through the bus, 16 to a line.
fn hex_dump(mbc: &dyn MBC, start: u16, len: u16) -> String {
  let len = u32::from(len);
  let mut out = String::new();
  for row in (0..len).step_by(16) {
    out.push_str(&format!("{:04x}:", start.wrapping_add(row as u16)));
    for i in row..(row + 16).min(len) {
      out.push_str(&format!(" {:02x}", mbc.rb(start.wrapping_add(i as u16))));
    }
    out.push('\n');
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mem::MBC1;

  fn init() -> MBC1 {
    let rom = (0..0x8000).map(|i| (i & 0xff) as u8).collect();
    MBC1::new(rom, 0x8000, 0x8000, false).unwrap()
  }

  #[test]
  fn hex_numbers() {
    assert_eq!(parse_hex("4000").unwrap(), 0x4000);
    assert_eq!(parse_hex("0xa0").unwrap(), 0xa0);
    assert_eq!(parse_hex("FFFF").unwrap(), 0xffff);
    assert!(parse_hex("10000").is_err());
    assert!(parse_hex("zz").is_err());
  }

  #[test]
  fn bus_writes() {
    assert_eq!(parse_write("2000=1f").unwrap(), (0x2000, 0x1f));
    assert_eq!(parse_write("0x6000=0x01").unwrap(), (0x6000, 0x01));
    assert!(parse_write("2000").is_err());
    assert!(parse_write("2000=100").is_err());
    assert!(parse_write("=1").is_err());
  }

  #[test]
  fn dump() {
    let mut mbc = init();
    assert_eq!(
      hex_dump(&mbc, 0x0010, 0x14),
      "0010: 10 11 12 13 14 15 16 17 18 19 1a 1b 1c 1d 1e 1f\n\
       0020: 20 21 22 23\n"
    );

    mbc.wb(0xa000, 0xaa);
    assert_eq!(hex_dump(&mbc, 0x9fff, 2), "9fff: 00 aa\n");
    assert_eq!(hex_dump(&mbc, 0xffff, 2), "ffff: 00 00\n");
    assert_eq!(hex_dump(&mbc, 0x0000, 0), "");
  }

  #[test]
  fn arguments() {
    let matches = app()
      .get_matches_from_safe(vec![
        "gb-mbc1", "game.gb", "-w", "2000=3", "--write", "6000=1", "-d", "4000",
      ])
      .unwrap();
    let writes: Vec<_> = matches.values_of("write").unwrap().collect();
    assert_eq!(writes, vec!["2000=3", "6000=1"]);
    assert_eq!(matches.value_of("dump"), Some("4000"));
    assert_eq!(
      save_path(&matches, Path::new("game.gb")),
      Some(PathBuf::from("game.sav"))
    );

    let matches = app()
      .get_matches_from_safe(vec!["gb-mbc1", "game.gb", "--no-save"])
      .unwrap();
    assert_eq!(save_path(&matches, Path::new("game.gb")), None);

    let matches = app()
      .get_matches_from_safe(vec!["gb-mbc1", "game.gb", "-s", "other.sav"])
      .unwrap();
    assert_eq!(
      save_path(&matches, Path::new("game.gb")),
      Some(PathBuf::from("other.sav"))
    );

    assert!(app()
      .get_matches_from_safe(vec!["gb-mbc1", "game.gb", "--no-save", "-s", "x"])
      .is_err());
    assert!(app().get_matches_from_safe(vec!["gb-mbc1", "-n", "10"]).is_err());
  }
}
