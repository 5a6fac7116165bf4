pub mod cartridge;
pub mod mbc;

pub use self::cartridge::Header;
pub use self::mbc::{MBC, MBC1};
