mod archive;
mod parser;
mod structures;

pub use archive::{Archive, ZipStat};
pub use parser::ZipParser;
pub use structures::*;
