//! Test-only ZIP writer.
//!
//! Produces small, well-formed archives (STORED and DEFLATE, optional
//! explicit folder entries, DOS timestamps) entirely in memory, so the
//! extraction tests control every byte of their input. Entry names are
//! written verbatim, which lets tests build hostile archives too.

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

struct BuiltEntry {
    name: String,
    data: Vec<u8>,
    crc: u32,
    uncompressed_size: u32,
    method: u16,
    dos_date: u16,
    dos_time: u16,
}

#[derive(Default)]
pub struct ZipBuilder {
    entries: Vec<BuiltEntry>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an explicit folder entry; `name` must end with '/'.
    pub fn folder(mut self, name: &str, mtime: i64) -> Self {
        assert!(name.ends_with('/'), "folder names end with a slash");
        let (dos_date, dos_time) = unix_to_dos(mtime);
        self.entries.push(BuiltEntry {
            name: name.to_string(),
            data: Vec::new(),
            crc: 0,
            uncompressed_size: 0,
            method: METHOD_STORED,
            dos_date,
            dos_time,
        });
        self
    }

    /// Add a file without compression.
    pub fn file_stored(mut self, name: &str, content: &[u8], mtime: i64) -> Self {
        let (dos_date, dos_time) = unix_to_dos(mtime);
        self.entries.push(BuiltEntry {
            name: name.to_string(),
            data: content.to_vec(),
            crc: crc32fast::hash(content),
            uncompressed_size: content.len() as u32,
            method: METHOD_STORED,
            dos_date,
            dos_time,
        });
        self
    }

    /// Add a file compressed with raw deflate.
    pub fn file_deflate(mut self, name: &str, content: &[u8], mtime: i64) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        let data = encoder.finish().unwrap();
        let (dos_date, dos_time) = unix_to_dos(mtime);
        self.entries.push(BuiltEntry {
            name: name.to_string(),
            data,
            crc: crc32fast::hash(content),
            uncompressed_size: content.len() as u32,
            method: METHOD_DEFLATE,
            dos_date,
            dos_time,
        });
        self
    }

    /// Add a file with an arbitrary method and raw payload, for exercising
    /// codec failure paths.
    pub fn file_with_method(
        mut self,
        name: &str,
        method: u16,
        data: &[u8],
        uncompressed_size: u32,
        mtime: i64,
    ) -> Self {
        let (dos_date, dos_time) = unix_to_dos(mtime);
        self.entries.push(BuiltEntry {
            name: name.to_string(),
            data: data.to_vec(),
            crc: 0,
            uncompressed_size,
            method,
            dos_date,
            dos_time,
        });
        self
    }

    /// Serialize: local headers with data, central directory, EOCD.
    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut lfh_offsets = Vec::with_capacity(self.entries.len());

        for e in &self.entries {
            lfh_offsets.push(out.len() as u32);
            out.extend_from_slice(b"PK\x03\x04");
            out.write_u16::<LittleEndian>(20).unwrap(); // version needed
            out.write_u16::<LittleEndian>(0).unwrap(); // flags
            out.write_u16::<LittleEndian>(e.method).unwrap();
            out.write_u16::<LittleEndian>(e.dos_time).unwrap();
            out.write_u16::<LittleEndian>(e.dos_date).unwrap();
            out.write_u32::<LittleEndian>(e.crc).unwrap();
            out.write_u32::<LittleEndian>(e.data.len() as u32).unwrap();
            out.write_u32::<LittleEndian>(e.uncompressed_size).unwrap();
            out.write_u16::<LittleEndian>(e.name.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap(); // extra field
            out.extend_from_slice(e.name.as_bytes());
            out.extend_from_slice(&e.data);
        }

        let cd_offset = out.len() as u32;
        for (e, lfh_offset) in self.entries.iter().zip(&lfh_offsets) {
            out.extend_from_slice(b"PK\x01\x02");
            out.write_u16::<LittleEndian>(20).unwrap(); // version made by
            out.write_u16::<LittleEndian>(20).unwrap(); // version needed
            out.write_u16::<LittleEndian>(0).unwrap(); // flags
            out.write_u16::<LittleEndian>(e.method).unwrap();
            out.write_u16::<LittleEndian>(e.dos_time).unwrap();
            out.write_u16::<LittleEndian>(e.dos_date).unwrap();
            out.write_u32::<LittleEndian>(e.crc).unwrap();
            out.write_u32::<LittleEndian>(e.data.len() as u32).unwrap();
            out.write_u32::<LittleEndian>(e.uncompressed_size).unwrap();
            out.write_u16::<LittleEndian>(e.name.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap(); // extra field
            out.write_u16::<LittleEndian>(0).unwrap(); // comment
            out.write_u16::<LittleEndian>(0).unwrap(); // disk number start
            out.write_u16::<LittleEndian>(0).unwrap(); // internal attrs
            out.write_u32::<LittleEndian>(0).unwrap(); // external attrs
            out.write_u32::<LittleEndian>(*lfh_offset).unwrap();
            out.extend_from_slice(e.name.as_bytes());
        }
        let cd_size = out.len() as u32 - cd_offset;

        out.extend_from_slice(b"PK\x05\x06");
        out.write_u16::<LittleEndian>(0).unwrap(); // disk number
        out.write_u16::<LittleEndian>(0).unwrap(); // disk with cd
        out.write_u16::<LittleEndian>(self.entries.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(self.entries.len() as u16).unwrap();
        out.write_u32::<LittleEndian>(cd_size).unwrap();
        out.write_u32::<LittleEndian>(cd_offset).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap(); // comment length
        out
    }
}

/// Unix epoch seconds to the DOS (date, time) pair. DOS time has
/// two-second resolution, so odd timestamps round down.
pub fn unix_to_dos(epoch: i64) -> (u16, u16) {
    let dt = time::OffsetDateTime::from_unix_timestamp(epoch).unwrap();
    assert!(dt.year() >= 1980, "DOS timestamps start in 1980");
    let date = (((dt.year() - 1980) as u16) << 9) | ((dt.month() as u16) << 5) | dt.day() as u16;
    let time =
        ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | (dt.second() as u16 / 2);
    (date, time)
}
