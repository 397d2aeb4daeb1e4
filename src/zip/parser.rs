//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures over an
//! archive that has been read fully into memory.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header to locate the data
//!
//! The parser borrows the buffer and never copies entry data; it only
//! hands out bounds-checked slices.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use anyhow::{Result, bail};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser over an in-memory archive.
///
/// Typically used through [`Archive`](super::Archive) rather than directly.
pub struct ZipParser<'a> {
    data: &'a [u8],
}

impl<'a> ZipParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bounds-checked slice of `len` bytes at `offset`.
    pub fn slice(&self, offset: u64, len: u64) -> Result<&'a [u8]> {
        let start = usize::try_from(offset)?;
        let end = match usize::try_from(len).ok().and_then(|l| start.checked_add(l)) {
            Some(end) => end,
            None => bail!("read of {} bytes at offset {} overflows", len, offset),
        };
        match self.data.get(start..end) {
            Some(s) => Ok(s),
            None => bail!(
                "read of {} bytes at offset {} runs past the end of the archive",
                len,
                offset
            ),
        }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The EOCD is located at the end of the ZIP file. This handles both the
    /// simple case (no comment) and archives with comments by searching
    /// backwards for the signature.
    ///
    /// Returns the record and its offset in the archive.
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let size = self.data.len() as u64;

        // Fast path: no archive comment, so the EOCD sits exactly at the end.
        if size >= EndOfCentralDirectory::SIZE as u64 {
            let offset = size - EndOfCentralDirectory::SIZE as u64;
            let buf = self.slice(offset, EndOfCentralDirectory::SIZE as u64)?;
            if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
                let eocd = EndOfCentralDirectory::from_bytes(buf)?;
                return Ok((eocd, offset));
            }
        }

        // The EOCD is earlier if there's a ZIP comment; search backwards
        // through the maximum comment window for the signature.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(size);
        let search_start = size - search_size;
        let buf = self.slice(search_start, search_size)?;

        if buf.len() >= EndOfCentralDirectory::SIZE {
            for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
                if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                    // Candidate found; the comment length must account for
                    // every byte that follows the record.
                    let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
                    if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                        let eocd = EndOfCentralDirectory::from_bytes(
                            &buf[i..i + EndOfCentralDirectory::SIZE],
                        )?;
                        return Ok((eocd, search_start + i as u64));
                    }
                }
            }
        }

        bail!("not a valid ZIP file")
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions are in play
    /// (fields saturated to 0xFFFF or 0xFFFFFFFF).
    pub fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        // The ZIP64 EOCD locator sits immediately before the regular EOCD.
        if eocd_offset < Zip64EOCDLocator::SIZE as u64 {
            bail!("missing ZIP64 locator");
        }
        let locator_offset = eocd_offset - Zip64EOCDLocator::SIZE as u64;
        let locator_buf = self.slice(locator_offset, Zip64EOCDLocator::SIZE as u64)?;
        let locator = Zip64EOCDLocator::from_bytes(locator_buf)?;

        let eocd64_buf = self.slice(locator.eocd64_offset, Zip64EOCD::MIN_SIZE as u64)?;
        Zip64EOCD::from_bytes(eocd64_buf)
    }

    /// Parse the central directory into one [`CdEntry`] per archive entry,
    /// in entry order.
    pub fn list_entries(&self) -> Result<Vec<CdEntry>> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset)?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        let cd_data = self.slice(cd_offset, cd_size)?;
        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(cd_data);

        for _ in 0..total_entries {
            entries.push(Self::parse_cdfh(&mut cursor)?);
        }

        Ok(entries)
    }

    /// Parse one Central Directory File Header from the cursor.
    fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<CdEntry> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            bail!("invalid central directory file header");
        }

        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let _flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        // Lossy conversion keeps non-UTF8 names extractable.
        let file_name = String::from_utf8_lossy(&file_name_bytes).to_string();

        // ZIP64 extended information lives in extra field 0x0001; a size
        // field is present there only when the header field is saturated.
        let extra_field_end = cursor.position() + extra_field_length as u64;

        while cursor.position() + 4 <= extra_field_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()?;

            if header_id == 0x0001 {
                if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= extra_field_end {
                    uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= extra_field_end {
                    compressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= extra_field_end {
                    lfh_offset = cursor.read_u64::<LittleEndian>()?;
                }
                // Skip whatever ZIP64 fields remain (disk number start).
                let remaining = extra_field_end.saturating_sub(cursor.position());
                cursor.set_position(cursor.position() + remaining);
            } else {
                cursor.set_position(cursor.position() + field_size as u64);
            }
        }

        cursor.set_position(extra_field_end);
        // Skip the file comment; it is not used.
        cursor.set_position(cursor.position() + file_comment_length as u64);

        Ok(CdEntry {
            file_name,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            last_mod_time,
            last_mod_date,
        })
    }

    /// Locate the start of an entry's data given its Local File Header
    /// offset.
    ///
    /// The LFH repeats the variable-length name and extra field, which may
    /// differ from the central directory's copy, so the data offset has to
    /// be computed from the LFH itself.
    pub fn data_offset(&self, lfh_offset: u64) -> Result<u64> {
        let lfh_buf = self.slice(lfh_offset, LFH_SIZE as u64)?;
        if &lfh_buf[0..4] != LFH_SIGNATURE {
            bail!("invalid local file header at offset {}", lfh_offset);
        }

        let mut cursor = Cursor::new(lfh_buf);
        cursor.set_position(26); // filename length field
        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        Ok(lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
    }
}
