//! High-level archive facade.
//!
//! [`Archive`] wraps the low-level parser: construction enumerates the
//! central directory once and caches a [`ZipStat`] per entry, validating
//! every entry name before anything touches the filesystem. Extraction can
//! fill a caller-supplied scratch buffer or stream chunks straight to a file.
//!
//! The facade makes no attempt to be thread-safe. The worker threads each
//! construct their own `Archive` over the shared, immutable buffer; only the
//! `Arc` refcount is touched concurrently.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use flate2::read::DeflateDecoder;

use crate::fsx;
use crate::path::ArchivePath;

use super::parser::ZipParser;
use super::structures::{CompressionMethod, dos_to_unix};

/// Cached stat record for one archive entry.
///
/// Every field is populated (and the name validated) at archive
/// construction, so the getters are infallible.
#[derive(Debug, Clone)]
pub struct ZipStat {
    index: u64,
    name: String,
    path: ArchivePath,
    size: u64,
    comp_size: u64,
    mtime: i64,
    method: CompressionMethod,
    lfh_offset: u64,
}

impl ZipStat {
    /// Zero-based index of the entry within the archive.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Entry name as archived. Folder names end with '/'.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The validated relative path of the entry.
    pub fn path(&self) -> &ArchivePath {
        &self.path
    }

    /// Uncompressed size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Compressed size.
    pub fn comp_size(&self) -> u64 {
        self.comp_size
    }

    /// Archived modification time, unix epoch seconds. ZIP stores no
    /// timezone, so this is the wall-clock of the archiving machine.
    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    pub fn is_folder(&self) -> bool {
        self.name.ends_with('/')
    }

    /// The folder an entry lives in: the parent for files, the entry's own
    /// path for folders.
    pub fn folder_path(&self) -> ArchivePath {
        if self.is_folder() {
            self.path.clone()
        } else {
            // A file entry has a non-empty path, so parent() cannot fail.
            self.path.parent().unwrap_or_default()
        }
    }
}

#[cfg(test)]
impl ZipStat {
    /// Bare stat record for strategy and engine unit tests.
    pub(crate) fn for_tests(index: u64, name: &str, size: u64) -> Self {
        Self {
            index,
            name: name.to_string(),
            path: ArchivePath::new(name.trim_end_matches('/')).unwrap(),
            size,
            comp_size: size,
            mtime: 0,
            method: CompressionMethod::Stored,
            lfh_offset: 0,
        }
    }
}

/// A read-only archive bound to a shared in-memory buffer.
pub struct Archive {
    buffer: Arc<Vec<u8>>,
    stats: Vec<ZipStat>,
}

impl Archive {
    /// Parse the archive tables and cache every entry's stat record.
    ///
    /// Fails on malformed archives and on any entry whose name is empty,
    /// rooted, carries a drive letter or contains backslashes, before a
    /// single byte is extracted.
    pub fn new(buffer: Arc<Vec<u8>>) -> Result<Self> {
        let entries = ZipParser::new(&buffer).list_entries()?;
        let mut stats = Vec::with_capacity(entries.len());
        for (i, e) in entries.into_iter().enumerate() {
            ensure!(!e.file_name.is_empty(), "entry {} has an empty name", i);
            let path = ArchivePath::new(&e.file_name)
                .with_context(|| format!("entry {} has an unusable name", i))?;
            stats.push(ZipStat {
                index: i as u64,
                name: e.file_name,
                path,
                size: e.uncompressed_size,
                comp_size: e.compressed_size,
                mtime: dos_to_unix(e.last_mod_date, e.last_mod_time),
                method: e.compression_method,
                lfh_offset: e.lfh_offset,
            });
        }
        Ok(Self { buffer, stats })
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn at(&self, idx: u64) -> Result<&ZipStat> {
        match self.stats.get(idx as usize) {
            Some(s) => Ok(s),
            None => bail!("entry index {} out of range ({} entries)", idx, self.len()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZipStat> {
        self.stats.iter()
    }

    /// Open a streaming reader over one entry's decompressed bytes.
    fn open_entry(&self, idx: u64) -> Result<EntryReader<'_>> {
        let stat = self.at(idx)?;
        let parser = ZipParser::new(&self.buffer);
        let offset = parser.data_offset(stat.lfh_offset)?;
        let data = parser.slice(offset, stat.comp_size)?;
        let decoder = match stat.method {
            CompressionMethod::Stored => Decoder::Stored(data),
            CompressionMethod::Deflate => Decoder::Deflate(DeflateDecoder::new(data)),
            CompressionMethod::Unknown(m) => {
                bail!("unsupported compression method {} for {:?}", m, stat.name)
            }
        };
        Ok(EntryReader { decoder })
    }

    /// Decompress an entry into a freshly allocated buffer.
    pub fn extract(&self, idx: u64) -> Result<Vec<u8>> {
        let size = self.at(idx)?.size();
        let mut out = vec![0u8; size as usize];
        self.extract_in(idx, &mut out)?;
        Ok(out)
    }

    /// Decompress an entry into `scratch`, which must be at least the
    /// entry's uncompressed size. Returns the number of bytes written.
    pub fn extract_in(&self, idx: u64, scratch: &mut [u8]) -> Result<u64> {
        let stat = self.at(idx)?;
        let size = stat.size as usize;
        ensure!(
            scratch.len() >= size,
            "scratch buffer of {} bytes cannot hold entry {:?} of {} bytes",
            scratch.len(),
            stat.name,
            size
        );
        let mut reader = self.open_entry(idx)?;
        let mut filled = 0usize;
        while filled < size {
            let n = reader.read(&mut scratch[filled..size])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        ensure!(
            filled == size,
            "entry {:?} decompressed to {} bytes, expected {}",
            stat.name,
            filled,
            size
        );
        Ok(filled as u64)
    }

    /// Decompress an entry straight to `dest`, staging through `scratch`
    /// so at most `scratch.len()` bytes are in flight at once.
    pub fn extract_to(&self, idx: u64, dest: &Path, scratch: &mut [u8]) -> Result<()> {
        let stat = self.at(idx)?;
        let size = stat.size;
        let mut reader = self.open_entry(idx)?;
        let mut file = fsx::File::open(dest, fsx::Mode::Write)?;
        let mut total = 0u64;
        loop {
            let n = reader.read(scratch)?;
            if n == 0 {
                break;
            }
            file.write(scratch, n)?;
            total += n as u64;
        }
        ensure!(
            total == size,
            "entry {:?} decompressed to {} bytes, expected {}",
            stat.name,
            total,
            size
        );
        Ok(())
    }
}

/// Streaming reader over one entry's decompressed data.
enum Decoder<'a> {
    Stored(&'a [u8]),
    Deflate(DeflateDecoder<&'a [u8]>),
}

struct EntryReader<'a> {
    decoder: Decoder<'a>,
}

impl Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.decoder {
            Decoder::Stored(data) => data.read(buf),
            Decoder::Deflate(dec) => dec.read(buf),
        }
    }
}
