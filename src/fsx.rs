//! Filesystem veneer: the handful of primitives the extractor needs, with
//! platform differences kept behind one seam.
//!
//! The engine pre-creates every directory before any worker runs, so workers
//! only ever open, write, rename and retouch files. `mkdir_p`/`mkdirs_p`
//! consult an in-memory set of known-existing paths so a deep tree is
//! stat'd once per directory across a whole batch.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use filetime::FileTime;

use crate::path::ArchivePath;

/// Platform-independent result of a path stat.
#[derive(Debug, Clone, Copy)]
pub struct FsStat {
    pub exists: bool,
    pub is_folder: bool,
}

/// Stat a path. A missing path is not an error; anything else that goes
/// wrong is.
pub fn stat(path: &Path) -> Result<FsStat> {
    match fs::metadata(path) {
        Ok(meta) => Ok(FsStat {
            exists: true,
            is_folder: meta.is_dir(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FsStat {
            exists: false,
            is_folder: false,
        }),
        Err(e) => Err(e).with_context(|| format!("failed to stat {}", path.display())),
    }
}

/// Create exactly one directory level. Fails if it already exists or the
/// parent is missing. Mode is `rwxr-xr-x` on POSIX.
pub fn create_folder(path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder
        .create(path)
        .with_context(|| format!("failed to create folder {}", path.display()))
}

/// Idempotent recursive directory create of `path` under `prefix`.
pub fn mkdir_p(prefix: &Path, path: &ArchivePath) -> Result<()> {
    let mut cache = BTreeSet::new();
    mkdir_p_cached(prefix, &mut cache, path)
}

/// `mkdir_p` for a batch of paths with a shared known-exists cache, so a
/// common parent is stat'd at most once.
pub fn mkdirs_p(prefix: &Path, paths: &[ArchivePath]) -> Result<()> {
    let mut cache = BTreeSet::new();
    for path in paths {
        mkdir_p_cached(prefix, &mut cache, path)?;
    }
    Ok(())
}

fn mkdir_p_cached(
    prefix: &Path,
    cache: &mut BTreeSet<ArchivePath>,
    path: &ArchivePath,
) -> Result<()> {
    if path.is_empty() || cache.contains(path) {
        return Ok(());
    }
    // Parents first; recursion bottoms out at the empty path.
    mkdir_p_cached(prefix, cache, &path.parent()?)?;
    cache.insert(path.clone());
    let full = path.to_fs_path(prefix);
    let info = stat(&full)?;
    if info.exists {
        ensure!(
            info.is_folder,
            "path {} exists but is not a folder",
            full.display()
        );
        return Ok(());
    }
    create_folder(&full)
}

/// Set both access and modification time to `t` (epoch seconds).
pub fn set_timestamp(path: &Path, t: i64) -> Result<()> {
    let ft = FileTime::from_unix_time(t, 0);
    filetime::set_file_times(path, ft, ft)
        .with_context(|| format!("failed to set timestamp on {}", path.display()))
}

/// Rename `src` to `dst`, replacing `dst` if it exists. A rename onto
/// itself is a no-op.
pub fn rename_file(src: &Path, dst: &Path) -> Result<()> {
    if src == dst {
        return Ok(());
    }
    // POSIX rename already replaces; Windows refuses, so clear the target.
    #[cfg(windows)]
    if stat(dst)?.exists {
        fs::remove_file(dst)
            .with_context(|| format!("failed to replace {}", dst.display()))?;
    }
    fs::rename(src, dst).with_context(|| {
        format!("failed to rename {} to {}", src.display(), dst.display())
    })
}

/// Open mode for the scoped [`File`] handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

/// A scoped file handle. Closed deterministically on drop.
pub struct File {
    inner: fs::File,
    mode: Mode,
    path: PathBuf,
}

impl File {
    pub fn open(path: &Path, mode: Mode) -> Result<Self> {
        let inner = match mode {
            Mode::Read => fs::File::open(path),
            Mode::Write => fs::File::create(path),
        }
        .with_context(|| format!("failed to open {} ({:?})", path.display(), mode))?;
        Ok(Self {
            inner,
            mode,
            path: path.to_path_buf(),
        })
    }

    /// Read the whole file: seek to the end to learn the size, rewind, read.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        ensure!(self.mode == Mode::Read, "read_all on a write handle");
        let len = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(0))?;
        let mut buf = vec![0u8; len as usize];
        self.inner
            .read_exact(&mut buf)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        Ok(buf)
    }

    /// Write the first `n` bytes of `buf`. Fails on a short write or when
    /// `n` exceeds the buffer.
    pub fn write(&mut self, buf: &[u8], n: usize) -> Result<()> {
        ensure!(self.mode == Mode::Write, "write on a read handle");
        if n > buf.len() {
            bail!("write of {} bytes exceeds buffer of {}", n, buf.len());
        }
        io::Write::write_all(&mut self.inner, &buf[..n])
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stat_reports_absent_files_and_folders() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let s = stat(&missing).unwrap();
        assert!(!s.exists);

        let s = stat(dir.path()).unwrap();
        assert!(s.exists && s.is_folder);

        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();
        let s = stat(&file).unwrap();
        assert!(s.exists && !s.is_folder);
    }

    #[test]
    fn create_folder_is_single_level() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        create_folder(&a).unwrap();
        assert!(create_folder(&a).is_err());
        assert!(create_folder(&dir.path().join("x/y")).is_err());
    }

    #[test]
    fn mkdir_p_is_idempotent_and_recursive() {
        let dir = tempdir().unwrap();
        let p = ArchivePath::new("a/b/c").unwrap();
        mkdir_p(dir.path(), &p).unwrap();
        assert!(dir.path().join("a/b/c").is_dir());
        mkdir_p(dir.path(), &p).unwrap();
    }

    #[test]
    fn mkdir_p_fails_when_leaf_is_a_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), b"x").unwrap();
        let err = mkdir_p(dir.path(), &ArchivePath::new("a").unwrap());
        assert!(err.is_err());
    }

    #[test]
    fn mkdirs_p_creates_a_batch() {
        let dir = tempdir().unwrap();
        let paths = ["a/b", "a/b/c", "a/d", ""]
            .iter()
            .map(|s| ArchivePath::new(s).unwrap())
            .collect::<Vec<_>>();
        mkdirs_p(dir.path(), &paths).unwrap();
        assert!(dir.path().join("a/b/c").is_dir());
        assert!(dir.path().join("a/d").is_dir());
    }

    #[test]
    fn rename_replaces_and_self_rename_is_noop() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"new").unwrap();
        fs::write(&b, b"old").unwrap();
        rename_file(&a, &b).unwrap();
        assert_eq!(fs::read(&b).unwrap(), b"new");
        assert!(!a.exists());

        rename_file(&b, &b).unwrap();
        assert_eq!(fs::read(&b).unwrap(), b"new");
    }

    #[test]
    fn set_timestamp_sets_mtime() {
        let dir = tempdir().unwrap();
        let f = dir.path().join("f");
        fs::write(&f, b"x").unwrap();
        set_timestamp(&f, 1_600_000_000).unwrap();
        let meta = fs::metadata(&f).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_600_000_000);
    }

    #[test]
    fn scoped_file_round_trip() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("f");
        {
            let mut f = File::open(&p, Mode::Write).unwrap();
            f.write(b"hello world", 5).unwrap();
            assert!(f.write(b"xy", 3).is_err());
        }
        let mut f = File::open(&p, Mode::Read).unwrap();
        assert_eq!(f.read_all().unwrap(), b"hello");
        assert!(f.write(b"x", 1).is_err());
    }
}
