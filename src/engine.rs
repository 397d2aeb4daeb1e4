//! The parallel extraction engine.
//!
//! [`p_unzip`] drives the whole run: load the archive into one shared
//! buffer, split folder entries from file entries, pre-create the complete
//! directory tree, partition the files across workers with the chosen
//! strategy, then launch exactly `jobs` threads and join them all.
//!
//! The concurrency discipline is deliberately simple. The decompression
//! codec is not assumed to be thread-safe at the handle level, so every
//! worker opens its own [`Archive`] over the shared read-only buffer and
//! owns its scratch buffer outright; directories are created strictly
//! before any worker starts, so workers never race on the directory tree.
//! Peak staging memory is `jobs * chunk_size`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use anyhow::{Context, Result, bail, ensure};
use log::{debug, warn};

use crate::distribute::{self, DEFAULT_STRATEGY};
use crate::fsx;
use crate::path::ArchivePath;
use crate::stopwatch::StopWatch;
use crate::summary::UnzipSummary;
use crate::util::ext3;
use crate::zip::Archive;

/// Upper bound on `-j`.
pub const MAX_JOBS: usize = 64;

/// Default size of each worker's scratch buffer, in bytes.
pub const DEFAULT_CHUNK: u64 = 4096;

/// Serializes the per-file progress lines so concurrent workers never
/// interleave within a line.
static LOG_LINE_MTX: Mutex<()> = Mutex::new(());

/// What to do with each extracted file's modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TsPolicy {
    /// Use the timestamp archived in the ZIP, as-is (no timezone applied).
    #[default]
    Archived,
    /// Leave the filesystem's own (current) timestamp untouched.
    Current,
    /// Stamp every file with one fixed epoch time.
    Fixed(i64),
}

impl TsPolicy {
    /// Map an archived mtime to the mtime to set; 0 means "do not set".
    pub fn apply(self, archived: i64) -> i64 {
        match self {
            TsPolicy::Archived => archived,
            TsPolicy::Current => 0,
            TsPolicy::Fixed(t) => t,
        }
    }
}

/// Knobs for one [`p_unzip`] run.
#[derive(Debug, Clone)]
pub struct UnzipOptions {
    /// Worker thread count, `1..=MAX_JOBS`.
    pub jobs: usize,
    /// Suppress the per-file progress lines.
    pub quiet: bool,
    /// Directory every extracted path is joined under. Created if missing;
    /// empty means the current directory.
    pub out_prefix: PathBuf,
    /// Distribution strategy name.
    pub strategy: String,
    /// Scratch buffer size in bytes; 0 means "size of the largest entry".
    pub chunk_size: u64,
    /// Timestamp policy for extracted files.
    pub ts_policy: TsPolicy,
    /// Extract through short-extension temp names, then rename.
    pub short_exts: bool,
}

impl Default for UnzipOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            quiet: false,
            out_prefix: PathBuf::new(),
            strategy: DEFAULT_STRATEGY.to_string(),
            chunk_size: DEFAULT_CHUNK,
            ts_policy: TsPolicy::Archived,
            short_exts: false,
        }
    }
}

/// Shorten a long extension to three stable characters.
///
/// Some filesystems (notably under certain anti-virus products) create
/// files with extensions longer than three characters measurably slower, so
/// extraction can go through a shortened temp name and a final rename.
/// Names starting with a dot, names without an extension and extensions of
/// up to three characters pass through unchanged.
fn short_ext_name(path: &ArchivePath) -> ArchivePath {
    let Ok(base) = path.basename() else {
        return path.clone();
    };
    if base.starts_with('.') {
        return path.clone();
    }
    let Some((stem, ext)) = path.split_ext() else {
        return path.clone();
    };
    if ext.len() <= 3 {
        return path.clone();
    }
    stem.add_ext(&ext3(&ext))
}

/// The temp-name function handed to every worker. Pure and thread-safe;
/// the identity when the optimization is off.
#[derive(Debug, Clone, Copy)]
pub struct TmpNamer {
    enabled: bool,
}

impl TmpNamer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn apply(&self, path: &ArchivePath) -> ArchivePath {
        if self.enabled {
            short_ext_name(path)
        } else {
            path.clone()
        }
    }
}

/// Everything a worker reports back. Failures stay inside `result`; they
/// never cross the thread boundary as panics.
struct WorkerOutput {
    files: u64,
    bytes: u64,
    tmp_files: u64,
    watch: StopWatch,
    result: Result<()>,
}

/// Per-thread extraction loop wrapper: times the run and catches every
/// failure into the output record.
#[allow(clippy::too_many_arguments)]
fn unzip_worker(
    thread_idx: usize,
    buffer: &Arc<Vec<u8>>,
    idxs: &[u64],
    chunk_size: u64,
    quiet: bool,
    ts_policy: TsPolicy,
    tmp_namer: TmpNamer,
    out_prefix: &Path,
) -> WorkerOutput {
    let mut out = WorkerOutput {
        files: 0,
        bytes: 0,
        tmp_files: 0,
        watch: StopWatch::new(),
        result: Ok(()),
    };
    out.watch.start("unzip");
    let result = worker_loop(
        thread_idx, buffer, idxs, chunk_size, quiet, ts_policy, tmp_namer, out_prefix, &mut out,
    );
    if let Err(e) = &result {
        warn!("worker {} failed: {:#}", thread_idx, e);
    }
    out.result = result;
    // The event was started above, so this cannot fail.
    let _ = out.watch.stop("unzip");
    out
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    thread_idx: usize,
    buffer: &Arc<Vec<u8>>,
    idxs: &[u64],
    chunk_size: u64,
    quiet: bool,
    ts_policy: TsPolicy,
    tmp_namer: TmpNamer,
    out_prefix: &Path,
    out: &mut WorkerOutput,
) -> Result<()> {
    // Own archive handle per worker; only the buffer refcount is shared.
    let archive = Archive::new(Arc::clone(buffer))?;
    let mut scratch = vec![0u8; chunk_size as usize];

    for &idx in idxs {
        let stat = archive.at(idx)?;
        let size = stat.size();

        if !quiet {
            let _guard = LOG_LINE_MTX.lock().unwrap_or_else(PoisonError::into_inner);
            println!("{}> {}", thread_idx, stat.name());
        }

        let path = stat.path();
        let tmp = tmp_namer.apply(path);
        if tmp != *path {
            out.tmp_files += 1;
        }

        let dest = path.to_fs_path(out_prefix);
        let tmp_dest = tmp.to_fs_path(out_prefix);
        archive.extract_to(idx, &tmp_dest, &mut scratch)?;
        fsx::rename_file(&tmp_dest, &dest)?;

        let t = ts_policy.apply(stat.mtime());
        if t != 0 {
            fsx::set_timestamp(&dest, t)?;
        }

        out.files += 1;
        out.bytes += size;
    }
    Ok(())
}

/// Extract `filename` in parallel.
///
/// Fails on bad input, on any I/O or codec error, if any worker fails, and
/// if the aggregate counters do not reconcile with the archive's stats.
/// Partially extracted files are left in place on failure.
pub fn p_unzip(filename: &Path, opts: &UnzipOptions) -> Result<UnzipSummary> {
    ensure!(
        (1..=MAX_JOBS).contains(&opts.jobs),
        "invalid number of jobs: {} (expected 1..={})",
        opts.jobs,
        MAX_JOBS
    );

    let mut res = UnzipSummary::new(opts.jobs);
    res.filename = filename.to_path_buf();
    res.strategy = opts.strategy.clone();

    res.watch.start("total");

    // Read the whole archive into one buffer. Workers share it by
    // refcount, each behind its own archive handle.
    res.watch.start("load_zip");
    let data = fsx::File::open(filename, fsx::Mode::Read)?.read_all()?;
    let buffer = Arc::new(data);
    let archive = Archive::new(Arc::clone(&buffer))
        .with_context(|| format!("failed to open {}", filename.display()))?;

    // Stable partition: folder entries ahead of file entries.
    let mut folders = Vec::new();
    let mut files = Vec::new();
    for zs in archive.iter() {
        if zs.is_folder() {
            folders.push(zs.clone());
        } else {
            files.push(zs.clone());
        }
    }
    let max_size = archive.iter().map(|zs| zs.size()).max().unwrap_or(0);
    res.watch.stop("load_zip")?;

    debug!(
        "{}: {} folders, {} files, largest entry {} bytes",
        filename.display(),
        folders.len(),
        files.len(),
        max_size
    );

    // A chunk size of zero means "largest entry". An archive of only empty
    // entries is the one case where zero is allowed to stand.
    let chunk_size = if opts.chunk_size == 0 {
        max_size
    } else {
        opts.chunk_size
    };
    ensure!(max_size == 0 || chunk_size > 0, "invalid chunk size");
    res.chunk_size = chunk_size;

    let tmp_namer = if opts.short_exts {
        res.watch.run("short_exts", || Ok(TmpNamer::new(true)))?
    } else {
        TmpNamer::new(false)
    };

    // Pre-create every folder mentioned in the archive, explicitly as a
    // folder entry or implicitly as a file's parent. This must complete
    // before any worker starts: workers never create directories.
    if !opts.out_prefix.as_os_str().is_empty() {
        std::fs::create_dir_all(&opts.out_prefix).with_context(|| {
            format!("failed to create {}", opts.out_prefix.display())
        })?;
    }
    let fps: Vec<ArchivePath> = archive.iter().map(|zs| zs.folder_path()).collect();
    res.watch
        .run("folders", || fsx::mkdirs_p(&opts.out_prefix, &fps))?;

    // Fixed assignment per worker; no work stealing.
    let thread_idxs = res.watch.run("distribute", || {
        distribute::distribute(&opts.strategy, opts.jobs, &files)
    })?;

    res.watch.start("unzip");
    let quiet = opts.quiet;
    let ts_policy = opts.ts_policy;
    let out_prefix = opts.out_prefix.as_path();
    let joined: Vec<thread::Result<WorkerOutput>> = thread::scope(|scope| {
        let handles: Vec<_> = thread_idxs
            .iter()
            .enumerate()
            .map(|(i, idxs)| {
                let buffer = &buffer;
                scope.spawn(move || {
                    unzip_worker(
                        i, buffer, idxs, chunk_size, quiet, ts_policy, tmp_namer, out_prefix,
                    )
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });
    res.watch.stop("unzip")?;
    res.watch.stop("total")?;

    let mut outputs = Vec::with_capacity(opts.jobs);
    for (i, joined) in joined.into_iter().enumerate() {
        match joined {
            Ok(out) => outputs.push(out),
            Err(_) => bail!("worker {} panicked", i),
        }
    }

    for (job, out) in outputs.into_iter().enumerate() {
        out.result.with_context(|| format!("worker {} failed", job))?;
        res.files += out.files;
        res.bytes += out.bytes;
        res.num_temp_names += out.tmp_files;
        res.files_per_worker[job] = out.files;
        res.bytes_per_worker[job] = out.bytes;
        res.watches[job] = out.watch;
    }
    res.folders = folders.len() as u64;

    // The counters came from the workers, not from the archive, so these
    // reconciliations catch both distribution and extraction bugs.
    ensure!(
        res.files == files.len() as u64,
        "extracted {} files, expected {}",
        res.files,
        files.len()
    );
    let bytes_in_zip: u64 = files.iter().map(|zs| zs.size()).sum();
    ensure!(
        res.bytes == bytes_in_zip,
        "extracted {} bytes, expected {}",
        res.bytes,
        bytes_in_zip
    );

    Ok(res)
}

/// [`p_unzip`] with the common defaults: quiet, cyclic distribution,
/// default chunk size, archived timestamps.
pub fn p_unzip_basic(filename: &Path, jobs: usize) -> Result<()> {
    let opts = UnzipOptions {
        jobs,
        quiet: true,
        ..Default::default()
    };
    p_unzip(filename, &opts).map(|_| ())
}
