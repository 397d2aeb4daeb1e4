//! Aggregate counters and timings returned by the extraction engine.

use std::fmt;
use std::path::PathBuf;

use crate::stopwatch::StopWatch;
use crate::util::format_size;

/// Diagnostic record of one extraction run.
///
/// Totals are accumulated from the per-worker outputs after join and cross
/// checked against the archive's own stats, so they double as a sanity
/// check on the distribution.
#[derive(Debug, Default)]
pub struct UnzipSummary {
    /// Archive that was extracted.
    pub filename: PathBuf,
    /// Number of worker threads used.
    pub jobs: usize,
    /// Name of the distribution strategy used.
    pub strategy: String,
    /// Chunk size after resolution (a `max` request becomes concrete here).
    pub chunk_size: u64,
    /// Total files extracted.
    pub files: u64,
    /// Total folder entries in the archive.
    pub folders: u64,
    /// Files that went through a shortened temp name.
    pub num_temp_names: u64,
    /// Total uncompressed bytes written.
    pub bytes: u64,
    /// Files extracted by each worker.
    pub files_per_worker: Vec<u64>,
    /// Bytes written by each worker.
    pub bytes_per_worker: Vec<u64>,
    /// Engine-level timings.
    pub watch: StopWatch,
    /// Per-worker timings.
    pub watches: Vec<StopWatch>,
}

impl UnzipSummary {
    pub fn new(jobs: usize) -> Self {
        Self {
            jobs,
            files_per_worker: vec![0; jobs],
            bytes_per_worker: vec![0; jobs],
            watches: vec![StopWatch::new(); jobs],
            ..Self::default()
        }
    }
}

/// Engine timing events, in the order they are reported.
const ENGINE_EVENTS: &[&str] = &[
    "load_zip",
    "folders",
    "distribute",
    "short_exts",
    "unzip",
    "total",
];

impl fmt::Display for UnzipSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "archive:    {}", self.filename.display())?;
        writeln!(f, "jobs:       {}", self.jobs)?;
        writeln!(f, "strategy:   {}", self.strategy)?;
        writeln!(f, "chunk size: {}", self.chunk_size)?;
        writeln!(f, "files:      {}", self.files)?;
        writeln!(f, "folders:    {}", self.folders)?;
        writeln!(f, "temp names: {}", self.num_temp_names)?;
        writeln!(f, "bytes:      {} ({})", format_size(self.bytes), self.bytes)?;

        writeln!(f, "{:>6}  {:>8}  {:>12}  {:>8}", "worker", "files", "bytes", "time")?;
        for i in 0..self.jobs {
            let time = self.watches[i]
                .human("unzip")
                .unwrap_or_else(|_| "-".to_string());
            writeln!(
                f,
                "{:>6}  {:>8}  {:>12}  {:>8}",
                i,
                self.files_per_worker[i],
                format_size(self.bytes_per_worker[i]),
                time
            )?;
        }

        writeln!(f, "timings:")?;
        for name in ENGINE_EVENTS {
            if let Ok(human) = self.watch.human(name) {
                writeln!(f, "  {:<11} {}", name, human)?;
            }
        }
        Ok(())
    }
}
