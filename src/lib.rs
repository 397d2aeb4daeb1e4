//! # punzip
//!
//! A multithreaded ZIP extractor.
//!
//! The archive is read fully into one shared buffer, the directory tree is
//! created up front, and the file entries are partitioned across a fixed
//! pool of worker threads by a pluggable distribution strategy. Each worker
//! opens its own archive handle over the shared buffer (the codec is not
//! assumed thread-safe per handle) and stages decompressed data through a
//! thread-local scratch buffer, so peak staging memory is
//! `jobs * chunk_size` regardless of archive size.
//!
//! ## Example
//!
//! ```no_run
//! use punzip::{UnzipOptions, p_unzip};
//!
//! fn main() -> anyhow::Result<()> {
//!     let opts = UnzipOptions {
//!         jobs: 4,
//!         strategy: "bytes".to_string(),
//!         ..Default::default()
//!     };
//!     let summary = p_unzip(std::path::Path::new("archive.zip"), &opts)?;
//!     println!("{} files, {} bytes", summary.files, summary.bytes);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod distribute;
pub mod engine;
pub mod fsx;
pub mod path;
pub mod stopwatch;
pub mod summary;
pub mod util;
pub mod zip;

pub use cli::Cli;
pub use engine::{DEFAULT_CHUNK, MAX_JOBS, TsPolicy, UnzipOptions, p_unzip, p_unzip_basic};
pub use path::ArchivePath;
pub use stopwatch::StopWatch;
pub use summary::UnzipSummary;
pub use zip::{Archive, ZipStat};
