use clap::Parser;
use std::path::PathBuf;

use crate::distribute::DEFAULT_STRATEGY;
use crate::engine::{DEFAULT_CHUNK, MAX_JOBS, TsPolicy};

#[derive(Parser, Debug)]
#[command(name = "punzip")]
#[command(version)]
#[command(about = "A multithreaded unzip utility", long_about = None)]
#[command(after_help = "Examples:\n  \
  punzip archive.zip                 extract with a single worker\n  \
  punzip -j max -d bytes big.zip     one worker per hardware thread, byte-balanced\n  \
  punzip -j 4 -o out -g data.zip     extract into out/ and print diagnostics\n  \
  punzip -l data.zip                 list the archive without extracting")]
pub struct Cli {
    /// ZIP file path
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Quiet mode: suppress per-file lines
    #[arg(short = 'q')]
    pub quiet: bool,

    /// Print a diagnostic summary to stderr on success
    #[arg(short = 'g')]
    pub diagnostics: bool,

    /// List archive contents instead of extracting
    #[arg(short = 'l')]
    pub list: bool,

    /// Worker threads: a count, "max" (hardware threads) or "auto" (75% of them)
    #[arg(short = 'j', value_name = "JOBS", default_value_t = 1, value_parser = parse_jobs)]
    pub jobs: usize,

    /// Distribution strategy
    #[arg(short = 'd', value_name = "STRATEGY", default_value = DEFAULT_STRATEGY)]
    pub strategy: String,

    /// Chunk size in bytes, or "max" to match the largest entry
    #[arg(short = 'c', value_name = "BYTES", default_value_t = DEFAULT_CHUNK, value_parser = parse_chunk)]
    pub chunk_size: u64,

    /// Timestamp policy: "current" keeps the extraction-time stamps, an
    /// integer stamps that fixed epoch time, default uses archived times
    #[arg(short = 't', value_name = "POLICY")]
    pub timestamps: Option<String>,

    /// Output directory prefix (created if missing)
    #[arg(short = 'o', value_name = "PREFIX")]
    pub out_prefix: Option<PathBuf>,

    /// Extract through short-extension temp names, then rename
    #[arg(short = 'a')]
    pub short_exts: bool,
}

impl Cli {
    /// The timestamp policy implied by `-t`.
    pub fn ts_policy(&self) -> TsPolicy {
        match self.timestamps.as_deref() {
            None => TsPolicy::Archived,
            Some("current") => TsPolicy::Current,
            Some(v) => v
                .parse::<i64>()
                .map(TsPolicy::Fixed)
                .unwrap_or(TsPolicy::Archived),
        }
    }
}

/// Parse `-j`: a positive count, or `max`/`auto` derived from the hardware
/// thread count, always bounded by [`MAX_JOBS`].
fn parse_jobs(s: &str) -> Result<usize, String> {
    let hw = num_cpus::get();
    match s {
        "max" => Ok(hw.clamp(1, MAX_JOBS)),
        "auto" => Ok((((hw as f64) * 0.75).round() as usize).clamp(1, MAX_JOBS)),
        _ => {
            let jobs = s
                .parse::<usize>()
                .map_err(|_| format!("invalid number of jobs: {s:?}"))?;
            if (1..=MAX_JOBS).contains(&jobs) {
                Ok(jobs)
            } else {
                Err(format!("jobs must be between 1 and {MAX_JOBS}"))
            }
        }
    }
}

/// Parse `-c`: a positive byte count, or `max` (encoded as 0 for the
/// engine, which resolves it to the largest entry size).
fn parse_chunk(s: &str) -> Result<u64, String> {
    if s == "max" {
        return Ok(0);
    }
    let chunk = s
        .parse::<u64>()
        .map_err(|_| format!("invalid chunk size: {s:?}"))?;
    if chunk == 0 {
        return Err("chunk size must be positive".to_string());
    }
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_parsing() {
        assert_eq!(parse_jobs("1").unwrap(), 1);
        assert_eq!(parse_jobs("64").unwrap(), 64);
        assert!(parse_jobs("0").is_err());
        assert!(parse_jobs("65").is_err());
        assert!(parse_jobs("four").is_err());

        let max = parse_jobs("max").unwrap();
        assert!((1..=MAX_JOBS).contains(&max));
        let auto = parse_jobs("auto").unwrap();
        assert!((1..=max.max(1)).contains(&auto));
    }

    #[test]
    fn chunk_parsing() {
        assert_eq!(parse_chunk("4096").unwrap(), 4096);
        assert_eq!(parse_chunk("max").unwrap(), 0);
        assert!(parse_chunk("0").is_err());
        assert!(parse_chunk("lots").is_err());
    }

    #[test]
    fn ts_policy_from_flag() {
        let parse = |args: &[&str]| Cli::try_parse_from(args.iter().copied()).unwrap();
        assert_eq!(parse(&["punzip", "a.zip"]).ts_policy(), TsPolicy::Archived);
        assert_eq!(
            parse(&["punzip", "-t", "current", "a.zip"]).ts_policy(),
            TsPolicy::Current
        );
        assert_eq!(
            parse(&["punzip", "-t", "1600000000", "a.zip"]).ts_policy(),
            TsPolicy::Fixed(1_600_000_000)
        );
        // Anything unrecognized falls back to the archived times.
        assert_eq!(
            parse(&["punzip", "-t", "local", "a.zip"]).ts_policy(),
            TsPolicy::Archived
        );
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["punzip", "a.zip"]).unwrap();
        assert_eq!(cli.jobs, 1);
        assert_eq!(cli.strategy, "cyclic");
        assert_eq!(cli.chunk_size, DEFAULT_CHUNK);
        assert!(!cli.quiet && !cli.diagnostics && !cli.short_exts && !cli.list);
        assert!(cli.out_prefix.is_none());
    }

    #[test]
    fn requires_the_archive_argument() {
        assert!(Cli::try_parse_from(["punzip"]).is_err());
    }
}
