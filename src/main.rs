//! Main entry point for the punzip CLI.
//!
//! Parses the command line, then either lists the archive or runs the
//! parallel extraction engine, printing the diagnostic summary when asked.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::process;
use std::sync::Arc;

use punzip::zip::Archive;
use punzip::{Cli, UnzipOptions, fsx, p_unzip};

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // -h and -V land here too; only real usage errors exit non-zero.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    if let Err(e) = run(&cli) {
        eprintln!("punzip: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    if cli.list {
        return list_files(&cli.file);
    }

    let opts = UnzipOptions {
        jobs: cli.jobs,
        quiet: cli.quiet,
        out_prefix: cli.out_prefix.clone().unwrap_or_default(),
        strategy: cli.strategy.clone(),
        chunk_size: cli.chunk_size,
        ts_policy: cli.ts_policy(),
        short_exts: cli.short_exts,
    };

    let summary = p_unzip(&cli.file, &opts)?;

    // The summary is emitted only on success; failures surface above.
    if cli.diagnostics {
        eprint!("{}", summary);
    }
    Ok(())
}

/// Print the archive's contents as a table, without extracting anything.
fn list_files(path: &Path) -> Result<()> {
    let data = fsx::File::open(path, fsx::Mode::Read)?.read_all()?;
    let archive = Archive::new(Arc::new(data))?;

    println!(
        "{:>10}  {:>10}  {:>5}  {:>16}  Name",
        "Length", "Size", "Cmpr", "Modified"
    );
    println!("{}", "-".repeat(70));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for stat in archive.iter() {
        println!(
            "{:>10}  {:>10}  {}  {:>16}  {}",
            stat.size(),
            stat.comp_size(),
            ratio(stat.comp_size(), stat.size()),
            modified(stat.mtime()),
            stat.name()
        );
        if !stat.is_folder() {
            total_uncompressed += stat.size();
            total_compressed += stat.comp_size();
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>16}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    );
    Ok(())
}

/// Compression ratio as percentage saved.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Archived modification time, rendered to the minute.
fn modified(epoch: i64) -> String {
    let dt = time::OffsetDateTime::from_unix_timestamp(epoch)
        .unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}",
        dt.year(),
        dt.month() as u8,
        dt.day(),
        dt.hour(),
        dt.minute()
    )
}
