//! Distribution strategies: partitioning the archive's file entries into
//! per-worker index lists.
//!
//! Every strategy is a plain function from `(jobs, files)` to exactly `jobs`
//! lists of archive indices, registered in the compile-time [`STRATEGIES`]
//! table and looked up by name. The [`distribute`] wrapper runs the chosen
//! strategy and then enforces the partition post-conditions: every file index
//! emitted exactly once. A violation is a bug in the strategy, so it is
//! fatal.
//!
//! All strategies are deterministic for a given input, including tie-breaks.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use anyhow::{Result, bail, ensure};

use crate::path::ArchivePath;
use crate::zip::ZipStat;

/// Per-worker lists of archive entry indices.
pub type IndexList = Vec<Vec<u64>>;

/// A distribution strategy: partition `files` into `jobs` index lists.
pub type StrategyFn = fn(usize, &[ZipStat]) -> IndexList;

/// Strategy used when the caller does not pick one.
pub const DEFAULT_STRATEGY: &str = "cyclic";

/// The registry. Names are what `-d` accepts.
pub const STRATEGIES: &[(&str, StrategyFn)] = &[
    ("cyclic", cyclic),
    ("sliced", sliced),
    ("bytes", bytes),
    ("runtime", runtime),
    ("folder_files", folder_files),
    ("folder_bytes", folder_bytes),
];

/// Look up a strategy by name.
pub fn lookup(name: &str) -> Option<StrategyFn> {
    STRATEGIES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, f)| *f)
}

/// All registered strategy names, in registration order.
pub fn strategy_names() -> Vec<&'static str> {
    STRATEGIES.iter().map(|(n, _)| *n).collect()
}

/// Run the named strategy and enforce the partition post-conditions.
pub fn distribute(name: &str, jobs: usize, files: &[ZipStat]) -> Result<IndexList> {
    ensure!(jobs >= 1, "at least one worker is required");
    let Some(strategy) = lookup(name) else {
        bail!(
            "strategy {:?} is invalid (expected one of: {})",
            name,
            strategy_names().join(", ")
        );
    };
    let lists = strategy(jobs, files);

    // Post-conditions. These hold for every correct strategy, so a failure
    // here is a bug, not bad user input.
    ensure!(
        lists.len() == jobs,
        "strategy {:?} produced {} lists for {} workers",
        name,
        lists.len(),
        jobs
    );
    let total: usize = lists.iter().map(Vec::len).sum();
    ensure!(
        total == files.len(),
        "strategy {:?} assigned {} files out of {}",
        name,
        total,
        files.len()
    );
    let mut seen = HashSet::with_capacity(total);
    for idx in lists.iter().flatten() {
        ensure!(
            seen.insert(*idx),
            "strategy {:?} assigned entry {} twice",
            name,
            idx
        );
    }
    Ok(lists)
}

/// Index of the smallest total, lowest index winning ties.
fn argmin(totals: &[u64]) -> usize {
    let mut best = 0;
    for (i, &t) in totals.iter().enumerate() {
        if t < totals[best] {
            best = i;
        }
    }
    best
}

/// Assign the `k`th file to worker `k mod jobs`, in input order.
fn cyclic(jobs: usize, files: &[ZipStat]) -> IndexList {
    let mut lists = vec![Vec::new(); jobs];
    for (k, zs) in files.iter().enumerate() {
        lists[k % jobs].push(zs.index());
    }
    lists
}

/// Sort by name and hand each worker one contiguous slice, so files of the
/// same directory mostly land on the same worker. The few files left over
/// when the count does not divide evenly are dealt out cyclically.
fn sliced(jobs: usize, files: &[ZipStat]) -> IndexList {
    let mut stats: Vec<&ZipStat> = files.iter().collect();
    stats.sort_by(|l, r| l.name().cmp(r.name()));

    let mut lists = vec![Vec::new(); jobs];
    let chunk = (stats.len() / jobs).max(1);
    let residual = stats.len() % jobs;
    let sliced_end = stats.len() - residual;

    for (k, zs) in stats.iter().enumerate() {
        let worker = if k < sliced_end { k / chunk } else { k % jobs };
        lists[worker].push(zs.index());
    }
    lists
}

/// Greedy balance: sort by size descending, then always give the next file
/// to the worker with the smallest running weight.
fn greedy_by_weight(jobs: usize, files: &[ZipStat], weight: fn(&ZipStat) -> u64) -> IndexList {
    let mut stats: Vec<&ZipStat> = files.iter().collect();
    // Largest first; distributing the big files early leaves the small ones
    // to even out the totals.
    stats.sort_by_key(|zs| Reverse(zs.size()));

    let mut lists = vec![Vec::new(); jobs];
    let mut totals = vec![0u64; jobs];
    for zs in stats {
        let worker = argmin(&totals);
        lists[worker].push(zs.index());
        totals[worker] += weight(zs);
    }
    lists
}

/// Balance the uncompressed byte count per worker.
fn bytes(jobs: usize, files: &[ZipStat]) -> IndexList {
    greedy_by_weight(jobs, files, ZipStat::size)
}

/// Weights estimating per-file fixed cost against per-byte cost. The
/// constants are calibration-dependent.
const RUNTIME_SIZE_WEIGHT: u64 = 1;
const RUNTIME_FILE_WEIGHT: u64 = 5_000_000;

/// Balance an estimated runtime per worker: a weighted sum of file count
/// and byte count.
fn runtime(jobs: usize, files: &[ZipStat]) -> IndexList {
    greedy_by_weight(jobs, files, |zs| {
        RUNTIME_SIZE_WEIGHT * zs.size() + RUNTIME_FILE_WEIGHT
    })
}

/// Keep each folder's files on one worker while balancing the per-file
/// metric: group by folder, order folders by total metric descending, and
/// give each whole folder to the least-loaded worker.
fn by_folder(jobs: usize, files: &[ZipStat], metric: fn(&ZipStat) -> u64) -> IndexList {
    let mut folders: BTreeMap<ArchivePath, (Vec<u64>, u64)> = BTreeMap::new();
    for zs in files {
        let entry = folders.entry(zs.folder_path()).or_default();
        entry.0.push(zs.index());
        entry.1 += metric(zs);
    }

    // Stable sort on the metric keeps equal folders in name order, so the
    // assignment is deterministic.
    let mut groups: Vec<(Vec<u64>, u64)> = folders.into_values().collect();
    groups.sort_by_key(|(_, total)| Reverse(*total));

    let mut lists = vec![Vec::new(); jobs];
    let mut totals = vec![0u64; jobs];
    for (idxs, total) in groups {
        let worker = argmin(&totals);
        lists[worker].extend(idxs);
        totals[worker] += total;
    }
    lists
}

/// Whole folders, balanced by file count.
fn folder_files(jobs: usize, files: &[ZipStat]) -> IndexList {
    by_folder(jobs, files, |_| 1)
}

/// Whole folders, balanced by uncompressed bytes.
fn folder_bytes(jobs: usize, files: &[ZipStat]) -> IndexList {
    by_folder(jobs, files, ZipStat::size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(entries: &[(u64, &str, u64)]) -> Vec<ZipStat> {
        entries
            .iter()
            .map(|&(index, name, size)| ZipStat::for_tests(index, name, size))
            .collect()
    }

    #[test]
    fn registry_knows_all_strategies() {
        for name in [
            "cyclic",
            "sliced",
            "bytes",
            "runtime",
            "folder_files",
            "folder_bytes",
        ] {
            assert!(lookup(name).is_some(), "missing strategy {name}");
        }
        assert!(lookup("folder").is_none());
        assert_eq!(DEFAULT_STRATEGY, "cyclic");
    }

    #[test]
    fn unknown_strategy_is_fatal() {
        let err = distribute("nope", 2, &[]).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn cyclic_distributes_modulo() {
        let files = stats(&[
            (10, "a", 1),
            (11, "b", 1),
            (12, "c", 1),
            (13, "d", 1),
            (14, "e", 1),
        ]);
        let lists = distribute("cyclic", 3, &files).unwrap();
        assert_eq!(lists, vec![vec![10, 13], vec![11, 14], vec![12]]);
    }

    #[test]
    fn sliced_respects_sort() {
        let files = stats(&[
            (0, "a/1", 1),
            (1, "a/2", 1),
            (2, "b/1", 1),
            (3, "b/2", 1),
            (4, "c/1", 1),
        ]);
        let lists = distribute("sliced", 2, &files).unwrap();
        assert_eq!(lists, vec![vec![0, 1, 4], vec![2, 3]]);
    }

    #[test]
    fn sliced_sorts_unsorted_input() {
        let files = stats(&[(0, "z", 1), (1, "a", 1), (2, "m", 1), (3, "b", 1)]);
        let lists = distribute("sliced", 2, &files).unwrap();
        // Sorted order is a, b, m, z; two per worker.
        assert_eq!(lists, vec![vec![1, 3], vec![2, 0]]);
    }

    #[test]
    fn bytes_balances_by_greedy_argmin() {
        let files = stats(&[
            (0, "a", 100),
            (1, "b", 90),
            (2, "c", 50),
            (3, "d", 40),
            (4, "e", 20),
        ]);
        let lists = distribute("bytes", 2, &files).unwrap();
        // 100->w0, 90->w1, 50->w1 (140), 40->w0 (140), 20 ties -> w0 (160).
        assert_eq!(lists, vec![vec![0, 3, 4], vec![1, 2]]);
    }

    #[test]
    fn runtime_weights_file_count() {
        // Equal sizes: the per-file constant dominates, so the files are
        // dealt out one per worker in turn.
        let files = stats(&[(0, "a", 10), (1, "b", 10), (2, "c", 10), (3, "d", 10)]);
        let lists = distribute("runtime", 2, &files).unwrap();
        assert_eq!(lists.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2]);
    }

    #[test]
    fn folder_files_keeps_folders_whole() {
        let files = stats(&[
            (0, "a/x", 1),
            (1, "a/y", 1),
            (2, "a/z", 1),
            (3, "b/x", 1),
            (4, "b/y", 1),
            (5, "c/x", 1),
        ]);
        let lists = distribute("folder_files", 2, &files).unwrap();
        assert_eq!(lists, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn folder_bytes_balances_folder_sizes() {
        let files = stats(&[
            (0, "big/x", 1000),
            (1, "small/a", 10),
            (2, "small/b", 10),
        ]);
        let lists = distribute("folder_bytes", 2, &files).unwrap();
        assert_eq!(lists, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn every_strategy_partitions_exactly() {
        let files = stats(&[
            (3, "d/1", 5),
            (7, "d/2", 500),
            (9, "e/1", 50),
            (11, "f/1", 0),
            (12, "f/2", 5),
            (20, "f/3", 5000),
            (21, "g", 1),
        ]);
        for (name, _) in STRATEGIES {
            for jobs in [1, 2, 3, 7, 10] {
                let lists = distribute(name, jobs, &files).unwrap();
                assert_eq!(lists.len(), jobs, "{name} with {jobs} workers");
                let mut all: Vec<u64> = lists.into_iter().flatten().collect();
                all.sort_unstable();
                assert_eq!(all, vec![3, 7, 9, 11, 12, 20, 21], "{name} with {jobs} workers");
            }
        }
    }

    #[test]
    fn empty_input_yields_empty_lists() {
        for (name, _) in STRATEGIES {
            let lists = distribute(name, 3, &[]).unwrap();
            assert_eq!(lists, vec![Vec::<u64>::new(); 3]);
        }
    }

    #[test]
    fn strategies_are_deterministic() {
        let files = stats(&[
            (0, "a/x", 7),
            (1, "b/x", 7),
            (2, "c/x", 7),
            (3, "d/x", 7),
        ]);
        for (name, _) in STRATEGIES {
            let a = distribute(name, 3, &files).unwrap();
            let b = distribute(name, 3, &files).unwrap();
            assert_eq!(a, b, "{name} not deterministic");
        }
    }
}
