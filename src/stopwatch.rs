//! Named-event stopwatch used for the engine and per-worker timings.
//!
//! Events are identified by name. Starting an event again overwrites the
//! previous start and clears any recorded end, so an event is either
//! "running" or "complete". Queries on incomplete events fail rather than
//! returning garbage.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};

#[derive(Debug, Default, Clone)]
pub struct StopWatch {
    starts: HashMap<String, Instant>,
    ends: HashMap<String, Instant>,
}

impl StopWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or restart) the named event.
    pub fn start(&mut self, name: &str) {
        self.ends.remove(name);
        self.starts.insert(name.to_string(), Instant::now());
    }

    /// End the named event. Fails if it was never started.
    pub fn stop(&mut self, name: &str) -> Result<()> {
        if !self.starts.contains_key(name) {
            bail!("stopwatch event {:?} stopped without being started", name);
        }
        self.ends.insert(name.to_string(), Instant::now());
        Ok(())
    }

    /// Time a closure under the named event. The event is stopped even when
    /// the closure fails.
    pub fn run<T>(&mut self, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.start(name);
        let out = f();
        self.stop(name)?;
        out
    }

    /// Elapsed time of a complete event.
    pub fn elapsed(&self, name: &str) -> Result<Duration> {
        match (self.starts.get(name), self.ends.get(name)) {
            (Some(start), Some(end)) => Ok(end.duration_since(*start)),
            _ => bail!("stopwatch event {:?} is not complete", name),
        }
    }

    pub fn milliseconds(&self, name: &str) -> Result<u128> {
        Ok(self.elapsed(name)?.as_millis())
    }

    pub fn seconds(&self, name: &str) -> Result<u64> {
        Ok(self.elapsed(name)?.as_secs())
    }

    pub fn minutes(&self, name: &str) -> Result<u64> {
        Ok(self.elapsed(name)?.as_secs() / 60)
    }

    /// Human formatting of a complete event, e.g. `2m5s`, `12s`, `3.250s`
    /// or `17ms`.
    pub fn human(&self, name: &str) -> Result<String> {
        Ok(human_duration(self.elapsed(name)?))
    }

}

/// Format a duration, switching representation exactly at the minute and
/// ten-second boundaries.
pub fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let minutes = secs / 60;
    if minutes > 0 {
        return format!("{}m{}s", minutes, secs % 60);
    }
    if secs > 0 {
        if secs >= 10 {
            return format!("{}s", secs);
        }
        return format!("{}.{:03}s", secs, d.subsec_millis());
    }
    format!("{}ms", d.as_millis())
}
