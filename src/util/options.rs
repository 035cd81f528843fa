//! Runtime-tunable knobs, read from `STOPGC_*` environment variables at
//! [`crate::Heap::new`] time. There is no hot-reload: options are
//! snapshotted once at `gc_init` and read thereafter without locking.

use crate::util::constants::{BYTES_IN_WORD, DEFAULT_COLLECT_INTERVAL, DEFAULT_MAX_TOTAL_MEMORY};
use std::str::FromStr;
use strum_macros::EnumString;

/// Which sweep to run after a mark phase completes.
#[derive(Copy, Clone, Eq, PartialEq, Debug, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum SweepMode {
    /// Only touch pages with `has_young`; `OldMarked` survives as `Old`
    /// only when newly promoted.
    Quick,
    /// Touch every page; demote every `OldMarked` to `Old`.
    Full,
}

/// The three collection modes an embedder (or the heuristics) can ask
/// the driver to run.
#[derive(Copy, Clone, Eq, PartialEq, Debug, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum CollectMode {
    Auto,
    Full,
    Incremental,
}

/// Snapshot of collector configuration.
#[derive(Clone, Debug)]
pub struct Options {
    /// Bytes allocated between automatic collections; adapted by the
    /// heuristics in `plan::driver` after every cycle.
    pub collect_interval: usize,
    /// Hard ceiling `collect_interval` is clamped to before a full
    /// collection is forced.
    pub max_collect_interval: usize,
    /// Heap byte budget; a full collection is forced and the interval
    /// held at its minimum once live bytes exceed this.
    pub max_total_memory: usize,
    /// Print one line of stats after every collection.
    pub verbose_gc: bool,
    /// Disable the page cache entirely: every freed page is returned to
    /// the OS immediately. Useful under a sanitizer or in tests that
    /// want deterministic page reuse.
    pub disable_page_cache: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            collect_interval: DEFAULT_COLLECT_INTERVAL,
            max_collect_interval: crate::util::constants::MAX_COLLECT_INTERVAL,
            max_total_memory: clamp_to_free_memory(DEFAULT_MAX_TOTAL_MEMORY),
            verbose_gc: false,
            disable_page_cache: false,
        }
    }
}

impl Options {
    /// Build options from `STOPGC_*` environment variables, falling
    /// back to [`Options::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut opts = Options::default();
        if let Some(v) = read_env("STOPGC_COLLECT_INTERVAL") {
            opts.collect_interval = v;
        }
        if let Some(v) = read_env("STOPGC_MAX_COLLECT_INTERVAL") {
            opts.max_collect_interval = v;
        }
        if let Some(v) = read_env("STOPGC_MAX_HEAP_SIZE") {
            opts.max_total_memory = v;
        }
        if let Ok(v) = std::env::var("STOPGC_VERBOSE") {
            opts.verbose_gc = v != "0";
        }
        if let Ok(v) = std::env::var("STOPGC_DISABLE_PAGE_CACHE") {
            opts.disable_page_cache = v != "0";
        }
        opts
    }
}

fn read_env(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|s| usize::from_str(&s).ok())
}

/// Clamp `requested` to 70% of currently-free system RAM, as measured
/// at startup. Bindings that embed this collector in a container with a
/// tight cgroup limit rely on this to avoid being OOM-killed by a
/// default that assumes the whole machine.
fn clamp_to_free_memory(requested: usize) -> usize {
    use sysinfo::System;
    let mut sys = System::new();
    sys.refresh_memory();
    let free_bytes = sys.available_memory() as usize;
    if free_bytes == 0 {
        // No sysinfo backend on this platform; trust the caller.
        return requested;
    }
    let budget = (free_bytes / 10) * 7;
    requested.min(budget).max(64 * BYTES_IN_WORD * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let opts = Options::default();
        assert!(opts.collect_interval > 0);
        assert!(opts.max_total_memory >= opts.collect_interval);
    }

    #[test]
    fn sweep_mode_parses_case_insensitively() {
        assert_eq!("full".parse::<SweepMode>().unwrap(), SweepMode::Full);
        assert_eq!("QUICK".parse::<SweepMode>().unwrap(), SweepMode::Quick);
    }
}
