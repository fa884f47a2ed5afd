//! # Bankhammer binaries
//!
//! Shared setup for the three Bankhammer tools:
//!
//! - `hammer`: sweeps a buffer with double-sided Rowhammer on every row.
//! - `classify`: partitions the rows of a buffer into banks by timing and verifies the result.
//! - `calibrate`: prints a latency histogram for choosing the classifier thresholds.
//!
//! ## Quickstart guide
//!
//! ```sh
//! cargo build --release
//! sudo target/release/calibrate --size 64M
//! sudo target/release/hammer --size 1G --hugepage
//!```
//!
//! Translation reads `/proc/self/pagemap`, so every tool needs root. Settings come from
//! `config/bankhammer.json` when it exists; every field is optional.

#[macro_use]
extern crate log;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use bankhammer_core::HammerConfig;
use bankhammer_core::memory::Memory;
use bankhammer_core::util::Size;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use serde::Serialize;

/// Initializes `env_logger` (default filter `info`) behind a progress bar aware writer.
pub fn init_logging_with_progress() -> anyhow::Result<MultiProgress> {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    let progress = MultiProgress::new();
    LogWrapper::new(progress.clone(), logger).try_init()?;
    Ok(progress)
}

/// Loads the run configuration from `path`, falling back to the defaults if it does not exist.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<HammerConfig> {
    let path = path.as_ref();
    if !path.exists() {
        info!("{} not found, using default configuration", path.display());
        return Ok(HammerConfig::default());
    }
    let config = HammerConfig::from_jsonfile(path)
        .with_context(|| format!("loading {}", path.display()))?;
    debug!("Configuration: {:?}", config);
    Ok(config)
}

/// Allocates the buffer, from a 1 GiB hugepage if `hugepage` is set.
pub fn alloc_buffer(size: Size, hugepage: bool) -> anyhow::Result<Memory> {
    let memory = if hugepage {
        bankhammer_hugepage::HugepageAllocator::default()
            .alloc(size)
            .context("hugepage allocation")?
    } else {
        Memory::mmap(size.bytes()).context("mmap")?
    };
    info!("Buffer of {} at {:p}", size, memory.ptr);
    Ok(memory)
}

/// Wraps a result with the time it was produced.
#[derive(Debug, Serialize)]
pub struct Dated<T> {
    /// ISO 8601 timestamp
    pub date: String,
    /// The result
    pub result: T,
}

impl<T> Dated<T> {
    /// Stamps `result` with the current local time.
    pub fn now(result: T) -> Self {
        Dated {
            date: chrono::Local::now().to_rfc3339(),
            result,
        }
    }
}

/// Writes `value` as pretty JSON to `filename`.
pub fn save_json<T: Serialize>(filename: &str, value: &T) -> anyhow::Result<()> {
    let file = File::create(filename).with_context(|| format!("creating {}", filename))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    info!("Results saved to {}", filename);
    Ok(())
}
